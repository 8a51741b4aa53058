//! Lookup pipeline: validate, rate-limit, cache, then a single upstream fetch
//! per key no matter how many callers ask for it at once.

use crate::{
    cache::{CacheService, NegativeCache},
    config::Config,
    errors::LookupError,
    metrics,
    rate_limit::RateLimiter,
    rdap::RdapClient,
    registry::ServerRegistry,
    whois::WhoisClient,
    CacheKey, LookupResult, LookupTarget, Protocol,
};
use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use std::{collections::HashMap, sync::Arc, time::Duration};
use tokio::{runtime::Handle, task::JoinHandle, time::Instant};
use tracing::{debug, info, warn};

/// A source of lookup results for one protocol.
#[async_trait]
pub trait Upstream: Send + Sync {
    async fn fetch(&self, target: &LookupTarget) -> Result<LookupResult, LookupError>;
}

type SharedLookup = Shared<BoxFuture<'static, Result<LookupResult, LookupError>>>;
type InFlight = Arc<Mutex<HashMap<CacheKey, SharedLookup>>>;

/// Removes the in-flight entry when the fetch task ends, including by panic.
struct InFlightGuard {
    in_flight: InFlight,
    key: CacheKey,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.in_flight.lock().remove(&self.key);
    }
}

pub struct LookupOrchestrator {
    config: Arc<Config>,
    whois: Arc<dyn Upstream>,
    rdap: Arc<dyn Upstream>,
    cache: Arc<CacheService>,
    negative_cache: Arc<NegativeCache>,
    rate_limiter: Arc<RateLimiter>,
    in_flight: InFlight,
    deadline: Duration,
    maintenance: Vec<JoinHandle<()>>,
}

impl LookupOrchestrator {
    /// Production wiring: built-in registry (plus the optional bootstrap
    /// file), real Whois and RDAP clients.
    pub fn new(config: Arc<Config>) -> Result<Self, LookupError> {
        let mut registry = ServerRegistry::builtin();
        if let Some(path) = &config.rdap_bootstrap_file {
            let document = std::fs::read_to_string(path).map_err(|e| {
                LookupError::Internal(format!("failed to read RDAP bootstrap file {}: {}", path, e))
            })?;
            let loaded = registry.load_rdap_bootstrap(&document)?;
            info!("Loaded {} RDAP bootstrap services from {}", loaded, path);
        }
        let registry = Arc::new(registry);

        let whois = Arc::new(WhoisClient::new(config.clone(), registry.clone()));
        let rdap = Arc::new(RdapClient::new(config.clone(), registry)?);

        Ok(Self::with_upstreams(config, whois, rdap))
    }

    pub fn with_upstreams(config: Arc<Config>, whois: Arc<dyn Upstream>, rdap: Arc<dyn Upstream>) -> Self {
        let cache = Arc::new(CacheService::new(&config));
        let negative_cache = Arc::new(NegativeCache::new(&config));
        let rate_limiter = Arc::new(RateLimiter::new(&config));

        // Background sweeps need a runtime; library users may build us outside one
        let maintenance = if Handle::try_current().is_ok() {
            vec![
                cache.spawn_sweeper(config.cache_cleanup_interval()),
                rate_limiter.spawn_janitor(),
            ]
        } else {
            debug!("No tokio runtime, skipping cache and rate limiter maintenance tasks");
            Vec::new()
        };

        Self {
            deadline: config.lookup_deadline(),
            config,
            whois,
            rdap,
            cache,
            negative_cache,
            rate_limiter,
            in_flight: Arc::new(Mutex::new(HashMap::new())),
            maintenance,
        }
    }

    /// Overall bound on one upstream fetch, shared by all coalesced waiters.
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    pub async fn lookup_whois(&self, target: &str, client_id: &str) -> Result<LookupResult, LookupError> {
        self.lookup(Protocol::Whois, target, client_id).await
    }

    pub async fn lookup_rdap(&self, target: &str, client_id: &str) -> Result<LookupResult, LookupError> {
        self.lookup(Protocol::Rdap, target, client_id).await
    }

    pub async fn lookup(&self, protocol: Protocol, raw_target: &str, client_id: &str) -> Result<LookupResult, LookupError> {
        self.lookup_with(protocol, raw_target, client_id, true).await
    }

    /// Like `lookup`; with `use_cache` off the caches are neither read nor
    /// written. Rate limiting and coalescing still apply.
    pub async fn lookup_with(
        &self,
        protocol: Protocol,
        raw_target: &str,
        client_id: &str,
        use_cache: bool,
    ) -> Result<LookupResult, LookupError> {
        metrics::record_request(protocol);
        let outcome = self.run_lookup(protocol, raw_target, client_id, use_cache).await;
        if let Err(e) = &outcome {
            metrics::record_error(e.kind());
            debug!(%protocol, query = raw_target, client_id, error = %e, "Lookup failed");
        }
        outcome
    }

    async fn run_lookup(
        &self,
        protocol: Protocol,
        raw_target: &str,
        client_id: &str,
        use_cache: bool,
    ) -> Result<LookupResult, LookupError> {
        let target = LookupTarget::parse(raw_target)?;

        if !self.rate_limiter.try_acquire(client_id) {
            metrics::record_rate_limited();
            warn!(client_id, "Rate limit exceeded");
            return Err(LookupError::RateLimited(client_id.to_string()));
        }

        let key = CacheKey::new(protocol, target);
        if !use_cache {
            debug!(key = %key, "Cache bypassed");
            return self.join_or_lead(key, false).await;
        }
        if let Some(hit) = self.cache.get(&key) {
            metrics::record_cache_hit();
            debug!(key = %key, "Cache hit");
            return Ok(hit);
        }
        if let Some(err) = self.negative_cache.get(&key).await {
            metrics::record_cache_hit();
            return Err(err);
        }
        metrics::record_cache_miss();

        self.join_or_lead(key, true).await
    }

    fn join_or_lead(&self, key: CacheKey, use_cache: bool) -> SharedLookup {
        let mut in_flight = self.in_flight.lock();

        if let Some(existing) = in_flight.get(&key) {
            metrics::record_coalesced();
            debug!(key = %key, "Joining in-flight lookup");
            return existing.clone();
        }

        // The previous leader may have stored its result after our miss
        if let Some(hit) = use_cache.then(|| self.cache.get(&key)).flatten() {
            metrics::record_cache_hit();
            return futures::future::ready(Ok(hit)).boxed().shared();
        }

        let upstream = match key.protocol {
            Protocol::Whois => self.whois.clone(),
            Protocol::Rdap => self.rdap.clone(),
        };
        let task = tokio::spawn(fetch_and_store(
            upstream,
            self.cache.clone(),
            self.negative_cache.clone(),
            InFlightGuard { in_flight: self.in_flight.clone(), key: key.clone() },
            self.deadline,
            use_cache,
        ));

        let shared = async move {
            task.await
                .unwrap_or_else(|e| Err(LookupError::Internal(format!("lookup task failed: {}", e))))
        }
        .boxed()
        .shared();

        in_flight.insert(key, shared.clone());
        shared
    }

    pub fn cache(&self) -> &Arc<CacheService> {
        &self.cache
    }

    pub fn negative_cache(&self) -> &Arc<NegativeCache> {
        &self.negative_cache
    }

    pub fn rate_limiter(&self) -> &Arc<RateLimiter> {
        &self.rate_limiter
    }

    pub fn config(&self) -> &Arc<Config> {
        &self.config
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.lock().len()
    }
}

impl Drop for LookupOrchestrator {
    fn drop(&mut self) {
        for task in &self.maintenance {
            task.abort();
        }
    }
}

async fn fetch_and_store(
    upstream: Arc<dyn Upstream>,
    cache: Arc<CacheService>,
    negative_cache: Arc<NegativeCache>,
    guard: InFlightGuard,
    deadline: Duration,
    store: bool,
) -> Result<LookupResult, LookupError> {
    let key = guard.key.clone();
    let started = Instant::now();

    let outcome = match tokio::time::timeout(deadline, upstream.fetch(&key.target)).await {
        Ok(outcome) => outcome,
        Err(_) => {
            warn!(key = %key, ?deadline, "Lookup deadline exceeded");
            Err(LookupError::Timeout)
        }
    };
    metrics::record_upstream_duration(key.protocol, started.elapsed());

    match &outcome {
        Ok(result) => {
            info!(key = %key, server = %result.source_server, elapsed_ms = started.elapsed().as_millis() as u64, "Lookup completed");
            if store {
                cache.put(key, result.clone());
            }
        }
        Err(err @ LookupError::NotFound(_)) if store => negative_cache.insert(key, err.clone()).await,
        Err(_) => {}
    }

    drop(guard);
    outcome
}
