//! In-memory result caches.
//!
//! `CacheService` is a bounded LRU store with a fixed TTL per entry. Expiry is
//! checked on every read, and a background sweep drops entries nobody reads
//! again. `NegativeCache` remembers `NotFound` outcomes for a short while.

use crate::{config::Config, errors::LookupError, CacheKey, LookupResult};
use moka::future::Cache;
use parking_lot::Mutex;
use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
    time::Duration,
};
use tokio::{
    task::JoinHandle,
    time::{Instant, MissedTickBehavior},
};
use tracing::debug;

#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub result: LookupResult,
    pub inserted_at: Instant,
    pub expires_at: Instant,
    pub last_accessed_at: Instant,
    // Position in the recency index; Instants can tie under a coarse clock
    access_seq: u64,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now > self.expires_at
    }
}

#[derive(Default)]
struct Store {
    entries: HashMap<CacheKey, CacheEntry>,
    recency: BTreeMap<u64, CacheKey>,
    next_seq: u64,
}

impl Store {
    fn bump(&mut self) -> u64 {
        self.next_seq += 1;
        self.next_seq
    }

    fn remove(&mut self, key: &CacheKey) -> Option<CacheEntry> {
        let entry = self.entries.remove(key)?;
        self.recency.remove(&entry.access_seq);
        Some(entry)
    }

    fn evict_least_recent(&mut self) -> Option<CacheKey> {
        let (_, key) = self.recency.pop_first()?;
        self.entries.remove(&key);
        Some(key)
    }
}

pub struct CacheService {
    store: Mutex<Store>,
    ttl: Duration,
    max_entries: usize,
}

impl CacheService {
    pub fn new(config: &Config) -> Self {
        Self::with_limits(config.cache_max_entries, config.cache_ttl())
    }

    pub fn with_limits(max_entries: usize, ttl: Duration) -> Self {
        Self {
            store: Mutex::new(Store::default()),
            ttl,
            max_entries: max_entries.max(1),
        }
    }

    pub fn get(&self, key: &CacheKey) -> Option<LookupResult> {
        let now = Instant::now();
        let mut store = self.store.lock();

        let (expired, old_seq) = match store.entries.get(key) {
            Some(entry) => (entry.is_expired(now), entry.access_seq),
            None => {
                debug!(key = %key, "Cache miss");
                return None;
            }
        };

        if expired {
            store.remove(key);
            debug!(key = %key, "Cache entry expired");
            return None;
        }

        let seq = store.bump();
        store.recency.remove(&old_seq);
        store.recency.insert(seq, key.clone());

        let entry = store.entries.get_mut(key)?;
        entry.last_accessed_at = now;
        entry.access_seq = seq;
        debug!(key = %key, "Cache hit");
        Some(entry.result.clone())
    }

    /// Insert or overwrite. Only a new key can push out the least recently
    /// accessed entry.
    pub fn put(&self, key: CacheKey, result: LookupResult) {
        let now = Instant::now();
        let mut store = self.store.lock();

        if store.remove(&key).is_none() && store.entries.len() >= self.max_entries {
            if let Some(evicted) = store.evict_least_recent() {
                debug!(evicted = %evicted, "Evicted least recently used entry");
            }
        }

        let seq = store.bump();
        store.recency.insert(seq, key.clone());
        debug!(key = %key, ttl_secs = self.ttl.as_secs(), "Cached lookup result");
        store.entries.insert(
            key,
            CacheEntry {
                result,
                inserted_at: now,
                expires_at: now + self.ttl,
                last_accessed_at: now,
                access_seq: seq,
            },
        );
    }

    /// Drop every expired entry; returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut store = self.store.lock();

        let expired: Vec<CacheKey> = store
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired(now))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            store.remove(key);
        }
        expired.len()
    }

    /// Physically stored entries, including expired ones not yet swept.
    pub fn len(&self) -> usize {
        self.store.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn spawn_sweeper(self: &Arc<Self>, every: Duration) -> JoinHandle<()> {
        let cache = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;

            loop {
                ticker.tick().await;
                let Some(cache) = cache.upgrade() else { break };
                let removed = cache.purge_expired();
                if removed > 0 {
                    debug!(removed, remaining = cache.len(), "Swept expired cache entries");
                }
            }
        })
    }
}

/// Short-lived memory of `NotFound` outcomes. A zero TTL disables it.
pub struct NegativeCache {
    cache: Option<Cache<CacheKey, LookupError>>,
}

impl NegativeCache {
    pub fn new(config: &Config) -> Self {
        Self::with_ttl(Duration::from_secs(config.negative_cache_ttl_seconds), config.cache_max_entries)
    }

    pub fn with_ttl(ttl: Duration, max_entries: usize) -> Self {
        if ttl.is_zero() {
            return Self { cache: None };
        }
        let cache = Cache::builder()
            .max_capacity(max_entries as u64)
            .time_to_live(ttl)
            .build();
        Self { cache: Some(cache) }
    }

    pub async fn get(&self, key: &CacheKey) -> Option<LookupError> {
        let cache = self.cache.as_ref()?;
        let hit = cache.get(key).await;
        if hit.is_some() {
            debug!(key = %key, "Negative cache hit");
        }
        hit
    }

    pub async fn insert(&self, key: CacheKey, error: LookupError) {
        if let Some(cache) = &self.cache {
            cache.insert(key, error).await;
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.cache.is_some()
    }
}
