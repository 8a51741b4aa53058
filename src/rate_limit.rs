//! Token-bucket admission control.
//!
//! One global bucket shared by every caller plus one bucket per client id,
//! created on first sight and dropped once the client has been idle for the
//! configured window. A request is admitted only when both buckets hold a
//! token; otherwise neither is charged.

use crate::config::Config;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::{sync::Arc, time::Duration};
use tokio::{
    task::JoinHandle,
    time::{Instant, MissedTickBehavior},
};
use tracing::debug;

const MAX_JANITOR_INTERVAL: Duration = Duration::from_secs(300);

#[derive(Debug, Clone)]
pub struct TokenBucket {
    capacity: f64,
    tokens: f64,
    refill_rate: f64,
    last_refill: Instant,
}

impl TokenBucket {
    /// A full bucket.
    pub fn new(capacity: u32, refill_rate: f64, now: Instant) -> Self {
        let capacity = f64::from(capacity.max(1));
        Self { capacity, tokens: capacity, refill_rate, last_refill: now }
    }

    pub fn refill(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_rate).min(self.capacity);
        self.last_refill = now;
    }

    fn has_token(&self) -> bool {
        self.tokens >= 1.0
    }

    fn take(&mut self) {
        self.tokens -= 1.0;
    }

    pub fn available(&self) -> f64 {
        self.tokens
    }
}

#[derive(Debug)]
struct ClientBucket {
    bucket: TokenBucket,
    last_seen: Instant,
}

pub struct RateLimiter {
    global: Mutex<TokenBucket>,
    clients: DashMap<String, ClientBucket>,
    client_burst: u32,
    client_rate: f64,
    idle_timeout: Duration,
}

impl RateLimiter {
    pub fn new(config: &Config) -> Self {
        Self::with_limits(
            config.global_rate_limit_per_second,
            config.global_rate_limit_burst,
            config.client_rate_limit_per_second,
            config.client_rate_limit_burst,
            config.client_idle_timeout(),
        )
    }

    pub fn with_limits(
        global_rate: f64,
        global_burst: u32,
        client_rate: f64,
        client_burst: u32,
        idle_timeout: Duration,
    ) -> Self {
        Self {
            global: Mutex::new(TokenBucket::new(global_burst, global_rate, Instant::now())),
            clients: DashMap::new(),
            client_burst,
            client_rate,
            idle_timeout,
        }
    }

    /// Charge one token from the global bucket and from `client_id`'s bucket,
    /// or from neither.
    pub fn try_acquire(&self, client_id: &str) -> bool {
        let now = Instant::now();

        // Lock order: client shard, then global
        let mut client = self
            .clients
            .entry(client_id.to_string())
            .or_insert_with(|| ClientBucket {
                bucket: TokenBucket::new(self.client_burst, self.client_rate, now),
                last_seen: now,
            });
        client.last_seen = now;
        client.bucket.refill(now);

        let mut global = self.global.lock();
        global.refill(now);

        if !client.bucket.has_token() {
            debug!(client_id, "Client rate limit exceeded");
            return false;
        }
        if !global.has_token() {
            debug!(client_id, "Global rate limit exceeded");
            return false;
        }

        client.bucket.take();
        global.take();
        true
    }

    /// Forget clients idle for longer than the configured window.
    pub fn evict_idle(&self) -> usize {
        let now = Instant::now();
        let idle: Vec<String> = self
            .clients
            .iter()
            .filter(|entry| now.saturating_duration_since(entry.last_seen) > self.idle_timeout)
            .map(|entry| entry.key().clone())
            .collect();

        // Re-check under the shard lock; the client may have come back
        idle.into_iter()
            .filter(|id| {
                self.clients
                    .remove_if(id, |_, c| now.saturating_duration_since(c.last_seen) > self.idle_timeout)
                    .is_some()
            })
            .count()
    }

    pub fn tracked_clients(&self) -> usize {
        self.clients.len()
    }

    pub fn spawn_janitor(self: &Arc<Self>) -> JoinHandle<()> {
        let every = self.idle_timeout.min(MAX_JANITOR_INTERVAL).max(Duration::from_secs(1));
        let limiter = Arc::downgrade(self);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;

            loop {
                ticker.tick().await;
                let Some(limiter) = limiter.upgrade() else { break };
                let evicted = limiter.evict_idle();
                if evicted > 0 {
                    debug!(evicted, tracked = limiter.tracked_clients(), "Evicted idle rate limit buckets");
                }
            }
        })
    }
}
