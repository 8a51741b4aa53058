//! Gateway metrics.
//!
//! Everything is recorded through the `metrics` facade, which is a no-op
//! until a recorder is installed. The admin listener installs the Prometheus
//! recorder and renders it on `/metrics`.

use crate::Protocol;
use metrics::{counter, histogram};
use std::time::Duration;

#[cfg(feature = "server")]
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

pub const REQUESTS_TOTAL: &str = "gateway_requests_total";
pub const CACHE_HITS_TOTAL: &str = "gateway_cache_hits_total";
pub const CACHE_MISSES_TOTAL: &str = "gateway_cache_misses_total";
pub const RATE_LIMITED_TOTAL: &str = "gateway_rate_limited_total";
pub const ERRORS_TOTAL: &str = "gateway_errors_total";
pub const COALESCED_TOTAL: &str = "gateway_coalesced_total";
pub const UPSTREAM_DURATION_SECONDS: &str = "gateway_upstream_duration_seconds";

/// Install the global Prometheus recorder. Returns `None` if another
/// recorder already owns the facade.
#[cfg(feature = "server")]
pub fn install_recorder() -> Option<PrometheusHandle> {
    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => {
            // Zero the counters so they show up before the first lookup
            for protocol in [Protocol::Whois, Protocol::Rdap] {
                counter!(REQUESTS_TOTAL, "protocol" => protocol.as_str()).absolute(0);
            }
            counter!(CACHE_HITS_TOTAL).absolute(0);
            counter!(CACHE_MISSES_TOTAL).absolute(0);
            counter!(RATE_LIMITED_TOTAL).absolute(0);
            counter!(COALESCED_TOTAL).absolute(0);
            Some(handle)
        }
        Err(e) => {
            tracing::warn!("Failed to install metrics recorder: {}", e);
            None
        }
    }
}

pub fn record_request(protocol: Protocol) {
    counter!(REQUESTS_TOTAL, "protocol" => protocol.as_str()).increment(1);
}

pub fn record_cache_hit() {
    counter!(CACHE_HITS_TOTAL).increment(1);
}

pub fn record_cache_miss() {
    counter!(CACHE_MISSES_TOTAL).increment(1);
}

pub fn record_rate_limited() {
    counter!(RATE_LIMITED_TOTAL).increment(1);
}

pub fn record_coalesced() {
    counter!(COALESCED_TOTAL).increment(1);
}

pub fn record_error(kind: &'static str) {
    counter!(ERRORS_TOTAL, "kind" => kind).increment(1);
}

pub fn record_upstream_duration(protocol: Protocol, elapsed: Duration) {
    histogram!(UPSTREAM_DURATION_SECONDS, "protocol" => protocol.as_str()).record(elapsed.as_secs_f64());
}
