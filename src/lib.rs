//! # Whois Gateway Library
//!
//! Cached, rate-limited Whois and RDAP lookups behind a JSON-RPC tool
//! protocol.
//!
//! ## Features
//!
//! - Whois over TCP with registry routing and referral following
//! - RDAP over HTTPS with bootstrap candidates and fallback
//! - Single-flight coalescing of identical concurrent lookups
//! - LRU cache with TTL and a short-lived negative cache
//! - Global and per-client token-bucket rate limiting
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use whois_gateway::GatewayClient;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = GatewayClient::new()?;
//!     let result = client.lookup_whois("google.com").await?;
//!
//!     println!("Server: {}", result.source_server);
//!     println!("Registrar: {:?}", result.parsed.get("registrar"));
//!
//!     Ok(())
//! }
//! ```

#[cfg(feature = "server")]
pub mod admin;
pub mod cache;
pub mod config;
pub mod errors;
pub mod metrics;
pub mod orchestrator;
pub mod parser;
pub mod protocol;
pub mod rate_limit;
pub mod rdap;
pub mod registry;
pub mod target;
pub mod tld_mappings;
pub mod whois;

#[cfg(test)]
mod test_support;

// Re-export main types for easy access
pub use cache::{CacheService, NegativeCache};
pub use config::Config;
pub use errors::{LookupError, RpcError};
pub use orchestrator::{LookupOrchestrator, Upstream};
pub use protocol::{serve_protocol, ProtocolServer};
pub use rate_limit::RateLimiter;
pub use rdap::RdapClient;
pub use registry::ServerRegistry;
pub use target::{LookupTarget, TargetKind};
pub use whois::WhoisClient;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt, sync::Arc};

/// Open field map extracted from an upstream response. May be empty.
pub type ParsedFields = BTreeMap<String, serde_json::Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Whois,
    Rdap,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Whois => "whois",
            Protocol::Rdap => "rdap",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one upstream lookup. `raw` always holds the upstream payload;
/// `parsed` is best-effort.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LookupResult {
    pub target: String,
    pub kind: TargetKind,
    pub protocol: Protocol,
    pub raw: String,
    pub parsed: ParsedFields,
    pub source_server: String,
    pub fetched_at: DateTime<Utc>,
    pub truncated: bool,
}

impl LookupResult {
    pub fn new(target: &LookupTarget, protocol: Protocol, source_server: impl Into<String>, raw: String) -> Self {
        Self {
            target: target.as_str().to_string(),
            kind: target.kind(),
            protocol,
            raw,
            parsed: ParsedFields::new(),
            source_server: source_server.into(),
            fetched_at: Utc::now(),
            truncated: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub protocol: Protocol,
    pub target: LookupTarget,
}

impl CacheKey {
    pub fn new(protocol: Protocol, target: LookupTarget) -> Self {
        Self { protocol, target }
    }

    pub fn parse(protocol: Protocol, raw_target: &str) -> Result<Self, LookupError> {
        Ok(Self::new(protocol, LookupTarget::parse(raw_target)?))
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.protocol, self.target)
    }
}

const LIBRARY_CLIENT_ID: &str = "library";

/// High-level lookup client sharing one orchestrator, and therefore one
/// cache and rate limiter, across clones.
#[derive(Clone)]
pub struct GatewayClient {
    orchestrator: Arc<LookupOrchestrator>,
    client_id: String,
}

impl GatewayClient {
    /// Create a client from `.env` and environment configuration
    pub fn new() -> Result<Self, LookupError> {
        let config = Config::load().map_err(|e| LookupError::Internal(format!("configuration: {}", e)))?;
        Self::new_with_config(Arc::new(config))
    }

    pub fn new_with_config(config: Arc<Config>) -> Result<Self, LookupError> {
        let orchestrator = Arc::new(LookupOrchestrator::new(config)?);
        Ok(Self::from_orchestrator(orchestrator))
    }

    pub fn from_orchestrator(orchestrator: Arc<LookupOrchestrator>) -> Self {
        Self { orchestrator, client_id: LIBRARY_CLIENT_ID.to_string() }
    }

    /// Identity charged against the per-client rate limit.
    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = client_id.into();
        self
    }

    pub async fn lookup_whois(&self, target: &str) -> Result<LookupResult, LookupError> {
        self.orchestrator.lookup(Protocol::Whois, target, &self.client_id).await
    }

    pub async fn lookup_rdap(&self, target: &str) -> Result<LookupResult, LookupError> {
        self.orchestrator.lookup(Protocol::Rdap, target, &self.client_id).await
    }

    pub fn orchestrator(&self) -> &Arc<LookupOrchestrator> {
        &self.orchestrator
    }
}
