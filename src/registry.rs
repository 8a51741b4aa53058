//! Routing tables: which Whois server and which RDAP base URLs serve a target.
//!
//! Domains match on the longest known registry suffix, IP addresses on the
//! longest covering prefix and AS numbers on the narrowest covering range.
//! The tables are assembled once at startup and only read afterwards.

use crate::errors::LookupError;
use crate::target::{LookupTarget, TargetKind};
use crate::tld_mappings::{
    Rir, ASN_ALLOCATIONS, IANA_WHOIS, IPV4_ALLOCATIONS, IPV6_ALLOCATIONS, RDAP_REDIRECTOR,
    RDAP_TLD_SERVERS, WHOIS_TLD_SERVERS,
};
use serde::Deserialize;
use std::collections::HashMap;
use std::net::IpAddr;
use tracing::{debug, info};

/// An IPv4 or IPv6 network in CIDR notation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IpNetwork {
    addr: IpAddr,
    prefix: u8,
}

impl IpNetwork {
    pub fn parse(cidr: &str) -> Result<Self, LookupError> {
        let invalid = || LookupError::InvalidArgument(format!("invalid CIDR: {}", cidr));

        let (addr, prefix) = cidr.trim().split_once('/').ok_or_else(invalid)?;
        let addr: IpAddr = addr.parse().map_err(|_| invalid())?;
        let prefix: u8 = prefix.parse().map_err(|_| invalid())?;
        let max = if addr.is_ipv4() { 32 } else { 128 };
        if prefix > max {
            return Err(invalid());
        }
        Ok(Self { addr, prefix })
    }

    pub fn prefix_len(&self) -> u8 {
        self.prefix
    }

    pub fn contains(&self, ip: IpAddr) -> bool {
        match (self.addr, ip) {
            (IpAddr::V4(net), IpAddr::V4(ip)) => {
                let mask = if self.prefix == 0 { 0 } else { u32::MAX << (32 - self.prefix) };
                u32::from(net) & mask == u32::from(ip) & mask
            }
            (IpAddr::V6(net), IpAddr::V6(ip)) => {
                let mask = if self.prefix == 0 { 0 } else { u128::MAX << (128 - self.prefix) };
                u128::from(net) & mask == u128::from(ip) & mask
            }
            _ => false,
        }
    }
}

#[derive(Debug, Clone)]
struct IpRoute {
    network: IpNetwork,
    whois: Option<String>,
    rdap: Vec<String>,
}

#[derive(Debug, Clone)]
struct AsnRoute {
    start: u32,
    end: u32,
    whois: Option<String>,
    rdap: Vec<String>,
}

impl AsnRoute {
    fn width(&self) -> u32 {
        self.end - self.start
    }
}

// IANA bootstrap document: each service is `[[patterns...], [urls...]]`.
#[derive(Debug, Deserialize)]
struct BootstrapDocument {
    services: Vec<Vec<Vec<String>>>,
}

#[derive(Debug, Clone, Default)]
pub struct ServerRegistry {
    whois_tlds: HashMap<String, String>,
    rdap_tlds: HashMap<String, Vec<String>>,
    ip_routes: Vec<IpRoute>,
    asn_routes: Vec<AsnRoute>,
}

impl ServerRegistry {
    /// A registry with no routes at all; every target is unsupported.
    pub fn empty() -> Self {
        Self::default()
    }

    /// The compiled-in tables plus catch-all IANA routes for addresses.
    pub fn builtin() -> Self {
        let mut registry = Self::empty();

        for (tld, server) in WHOIS_TLD_SERVERS.iter() {
            registry.whois_tlds.insert(tld.to_string(), server.to_string());
        }
        for (tld, urls) in RDAP_TLD_SERVERS.iter() {
            registry
                .rdap_tlds
                .insert(tld.to_string(), urls.iter().map(|u| u.to_string()).collect());
        }

        for (cidr, rir) in IPV4_ALLOCATIONS.iter().chain(IPV6_ALLOCATIONS.iter()) {
            // Static table entries are well-formed
            if let Ok(network) = IpNetwork::parse(cidr) {
                registry.ip_routes.push(IpRoute {
                    network,
                    whois: Some(rir.whois_server().to_string()),
                    rdap: rir_candidates(*rir),
                });
            }
        }
        for default_route in ["0.0.0.0/0", "::/0"] {
            if let Ok(network) = IpNetwork::parse(default_route) {
                registry.ip_routes.push(IpRoute {
                    network,
                    whois: Some(IANA_WHOIS.to_string()),
                    rdap: vec![RDAP_REDIRECTOR.to_string()],
                });
            }
        }

        for (start, end, rir) in ASN_ALLOCATIONS {
            registry.asn_routes.push(AsnRoute {
                start: *start,
                end: *end,
                whois: Some(rir.whois_server().to_string()),
                rdap: rir_candidates(*rir),
            });
        }

        debug!(
            whois_tlds = registry.whois_tlds.len(),
            rdap_tlds = registry.rdap_tlds.len(),
            ip_routes = registry.ip_routes.len(),
            asn_routes = registry.asn_routes.len(),
            "Built server registry"
        );
        registry
    }

    pub fn with_whois_tld(mut self, suffix: &str, server: &str) -> Self {
        self.whois_tlds.insert(suffix.to_lowercase(), server.to_string());
        self
    }

    pub fn with_rdap_tld(mut self, suffix: &str, urls: Vec<String>) -> Self {
        self.rdap_tlds.insert(suffix.to_lowercase(), urls);
        self
    }

    pub fn with_ip_route(
        mut self,
        cidr: &str,
        whois: Option<&str>,
        rdap: Vec<String>,
    ) -> Result<Self, LookupError> {
        let network = IpNetwork::parse(cidr)?;
        self.ip_routes.push(IpRoute { network, whois: whois.map(str::to_string), rdap });
        Ok(self)
    }

    pub fn with_asn_route(mut self, start: u32, end: u32, whois: Option<&str>, rdap: Vec<String>) -> Self {
        let (start, end) = if start <= end { (start, end) } else { (end, start) };
        self.asn_routes.push(AsnRoute { start, end, whois: whois.map(str::to_string), rdap });
        self
    }

    /// Authoritative Whois host for `target`, possibly as `host:port`.
    pub fn whois_server_for(&self, target: &LookupTarget) -> Result<String, LookupError> {
        let found = match target.kind() {
            TargetKind::Domain => target
                .domain_suffixes()
                .into_iter()
                .find_map(|suffix| self.whois_tlds.get(suffix).cloned()),
            TargetKind::Ipv4 | TargetKind::Ipv6 => target
                .ip()
                .and_then(|ip| self.best_ip_route(ip, |r| r.whois.is_some()))
                .and_then(|r| r.whois.clone()),
            TargetKind::Asn => target
                .asn()
                .and_then(|asn| self.best_asn_route(asn, |r| r.whois.is_some()))
                .and_then(|r| r.whois.clone()),
        };

        found.ok_or_else(|| unsupported(target))
    }

    /// Ordered, non-empty list of RDAP base URLs to try for `target`.
    pub fn rdap_candidates_for(&self, target: &LookupTarget) -> Result<Vec<String>, LookupError> {
        let found = match target.kind() {
            TargetKind::Domain => target
                .domain_suffixes()
                .into_iter()
                .find_map(|suffix| self.rdap_tlds.get(suffix).filter(|urls| !urls.is_empty()).cloned()),
            TargetKind::Ipv4 | TargetKind::Ipv6 => target
                .ip()
                .and_then(|ip| self.best_ip_route(ip, |r| !r.rdap.is_empty()))
                .map(|r| r.rdap.clone()),
            TargetKind::Asn => target
                .asn()
                .and_then(|asn| self.best_asn_route(asn, |r| !r.rdap.is_empty()))
                .map(|r| r.rdap.clone()),
        };

        found.ok_or_else(|| unsupported(target))
    }

    /// Merge an IANA-format RDAP bootstrap document. Domain entries take
    /// precedence over compiled-in candidates for the same suffix; network
    /// and AS number entries are added as RDAP-only routes.
    pub fn load_rdap_bootstrap(&mut self, document: &str) -> Result<usize, LookupError> {
        let doc: BootstrapDocument = serde_json::from_str(document).map_err(|e| {
            LookupError::InvalidArgument(format!("invalid RDAP bootstrap document: {}", e))
        })?;

        let mut loaded = 0;
        for service in doc.services {
            let (patterns, urls) = match service.as_slice() {
                [patterns, urls, ..] if !urls.is_empty() => (patterns, urls),
                _ => continue,
            };

            for pattern in patterns {
                let pattern = pattern.trim().to_lowercase();
                if pattern.contains('/') {
                    let network = IpNetwork::parse(&pattern)?;
                    self.ip_routes.push(IpRoute { network, whois: None, rdap: urls.clone() });
                } else if let Some((start, end)) = parse_asn_range(&pattern) {
                    self.asn_routes.push(AsnRoute { start, end, whois: None, rdap: urls.clone() });
                } else {
                    let suffix = pattern.trim_start_matches('.').to_string();
                    let entry = self.rdap_tlds.entry(suffix).or_default();
                    let mut merged = urls.clone();
                    merged.extend(entry.drain(..).filter(|u| !urls.contains(u)));
                    *entry = merged;
                }
                loaded += 1;
            }
        }

        info!(entries = loaded, "Loaded RDAP bootstrap entries");
        Ok(loaded)
    }

    fn best_ip_route(&self, ip: IpAddr, usable: impl Fn(&IpRoute) -> bool) -> Option<&IpRoute> {
        self.ip_routes
            .iter()
            .filter(|r| usable(r) && r.network.contains(ip))
            .max_by_key(|r| r.network.prefix_len())
    }

    fn best_asn_route(&self, asn: u32, usable: impl Fn(&AsnRoute) -> bool) -> Option<&AsnRoute> {
        self.asn_routes
            .iter()
            .filter(|r| usable(r) && r.start <= asn && asn <= r.end)
            .min_by_key(|r| r.width())
    }
}

fn rir_candidates(rir: Rir) -> Vec<String> {
    vec![rir.rdap_base().to_string(), RDAP_REDIRECTOR.to_string()]
}

fn unsupported(target: &LookupTarget) -> LookupError {
    LookupError::NotSupportedTld(target.tld().unwrap_or(target.as_str()).to_string())
}

fn parse_asn_range(pattern: &str) -> Option<(u32, u32)> {
    match pattern.split_once('-') {
        Some((start, end)) => Some((start.parse().ok()?, end.parse().ok()?)),
        None => pattern.parse().ok().map(|n| (n, n)),
    }
}
