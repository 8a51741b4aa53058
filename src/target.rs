//! Lookup target parsing and normalization.
//!
//! Every raw input is reduced to a canonical form before it touches the rate
//! limiter, the cache or the network: domains are lowercased and IDNA-encoded,
//! IP addresses use their canonical textual form and AS numbers are written
//! `AS<n>`. Normalizing an already normalized value returns it unchanged.

use crate::errors::LookupError;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::{fmt, net::IpAddr, str::FromStr};

static LABEL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-z0-9](?:[a-z0-9-]{0,61}[a-z0-9])?$").expect("label pattern is valid")
});

const MAX_DOMAIN_LENGTH: usize = 253;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
    Domain,
    Ipv4,
    Ipv6,
    Asn,
}

impl TargetKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetKind::Domain => "domain",
            TargetKind::Ipv4 => "ipv4",
            TargetKind::Ipv6 => "ipv6",
            TargetKind::Asn => "asn",
        }
    }

    pub fn is_ip(&self) -> bool {
        matches!(self, TargetKind::Ipv4 | TargetKind::Ipv6)
    }
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A validated, normalized lookup subject.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LookupTarget {
    kind: TargetKind,
    value: String,
}

impl LookupTarget {
    pub fn parse(raw: &str) -> Result<Self, LookupError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(LookupError::InvalidArgument("empty target".to_string()));
        }

        let unbracketed = trimmed
            .strip_prefix('[')
            .and_then(|s| s.strip_suffix(']'))
            .unwrap_or(trimmed);
        if let Ok(ip) = unbracketed.parse::<IpAddr>() {
            return Ok(Self::from_ip(ip));
        }

        if let Some(asn) = parse_asn(trimmed) {
            return Ok(Self { kind: TargetKind::Asn, value: format!("AS{}", asn) });
        }

        normalize_domain(trimmed).map(|value| Self { kind: TargetKind::Domain, value })
    }

    pub fn from_ip(ip: IpAddr) -> Self {
        let kind = match ip {
            IpAddr::V4(_) => TargetKind::Ipv4,
            IpAddr::V6(_) => TargetKind::Ipv6,
        };
        Self { kind, value: ip.to_string() }
    }

    pub fn kind(&self) -> TargetKind {
        self.kind
    }

    pub fn as_str(&self) -> &str {
        &self.value
    }

    pub fn ip(&self) -> Option<IpAddr> {
        if self.kind.is_ip() {
            self.value.parse().ok()
        } else {
            None
        }
    }

    pub fn asn(&self) -> Option<u32> {
        match self.kind {
            TargetKind::Asn => self.value[2..].parse().ok(),
            _ => None,
        }
    }

    /// Candidate registry suffixes for a domain, longest first, excluding the
    /// full name itself (`a.b.co.uk` yields `b.co.uk`, `co.uk`, `uk`).
    pub fn domain_suffixes(&self) -> Vec<&str> {
        if self.kind != TargetKind::Domain {
            return Vec::new();
        }
        self.value
            .char_indices()
            .filter(|(_, c)| *c == '.')
            .map(|(i, _)| &self.value[i + 1..])
            .collect()
    }

    pub fn tld(&self) -> Option<&str> {
        match self.kind {
            TargetKind::Domain => self.value.rsplit('.').next(),
            _ => None,
        }
    }
}

impl FromStr for LookupTarget {
    type Err = LookupError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for LookupTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value)
    }
}

fn parse_asn(input: &str) -> Option<u32> {
    let prefix = input.get(..2)?;
    if !prefix.eq_ignore_ascii_case("as") {
        return None;
    }
    let digits = &input[2..];
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

fn normalize_domain(input: &str) -> Result<String, LookupError> {
    let invalid = |reason: &str| LookupError::InvalidArgument(format!("{}: {}", reason, input));

    let lowered = input.to_lowercase();
    let name = lowered.strip_suffix('.').unwrap_or(&lowered);

    if name.is_empty() || name.starts_with('.') || name.contains("..") {
        return Err(invalid("empty label in domain"));
    }
    if name.chars().any(|c| c.is_whitespace() || c == '/' || c == '@' || c == ':') {
        return Err(invalid("illegal character in domain"));
    }

    // A numeric final label would be read as an IPv4 literal by the host parser
    let tld = name.rsplit('.').next().unwrap_or(name);
    if !tld.chars().any(char::is_alphabetic) {
        return Err(invalid("top-level label must contain a letter"));
    }

    let ascii = match url::Host::parse(name) {
        Ok(url::Host::Domain(domain)) => domain,
        Ok(_) => return Err(invalid("not a domain name")),
        Err(_) => return Err(invalid("IDNA conversion failed")),
    };

    if ascii.len() > MAX_DOMAIN_LENGTH {
        return Err(invalid("domain name too long"));
    }

    let labels: Vec<&str> = ascii.split('.').collect();
    if labels.len() < 2 {
        return Err(invalid("domain needs at least two labels"));
    }
    if let Some(bad) = labels.iter().find(|label| !LABEL_RE.is_match(label)) {
        return Err(LookupError::InvalidArgument(format!("invalid label '{}' in {}", bad, input)));
    }

    Ok(ascii)
}
