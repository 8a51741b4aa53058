//! RDAP (Registration Data Access Protocol) client
//!
//! Structured JSON successor to Whois (RFC 7480-7484). Base URLs come from the
//! server registry in preference order; each is tried in turn until one
//! answers with an RDAP object.

use crate::{
    config::Config,
    errors::LookupError,
    orchestrator::Upstream,
    registry::ServerRegistry,
    LookupResult, LookupTarget, ParsedFields, Protocol, TargetKind,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{header, redirect, StatusCode};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::{collections::BTreeMap, sync::Arc};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};
use url::Url;

const RDAP_ACCEPT: &str = "application/rdap+json, application/json";
const USER_AGENT: &str = concat!("whois-gateway/", env!("CARGO_PKG_VERSION"), " (RDAP client)");
const MAX_REDIRECTS: usize = 1;

/// Why a single candidate base URL did not produce a record.
#[derive(Debug)]
enum CandidateFailure {
    NotFound,
    Failed(String),
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RdapObject {
    object_class_name: Option<String>,
    handle: Option<String>,
    ldh_name: Option<String>,
    name: Option<String>,
    status: Vec<String>,
    events: Vec<RdapEvent>,
    nameservers: Vec<RdapNameserver>,
    entities: Vec<RdapEntity>,
    start_address: Option<String>,
    end_address: Option<String>,
    ip_version: Option<String>,
    country: Option<String>,
    #[serde(rename = "type")]
    network_type: Option<String>,
    #[serde(rename = "cidr0_cidrs")]
    cidrs: Vec<Cidr0>,
    start_autnum: Option<u64>,
    end_autnum: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RdapEvent {
    event_action: String,
    event_date: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RdapNameserver {
    ldh_name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RdapEntity {
    handle: Option<String>,
    roles: Vec<String>,
    vcard_array: Option<Value>,
    entities: Vec<RdapEntity>,
}

#[derive(Debug, Deserialize)]
struct Cidr0 {
    v4prefix: Option<String>,
    v6prefix: Option<String>,
    length: Option<u8>,
}

pub struct RdapClient {
    client: reqwest::Client,
    config: Arc<Config>,
    registry: Arc<ServerRegistry>,
    query_semaphore: Arc<Semaphore>,
}

impl RdapClient {
    pub fn new(config: Arc<Config>, registry: Arc<ServerRegistry>) -> Result<Self, LookupError> {
        let mut headers = header::HeaderMap::new();
        headers.insert(header::ACCEPT, header::HeaderValue::from_static(RDAP_ACCEPT));

        let client = reqwest::Client::builder()
            .timeout(config.rdap_timeout())
            .connect_timeout(config.whois_connect_timeout())
            .redirect(redirect_policy())
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .gzip(true)
            .build()
            .map_err(|e| LookupError::Internal(format!("failed to build RDAP HTTP client: {}", e)))?;

        info!("RdapClient initialized with {} concurrent requests", config.concurrent_rdap_queries);

        Ok(Self {
            client,
            query_semaphore: Arc::new(Semaphore::new(config.concurrent_rdap_queries)),
            config,
            registry,
        })
    }

    /// Try each candidate base URL in order; the first RDAP object wins.
    pub async fn lookup(&self, target: &LookupTarget) -> Result<LookupResult, LookupError> {
        let candidates = self.registry.rdap_candidates_for(target)?;
        let mut last_failure = None;

        for base in &candidates {
            match self.query_candidate(base, target).await {
                Ok(result) => return Ok(result),
                Err(failure) => {
                    debug!(server = %base, query = %target, ?failure, "RDAP candidate failed, trying next");
                    last_failure = Some(failure);
                }
            }
        }

        match last_failure {
            Some(CandidateFailure::NotFound) => Err(LookupError::NotFound(target.to_string())),
            Some(CandidateFailure::Failed(reason)) => {
                warn!(query = %target, candidates = candidates.len(), "All RDAP candidates failed");
                Err(LookupError::Unavailable(format!(
                    "all {} RDAP servers failed for {} (last: {})",
                    candidates.len(),
                    target,
                    reason
                )))
            }
            None => Err(LookupError::Unavailable(format!("no RDAP servers for {}", target))),
        }
    }

    async fn query_candidate(&self, base: &str, target: &LookupTarget) -> Result<LookupResult, CandidateFailure> {
        let url = rdap_url(base, target).map_err(CandidateFailure::Failed)?;

        let _permit = self
            .query_semaphore
            .acquire()
            .await
            .map_err(|_| CandidateFailure::Failed("RDAP semaphore closed".to_string()))?;

        debug!("Querying RDAP server: {}", url);
        let mut response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| CandidateFailure::Failed(e.to_string()))?;

        let status = response.status();
        let final_url = response.url().to_string();
        if status == StatusCode::NOT_FOUND {
            return Err(CandidateFailure::NotFound);
        }
        if !status.is_success() {
            return Err(CandidateFailure::Failed(format!("HTTP {} from {}", status, final_url)));
        }

        let limit = self.config.max_response_size;
        let mut body = Vec::new();
        let mut truncated = false;
        while let Some(chunk) = response.chunk().await.map_err(|e| CandidateFailure::Failed(e.to_string()))? {
            let room = limit - body.len();
            if chunk.len() > room {
                body.extend_from_slice(&chunk[..room]);
                truncated = true;
                break;
            }
            body.extend_from_slice(&chunk);
        }
        if truncated {
            warn!(server = %final_url, limit, "RDAP response exceeds size limit, truncating");
        }
        let body = decode_body(body, truncated);

        let mut parsed = match serde_json::from_str::<Value>(&body) {
            Ok(json) if json.is_object() => normalize_rdap(json, target.kind()),
            Ok(_) => {
                return Err(CandidateFailure::Failed(format!("response from {} is not an RDAP object", final_url)))
            }
            // A cut object cannot be parsed; keep the raw text
            Err(e) if truncated && body.trim_start().starts_with('{') => {
                debug!("Truncated RDAP body from {} left unparsed: {}", final_url, e);
                ParsedFields::new()
            }
            Err(e) => return Err(CandidateFailure::Failed(format!("invalid JSON from {}: {}", final_url, e))),
        };
        debug!("RDAP response length: {} bytes", body.len());
        parsed.insert("rdap_url".to_string(), Value::String(final_url));

        let mut result = LookupResult::new(target, Protocol::Rdap, base, body);
        result.parsed = parsed;
        result.truncated = truncated;
        Ok(result)
    }
}

#[async_trait]
impl Upstream for RdapClient {
    async fn fetch(&self, target: &LookupTarget) -> Result<LookupResult, LookupError> {
        self.lookup(target).await
    }
}

fn redirect_policy() -> redirect::Policy {
    redirect::Policy::custom(|attempt| {
        // `previous` already holds the original request URL
        if attempt.previous().len() > MAX_REDIRECTS {
            attempt.error("too many redirects")
        } else {
            attempt.follow()
        }
    })
}

fn decode_body(bytes: Vec<u8>, truncated: bool) -> String {
    match String::from_utf8(bytes) {
        Ok(text) => text,
        // The size cut split the final code point
        Err(e) if truncated && e.utf8_error().error_len().is_none() => {
            let valid = e.utf8_error().valid_up_to();
            String::from_utf8_lossy(&e.as_bytes()[..valid]).into_owned()
        }
        Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
    }
}

fn rdap_url(base: &str, target: &LookupTarget) -> Result<Url, String> {
    let mut base = base.trim().to_string();
    if !base.ends_with('/') {
        base.push('/');
    }
    let base_url = Url::parse(&base).map_err(|e| format!("invalid RDAP server URL '{}': {}", base, e))?;

    let path = match target.kind() {
        TargetKind::Domain => format!("domain/{}", target.as_str()),
        TargetKind::Ipv4 | TargetKind::Ipv6 => format!("ip/{}", target.as_str()),
        TargetKind::Asn => format!("autnum/{}", target.asn().unwrap_or_default()),
    };

    base_url
        .join(&path)
        .map_err(|e| format!("failed to construct RDAP URL: {}", e))
}

/// Flatten the interesting parts of an RDAP object into the open field map.
fn normalize_rdap(json: Value, kind: TargetKind) -> ParsedFields {
    let rdap: RdapObject = serde_json::from_value(json).unwrap_or_else(|e| {
        debug!("RDAP object did not match the expected shape: {}", e);
        RdapObject::default()
    });

    let mut parsed = ParsedFields::new();
    let mut put = |key: &str, value: Option<Value>| {
        if let Some(value) = value {
            parsed.insert(key.to_string(), value);
        }
    };

    put("object_class", rdap.object_class_name.map(Value::from));
    put("handle", rdap.handle.map(Value::from));
    put("ldh_name", rdap.ldh_name.map(|n| Value::from(n.to_lowercase())));
    put("name", rdap.name.map(Value::from));
    if !rdap.status.is_empty() {
        put("status", Some(Value::from(rdap.status)));
    }

    let events: BTreeMap<String, String> = rdap
        .events
        .into_iter()
        .map(|e| (e.event_action, e.event_date))
        .collect();
    let creation = events.get("registration").cloned();
    let expiration = events.get("expiration").cloned();
    let updated = events.get("last changed").cloned();

    let now = Utc::now();
    put("created_ago", creation.as_deref().and_then(parse_iso_date).map(|d| Value::from((now - d).num_days())));
    put("updated_ago", updated.as_deref().and_then(parse_iso_date).map(|d| Value::from((now - d).num_days())));
    put("expires_in", expiration.as_deref().and_then(parse_iso_date).map(|d| Value::from((d - now).num_days())));
    put("creation_date", creation.map(Value::from));
    put("expiration_date", expiration.map(Value::from));
    put("updated_date", updated.map(Value::from));
    if !events.is_empty() {
        put("events", serde_json::to_value(&events).ok());
    }

    let nameservers: Vec<String> = rdap
        .nameservers
        .into_iter()
        .filter_map(|ns| ns.ldh_name)
        .map(|n| n.to_lowercase())
        .collect();
    if !nameservers.is_empty() {
        put("nameservers", Some(Value::from(nameservers)));
    }

    let mut entities = Vec::new();
    flatten_entities(&rdap.entities, &mut entities);
    let registrar = entities
        .iter()
        .find(|e| e["roles"].as_array().is_some_and(|roles| roles.iter().any(|r| *r == "registrar")))
        .and_then(|e| e.get("name").cloned());
    put("registrar", registrar);
    if !entities.is_empty() {
        put("entities", Some(Value::Array(entities)));
    }

    if kind.is_ip() {
        put("start_address", rdap.start_address.map(Value::from));
        put("end_address", rdap.end_address.map(Value::from));
        put("ip_version", rdap.ip_version.map(Value::from));
        let cidrs: Vec<String> = rdap
            .cidrs
            .into_iter()
            .filter_map(|c| {
                let prefix = c.v4prefix.or(c.v6prefix)?;
                Some(format!("{}/{}", prefix, c.length?))
            })
            .collect();
        if let Some(first) = cidrs.into_iter().next() {
            put("cidr", Some(Value::from(first)));
        }
    }
    if kind == TargetKind::Asn {
        put("start_autnum", rdap.start_autnum.map(Value::from));
        put("end_autnum", rdap.end_autnum.map(Value::from));
    }
    if kind != TargetKind::Domain {
        put("type", rdap.network_type.map(Value::from));
    }
    put("country", rdap.country.map(|c| Value::from(c.to_uppercase())));

    parsed
}

fn flatten_entities(entities: &[RdapEntity], out: &mut Vec<Value>) {
    for entity in entities {
        let mut obj = Map::new();
        if let Some(handle) = &entity.handle {
            obj.insert("handle".to_string(), json!(handle));
        }
        obj.insert("roles".to_string(), json!(entity.roles));
        if let Some(vcard) = &entity.vcard_array {
            for (field, property) in [("name", "fn"), ("email", "email"), ("kind", "kind")] {
                if let Some(value) = vcard_property(vcard, property) {
                    obj.insert(field.to_string(), json!(value));
                }
            }
        }
        out.push(Value::Object(obj));
        flatten_entities(&entity.entities, out);
    }
}

// jCard: ["vcard", [[name, params, type, value], ...]]
fn vcard_property(vcard: &Value, name: &str) -> Option<String> {
    vcard
        .get(1)?
        .as_array()?
        .iter()
        .filter_map(Value::as_array)
        .find(|prop| prop.first().and_then(Value::as_str) == Some(name))
        .and_then(|prop| prop.get(3))
        .and_then(Value::as_str)
        .map(str::to_string)
        .filter(|v| !v.is_empty())
}

fn parse_iso_date(date_str: &str) -> Option<DateTime<Utc>> {
    // RDAP dates are RFC 3339
    DateTime::parse_from_rfc3339(date_str).map(|dt| dt.with_timezone(&Utc)).ok()
}
