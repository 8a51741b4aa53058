use crate::{target::TargetKind, ParsedFields};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::Value;
use tracing::debug;

const MAX_KEY_LENGTH: usize = 40;
const MAX_KEY_WORDS: usize = 5;
const MAX_NOTICE_LINE: usize = 80;

const NOT_FOUND_MARKERS: [&str; 6] = [
    "no match for",
    "not found",
    "no entries found",
    "no data found",
    "domain not found",
    "no matching record",
];

/// Best-effort extraction of `key: value` pairs from free-form Whois text.
///
/// Every recognisable line lands in the result under a snake_cased key; a
/// handful of well-known fields are additionally normalised into canonical
/// names. Nothing here fails: unknown layouts simply yield fewer fields.
#[derive(Debug, Default, Clone, Copy)]
pub struct WhoisParser;

#[derive(Default)]
struct Canonical {
    registrar: Option<String>,
    creation_date: Option<String>,
    expiration_date: Option<String>,
    updated_date: Option<String>,
    name_servers: Vec<String>,
    status: Vec<String>,
    registrant_name: Option<String>,
    registrant_email: Option<String>,
    admin_email: Option<String>,
    tech_email: Option<String>,
    network_range: Option<String>,
    network_name: Option<String>,
    organization: Option<String>,
    country: Option<String>,
}

fn set_once(slot: &mut Option<String>, value: &str) {
    if slot.is_none() && !value.to_lowercase().contains("select request") {
        *slot = Some(value.to_string());
    }
}

fn push_unique(list: &mut Vec<String>, value: String) {
    if !value.is_empty() && !list.contains(&value) {
        list.push(value);
    }
}

impl WhoisParser {
    pub fn new() -> Self {
        Self
    }

    pub fn parse(&self, data: &str, kind: TargetKind) -> ParsedFields {
        let mut fields = ParsedFields::new();
        let mut canonical = Canonical::default();

        for line in data.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('%') || line.starts_with('#') || line.starts_with(">>>") {
                continue;
            }

            let Some((raw_key, value)) = line.split_once(':') else { continue };
            let value = value.trim();
            if value.is_empty() || value.starts_with("//") {
                continue;
            }

            let key = raw_key.trim().to_lowercase();
            if key.is_empty() || key.len() > MAX_KEY_LENGTH || key.split_whitespace().count() > MAX_KEY_WORDS {
                continue;
            }

            insert_generic(&mut fields, &snake_case(&key), value);
            self.match_canonical(&mut canonical, &key, value, kind);
        }

        self.finish(fields, canonical)
    }

    // Order matters: date keys are checked before registrar so that
    // "Registrar Registration Expiration Date" is read as a date.
    fn match_canonical(&self, c: &mut Canonical, key: &str, value: &str, kind: TargetKind) {
        match key {
            k if k.contains("expir") || k.contains("expires") || k == "paid-till" => {
                set_once(&mut c.expiration_date, value)
            }
            k if k.contains("creation") || k.contains("created") || k == "registered" || k == "regdate" || k == "registration date" => {
                set_once(&mut c.creation_date, value)
            }
            k if k.contains("updated") || k.contains("modified") || k == "changed" || k == "last-modified" => {
                set_once(&mut c.updated_date, value)
            }
            "registrar" | "registrar name" | "sponsoring registrar" | "registrar organization" => {
                set_once(&mut c.registrar, value)
            }
            k if k.contains("name server") || k == "nserver" || k == "ns" || k == "nameserver" => {
                let server = value.split_whitespace().next().unwrap_or(value);
                push_unique(&mut c.name_servers, server.trim_end_matches('.').to_lowercase());
            }
            "status" | "domain status" | "state" => {
                let status = value.split_whitespace().next().unwrap_or(value);
                push_unique(&mut c.status, status.to_string());
            }
            "registrant name" | "registrant" | "registrant organization" | "owner name" => {
                set_once(&mut c.registrant_name, value)
            }
            k if k.contains("registrant") && (k.contains("email") || k.contains("e-mail")) => {
                set_once(&mut c.registrant_email, value)
            }
            k if k.contains("admin") && k.contains("email") => set_once(&mut c.admin_email, value),
            k if k.contains("tech") && k.contains("email") => set_once(&mut c.tech_email, value),
            _ if kind.is_ip() || kind == TargetKind::Asn => match key {
                "netrange" | "inetnum" | "inet6num" | "cidr" => set_once(&mut c.network_range, value),
                "netname" | "network name" | "as-name" | "asname" => set_once(&mut c.network_name, value),
                "orgname" | "org-name" | "organization" | "owner" => set_once(&mut c.organization, value),
                "country" | "country code" => set_once(&mut c.country, &value.to_uppercase()),
                _ => {}
            },
            _ => {}
        }
    }

    fn finish(&self, mut fields: ParsedFields, c: Canonical) -> ParsedFields {
        let now = Utc::now();
        let days_since = |date: &Option<String>| {
            date.as_deref().and_then(|d| self.parse_date(d)).map(|dt| (now - dt).num_days())
        };

        let created_ago = days_since(&c.creation_date);
        let updated_ago = days_since(&c.updated_date);
        let expires_in = c
            .expiration_date
            .as_deref()
            .and_then(|d| self.parse_date(d))
            .map(|dt| (dt - now).num_days());

        let strings = [
            ("registrar", c.registrar),
            ("creation_date", c.creation_date),
            ("expiration_date", c.expiration_date),
            ("updated_date", c.updated_date),
            ("registrant_name", c.registrant_name),
            ("registrant_email", c.registrant_email),
            ("admin_email", c.admin_email),
            ("tech_email", c.tech_email),
            ("network_range", c.network_range),
            ("network_name", c.network_name),
            ("organization", c.organization),
            ("country", c.country),
        ];
        for (name, value) in strings {
            if let Some(value) = value {
                fields.insert(name.to_string(), Value::String(value));
            }
        }

        for (name, list) in [("name_servers", c.name_servers), ("status", c.status)] {
            if !list.is_empty() {
                fields.insert(name.to_string(), Value::from(list));
            }
        }

        for (name, days) in [("created_ago", created_ago), ("updated_ago", updated_ago), ("expires_in", expires_in)] {
            if let Some(days) = days {
                fields.insert(name.to_string(), Value::from(days));
            }
        }

        fields
    }

    /// True when the response is a registry "no such object" notice.
    pub fn is_not_found(data: &str) -> bool {
        data.lines()
            .map(|line| line.trim().to_lowercase())
            .filter(|line| !line.is_empty() && line.len() <= MAX_NOTICE_LINE)
            .any(|line| NOT_FOUND_MARKERS.iter().any(|marker| line.contains(marker)))
    }

    /// Parse various date formats commonly found in whois data
    pub fn parse_date(&self, date_str: &str) -> Option<DateTime<Utc>> {
        let date_str = date_str.trim();

        if let Ok(dt) = DateTime::parse_from_rfc3339(date_str) {
            return Some(dt.with_timezone(&Utc));
        }

        let formats = [
            "%Y-%m-%dT%H:%M:%S%.fZ", // 2025-05-18T13:36:06.0Z
            "%Y-%m-%dT%H:%M:%S%z",   // 2025-05-18T13:36:06+0000
            "%Y-%m-%dT%H:%M:%SZ",
            "%Y-%m-%d %H:%M:%S",
        ];

        for format in &formats {
            if let Ok(dt) = DateTime::parse_from_str(date_str, format) {
                return Some(dt.with_timezone(&Utc));
            }
        }

        for format in &formats {
            if let Ok(naive_dt) = NaiveDateTime::parse_from_str(date_str, format) {
                return Some(DateTime::from_naive_utc_and_offset(naive_dt, Utc));
            }
        }

        let date_only_formats = [
            "%Y-%m-%d",
            "%d-%b-%Y",
            "%d %b %Y",
            "%Y/%m/%d",
            "%m/%d/%Y",
            "%d.%m.%Y",
            "%Y.%m.%d",
            "%Y%m%d",
        ];

        for format in &date_only_formats {
            if let Ok(naive_date) = chrono::NaiveDate::parse_from_str(date_str, format) {
                if let Some(naive_dt) = naive_date.and_hms_opt(0, 0, 0) {
                    return Some(DateTime::from_naive_utc_and_offset(naive_dt, Utc));
                }
            }
        }

        debug!("Failed to parse date: {}", date_str);
        None
    }
}

fn snake_case(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    for ch in key.chars() {
        if ch.is_alphanumeric() {
            out.push(ch);
        } else if !out.is_empty() && !out.ends_with('_') {
            out.push('_');
        }
    }
    while out.ends_with('_') {
        out.pop();
    }
    out
}

// First value wins; later distinct values for the same key collect into an array
fn insert_generic(fields: &mut ParsedFields, key: &str, value: &str) {
    if key.is_empty() {
        return;
    }
    let value = Value::String(value.to_string());
    match fields.get_mut(key) {
        None => {
            fields.insert(key.to_string(), value);
        }
        Some(Value::Array(values)) => {
            if !values.contains(&value) {
                values.push(value);
            }
        }
        Some(existing) => {
            if *existing != value {
                let first = existing.take();
                *existing = Value::Array(vec![first, value]);
            }
        }
    }
}
