use crate::{
    config::Config,
    errors::LookupError,
    orchestrator::Upstream,
    parser::WhoisParser,
    registry::ServerRegistry,
    LookupResult, LookupTarget, Protocol,
};
use async_trait::async_trait;
use serde_json::Value;
use std::{io::ErrorKind, sync::Arc};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
    sync::Semaphore,
    time::timeout,
};
use tracing::{debug, info, warn};

const WHOIS_PORT: u16 = 43;
const READ_CHUNK: usize = 8192;

const REFERRAL_KEYS: [&str; 5] = [
    "refer",
    "whois",
    "referralserver",
    "registrar whois server",
    "whois server",
];

/// Raw bytes of one Whois exchange, already decoded.
struct RawResponse {
    text: String,
    truncated: bool,
}

pub struct WhoisClient {
    config: Arc<Config>,
    registry: Arc<ServerRegistry>,
    parser: WhoisParser,
    query_semaphore: Arc<Semaphore>,
}

impl WhoisClient {
    pub fn new(config: Arc<Config>, registry: Arc<ServerRegistry>) -> Self {
        info!("WhoisClient initialized with {} concurrent connections", config.concurrent_whois_queries);
        Self {
            query_semaphore: Arc::new(Semaphore::new(config.concurrent_whois_queries)),
            config,
            registry,
            parser: WhoisParser::new(),
        }
    }

    /// Query the authoritative server for `target`, following referrals up
    /// to the configured hop cap. The last server reached supplies the record.
    pub async fn lookup(&self, target: &LookupTarget) -> Result<LookupResult, LookupError> {
        let initial_server = self.registry.whois_server_for(target)?;
        let query = target.as_str();

        let mut response = self.raw_whois_query(&initial_server, query).await?;
        let mut current_server = initial_server;
        let mut chain = vec![current_server.clone()];

        while let Some(referral) = extract_referral(&response.text) {
            if chain.iter().any(|visited| same_server(visited, &referral)) {
                debug!(server = %current_server, referral = %referral, "Referral points to a visited server, stopping");
                break;
            }
            if chain.len() > self.config.max_referrals {
                warn!(query = %target, chain = ?chain, "Referral hop cap reached");
                return Err(LookupError::TooManyReferrals(self.config.max_referrals));
            }

            debug!("Following referral from {} to {}", current_server, referral);
            match self.raw_whois_query(&referral, query).await {
                Ok(referred) => {
                    response = referred;
                    current_server = referral;
                    chain.push(current_server.clone());
                }
                Err(e) => {
                    warn!("Failed to query referral server {}: {}", referral, e);
                    break;
                }
            }
        }

        let mut parsed = self.parser.parse(&response.text, target.kind());
        if WhoisParser::is_not_found(&response.text)
            && !parsed.contains_key("registrar")
            && !parsed.contains_key("creation_date")
        {
            debug!(query = %target, server = %current_server, "Registry reports no match");
            return Err(LookupError::NotFound(target.to_string()));
        }
        parsed.insert("referral_chain".to_string(), Value::from(chain));

        let mut result = LookupResult::new(target, Protocol::Whois, current_server, response.text);
        result.parsed = parsed;
        result.truncated = response.truncated;
        Ok(result)
    }

    async fn raw_whois_query(&self, server: &str, query: &str) -> Result<RawResponse, LookupError> {
        // Acquire semaphore permit to limit concurrent connections
        let _permit = self
            .query_semaphore
            .acquire()
            .await
            .map_err(|_| LookupError::Internal("Whois semaphore closed".to_string()))?;

        self.execute_whois_query(server, query).await
    }

    async fn execute_whois_query(&self, server: &str, query: &str) -> Result<RawResponse, LookupError> {
        let (host, port) = split_host_port(server);

        let mut stream = match timeout(
            self.config.whois_connect_timeout(),
            TcpStream::connect((host.as_str(), port)),
        )
        .await
        {
            Err(_) => return Err(LookupError::ConnectionTimeout(server.to_string())),
            Ok(Err(e)) if e.kind() == ErrorKind::ConnectionRefused => {
                return Err(LookupError::ConnectionRefused(server.to_string()))
            }
            Ok(Err(e)) => return Err(LookupError::Unavailable(format!("{}: {}", server, e))),
            Ok(Ok(stream)) => stream,
        };

        if let Err(e) = stream.set_nodelay(true) {
            debug!("Failed to set TCP_NODELAY: {}", e);
        }

        let query_line = format!("{}\r\n", query);
        timeout(self.config.whois_timeout(), stream.write_all(query_line.as_bytes()))
            .await?
            .map_err(|e| LookupError::Unavailable(format!("{}: {}", server, e)))?;

        let max_size = self.config.max_response_size;
        let mut buffer = vec![0u8; READ_CHUNK];
        let mut response = Vec::new();
        let mut truncated = false;

        loop {
            match timeout(self.config.whois_timeout(), stream.read(&mut buffer)).await {
                Ok(Ok(0)) => break, // EOF
                Ok(Ok(n)) => {
                    response.extend_from_slice(&buffer[..n]);
                    if response.len() > max_size {
                        warn!(server, limit = max_size, "Whois response exceeds size limit, truncating");
                        response.truncate(max_size);
                        truncated = true;
                        break;
                    }
                }
                // Some servers never close; keep whatever already arrived
                Ok(Err(e)) if !response.is_empty() => {
                    debug!("Read error from {} after {} bytes: {}", server, response.len(), e);
                    break;
                }
                Ok(Err(e)) => return Err(LookupError::Unavailable(format!("{}: {}", server, e))),
                Err(_) if !response.is_empty() => {
                    debug!("Read timeout from {} after {} bytes", server, response.len());
                    break;
                }
                Err(elapsed) => return Err(elapsed.into()),
            }
        }

        let mut text = decode_response(server, response, truncated)?;
        if text.len() > max_size {
            // Latin-1 decoding widens bytes above 0x7f
            let mut cut = max_size;
            while !text.is_char_boundary(cut) {
                cut -= 1;
            }
            text.truncate(cut);
            truncated = true;
        }
        debug!(server, bytes = text.len(), truncated, "Whois query complete");
        Ok(RawResponse { text, truncated })
    }
}

#[async_trait]
impl Upstream for WhoisClient {
    async fn fetch(&self, target: &LookupTarget) -> Result<LookupResult, LookupError> {
        self.lookup(target).await
    }
}

fn decode_response(server: &str, bytes: Vec<u8>, truncated: bool) -> Result<String, LookupError> {
    let malformed = |reason: &str| LookupError::MalformedResponse {
        server: server.to_string(),
        reason: reason.to_string(),
    };

    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Err(malformed("empty response"));
    }
    if bytes.contains(&0) {
        return Err(malformed("binary payload"));
    }

    Ok(match String::from_utf8(bytes) {
        Ok(text) => text,
        // The size cut split the final code point
        Err(e) if truncated && e.utf8_error().error_len().is_none() => {
            let valid = e.utf8_error().valid_up_to();
            String::from_utf8_lossy(&e.as_bytes()[..valid]).into_owned()
        }
        // Legacy registries answer in Latin-1
        Err(e) => e.into_bytes().into_iter().map(char::from).collect(),
    })
}

/// First referral marker in `data`, normalized to `host` or `host:port`.
fn extract_referral(data: &str) -> Option<String> {
    data.lines().find_map(|line| {
        let (key, value) = line.trim().split_once(':')?;
        let key = key.trim().to_lowercase();
        if !REFERRAL_KEYS.contains(&key.as_str()) {
            return None;
        }
        normalize_referral(value)
    })
}

fn normalize_referral(value: &str) -> Option<String> {
    let value = value.trim().trim_end_matches('/').to_lowercase();
    let host = match value.strip_prefix("whois://") {
        Some(rest) => rest.to_string(),
        // rwhois://, http(s):// and friends are not Whois servers
        None if value.contains("://") => return None,
        None => value,
    };

    if host.is_empty() || host.contains(char::is_whitespace) || !host.contains('.') {
        return None;
    }
    Some(host)
}

/// Split `host[:port]` (or `[v6]:port`), defaulting to port 43.
pub fn split_host_port(server: &str) -> (String, u16) {
    let server = server.trim();

    if let Some(rest) = server.strip_prefix('[') {
        if let Some((host, tail)) = rest.split_once(']') {
            let port = tail.strip_prefix(':').and_then(|p| p.parse().ok()).unwrap_or(WHOIS_PORT);
            return (host.to_string(), port);
        }
    }

    match server.rsplit_once(':') {
        Some((host, port)) if !host.contains(':') => match port.parse() {
            Ok(port) => (host.to_string(), port),
            Err(_) => (server.to_string(), WHOIS_PORT),
        },
        _ => (server.to_string(), WHOIS_PORT),
    }
}

fn same_server(a: &str, b: &str) -> bool {
    let (host_a, port_a) = split_host_port(a);
    let (host_b, port_b) = split_host_port(b);
    port_a == port_b && host_a.eq_ignore_ascii_case(&host_b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{refused_addr, spawn_stalled_server, spawn_whois_server, spawn_whois_server_with};

    fn client_for(registry: ServerRegistry, config: Config) -> WhoisClient {
        WhoisClient::new(Arc::new(config), Arc::new(registry))
    }

    fn test_config() -> Config {
        Config { whois_timeout_seconds: 2, whois_connect_timeout_seconds: 2, ..Config::default() }
    }

    fn com_registry(server: &str) -> ServerRegistry {
        ServerRegistry::empty().with_whois_tld("com", server)
    }

    fn target(raw: &str) -> LookupTarget {
        LookupTarget::parse(raw).unwrap()
    }

    #[tokio::test]
    async fn test_parses_registrar_from_server() {
        let server = spawn_whois_server("Domain Name: EXAMPLE.COM\nRegistrar: Example Registrar\n").await;
        let client = client_for(com_registry(&server.host()), test_config());

        let result = client.lookup(&target("example.com")).await.unwrap();

        assert_eq!(result.parsed["registrar"], "Example Registrar");
        assert_eq!(result.source_server, server.host());
        assert_eq!(result.protocol, Protocol::Whois);
        assert!(!result.truncated);
        assert_eq!(server.requests(), vec!["example.com\r\n".to_string()]);
    }

    #[tokio::test]
    async fn test_follows_thin_registry_referral() {
        let registrar = spawn_whois_server("Domain Name: EXAMPLE.COM\nRegistrar: Thick Registrar\n").await;
        let registry = spawn_whois_server(format!(
            "Domain Name: EXAMPLE.COM\nRegistrar WHOIS Server: {}\nRegistrar: Thin Entry\n",
            registrar.host()
        ))
        .await;
        let client = client_for(com_registry(&registry.host()), test_config());

        let result = client.lookup(&target("example.com")).await.unwrap();

        assert_eq!(result.parsed["registrar"], "Thick Registrar");
        assert_eq!(result.source_server, registrar.host());
        assert_eq!(
            result.parsed["referral_chain"],
            serde_json::json!([registry.host(), registrar.host()])
        );
        assert_eq!(registry.hits(), 1);
        assert_eq!(registrar.hits(), 1);
    }

    #[tokio::test]
    async fn test_hop_cap_yields_too_many_referrals() {
        let third = spawn_whois_server("Registrar: Third\n").await;
        let second = spawn_whois_server(format!("Registrar: Second\nwhois: whois://{}/\n", third.host())).await;
        let first = spawn_whois_server(format!("refer: {}\n", second.host())).await;
        let config = Config { max_referrals: 1, ..test_config() };
        let client = client_for(com_registry(&first.host()), config);

        let err = client.lookup(&target("example.com")).await.unwrap_err();

        assert_eq!(err, LookupError::TooManyReferrals(1));
        assert_eq!(second.hits(), 1);
        assert_eq!(third.hits(), 0);
    }

    #[tokio::test]
    async fn test_self_referral_ends_chain() {
        let server =
            spawn_whois_server_with(|addr| format!("Registrar: Loop Registrar\nWhois Server: {}\n", addr)).await;
        let client = client_for(com_registry(&server.host()), test_config());

        let result = client.lookup(&target("example.com")).await.unwrap();

        assert_eq!(server.hits(), 1);
        assert_eq!(result.parsed["registrar"], "Loop Registrar");
    }

    #[tokio::test]
    async fn test_failed_referral_keeps_last_record() {
        let dead = refused_addr().await;
        let server = spawn_whois_server(format!("Registrar: Registry Copy\nReferralServer: whois://{}\n", dead)).await;
        let client = client_for(com_registry(&server.host()), test_config());

        let result = client.lookup(&target("example.com")).await.unwrap();

        assert_eq!(result.parsed["registrar"], "Registry Copy");
        assert_eq!(result.source_server, server.host());
    }

    #[tokio::test]
    async fn test_ignores_rwhois_referrals() {
        let server = spawn_whois_server("NetName: TEST-NET\nReferralServer: rwhois://rwhois.example.net:4321\n").await;
        let registry = ServerRegistry::empty()
            .with_ip_route("192.0.2.0/24", Some(server.host().as_str()), vec![])
            .unwrap();
        let client = client_for(registry, test_config());

        let result = client.lookup(&target("192.0.2.1")).await.unwrap();
        assert_eq!(result.parsed["network_name"], "TEST-NET");
        assert_eq!(server.hits(), 1);
    }

    #[tokio::test]
    async fn test_oversized_response_is_truncated() {
        let server = spawn_whois_server(format!("Registrar: Big\n{}", "x".repeat(4096))).await;
        let config = Config { max_response_size: 64, ..test_config() };
        let client = client_for(com_registry(&server.host()), config);

        let result = client.lookup(&target("example.com")).await.unwrap();

        assert!(result.truncated);
        assert_eq!(result.raw.len(), 64);
        assert_eq!(result.parsed["registrar"], "Big");
    }

    #[tokio::test]
    async fn test_truncation_never_exceeds_limit_or_splits_a_char() {
        let server = spawn_whois_server(format!("Registrar: Big\n{}", "é".repeat(100))).await;
        let config = Config { max_response_size: 64, ..test_config() };
        let client = client_for(com_registry(&server.host()), config);

        let result = client.lookup(&target("example.com")).await.unwrap();

        assert!(result.truncated);
        assert!(result.raw.len() <= 64);
        assert!(!result.raw.contains('\u{FFFD}'));
        assert!(result.raw.ends_with('é'));
    }

    #[test]
    fn test_decodes_latin1_payloads() {
        let text = decode_response("whois.test", b"Registrant: Soci\xe9t\xe9 G\xe9n\xe9rale\n".to_vec(), false).unwrap();
        assert_eq!(text, "Registrant: Société Générale\n");

        // Cut mid code point at the size limit
        let mut bytes = "Owner: Zoë".as_bytes().to_vec();
        bytes.pop();
        assert_eq!(decode_response("whois.test", bytes, true).unwrap(), "Owner: Zo");
    }

    #[tokio::test]
    async fn test_empty_response_is_malformed() {
        let server = spawn_whois_server("").await;
        let client = client_for(com_registry(&server.host()), test_config());

        let err = client.lookup(&target("example.com")).await.unwrap_err();
        assert!(matches!(err, LookupError::MalformedResponse { .. }));
    }

    #[tokio::test]
    async fn test_no_match_is_not_found() {
        let server = spawn_whois_server("No match for \"NOPE.COM\".\n>>> Last update of whois database <<<\n").await;
        let client = client_for(com_registry(&server.host()), test_config());

        let err = client.lookup(&target("nope.com")).await.unwrap_err();
        assert_eq!(err, LookupError::NotFound("nope.com".to_string()));
    }

    #[tokio::test]
    async fn test_connection_refused() {
        let dead = refused_addr().await;
        let client = client_for(com_registry(&dead.to_string()), test_config());

        let err = client.lookup(&target("example.com")).await.unwrap_err();
        assert_eq!(err, LookupError::ConnectionRefused(dead.to_string()));
    }

    #[tokio::test]
    async fn test_silent_server_times_out() {
        let server = spawn_stalled_server().await;
        let config = Config { whois_timeout_seconds: 1, ..test_config() };
        let client = client_for(com_registry(&server.host()), config);

        let err = client.lookup(&target("example.com")).await.unwrap_err();
        assert_eq!(err, LookupError::Timeout);
    }

    #[tokio::test]
    async fn test_unsupported_tld() {
        let client = client_for(ServerRegistry::empty(), test_config());
        let err = client.lookup(&target("example.com")).await.unwrap_err();
        assert!(matches!(err, LookupError::NotSupportedTld(_)));
    }

    #[test]
    fn test_split_host_port() {
        assert_eq!(split_host_port("whois.verisign-grs.com"), ("whois.verisign-grs.com".to_string(), 43));
        assert_eq!(split_host_port("127.0.0.1:4343"), ("127.0.0.1".to_string(), 4343));
        assert_eq!(split_host_port("[::1]:4343"), ("::1".to_string(), 4343));
        assert_eq!(split_host_port("2001:db8::1"), ("2001:db8::1".to_string(), 43));
    }

    #[test]
    fn test_referral_extraction() {
        assert_eq!(extract_referral("refer:        whois.verisign-grs.com\n"), Some("whois.verisign-grs.com".to_string()));
        assert_eq!(
            extract_referral("ReferralServer: whois://whois.ripe.net/\n"),
            Some("whois.ripe.net".to_string())
        );
        assert_eq!(extract_referral("ReferralServer: rwhois://rwhois.example.net:4321\n"), None);
        assert_eq!(extract_referral("Registrar URL: http://www.markmonitor.com\n"), None);
        assert_eq!(extract_referral("whois:\n"), None);
    }
}
