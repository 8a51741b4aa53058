//! JSON-RPC tool protocol over a duplex byte stream.
//!
//! One envelope per line. Lookups run on their own tasks and answer in
//! completion order; a single writer task owns the output so responses never
//! interleave.

use crate::{
    config::Config,
    errors::RpcError,
    orchestrator::LookupOrchestrator,
    LookupResult, LookupTarget, Protocol, TargetKind,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::{io, sync::Arc};
use tokio::{
    io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader},
    sync::mpsc,
};
use tracing::{debug, info, warn};

pub const PROTOCOL_VERSION: &str = "2024-11-05";
pub const SERVER_NAME: &str = "whois-gateway";
const DEFAULT_CLIENT_ID: &str = "mcp_client";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionState {
    Uninitialized,
    Initialized,
}

struct Session {
    state: SessionState,
    client_id: Arc<str>,
}

#[derive(Debug, Deserialize)]
struct ToolCallParams {
    name: String,
    #[serde(default)]
    arguments: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct ResourceReadParams {
    uri: String,
}

/// A lookup to run off the read loop.
struct LookupCall {
    protocol: Protocol,
    target: String,
    resource_uri: Option<String>,
    use_cache: bool,
}

pub struct ProtocolServer {
    orchestrator: Arc<LookupOrchestrator>,
}

impl ProtocolServer {
    pub fn new(orchestrator: Arc<LookupOrchestrator>) -> Self {
        Self { orchestrator }
    }

    /// Run one session until `input` reaches EOF, then wait for in-flight
    /// responses to be written.
    pub async fn serve<R, W>(&self, input: R, output: W) -> io::Result<()>
    where
        R: AsyncRead + Unpin + Send,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel::<Value>();
        let writer = tokio::spawn(write_responses(rx, output));

        let mut session = Session { state: SessionState::Uninitialized, client_id: Arc::from(DEFAULT_CLIENT_ID) };
        let mut reader = BufReader::new(input);
        let mut buf = Vec::new();

        loop {
            buf.clear();
            if reader.read_until(b'\n', &mut buf).await? == 0 {
                break;
            }
            let line = match std::str::from_utf8(&buf) {
                Ok(line) => line.trim(),
                Err(e) => {
                    let _ = tx.send(failure(Value::Null, &RpcError::Parse(e.to_string())));
                    continue;
                }
            };
            if line.is_empty() {
                continue;
            }
            self.handle_message(&mut session, line, &tx);
        }

        debug!("Input closed, draining in-flight responses");
        drop(tx);
        match writer.await {
            Ok(result) => result,
            Err(e) => Err(io::Error::new(io::ErrorKind::Other, e)),
        }
    }

    fn handle_message(&self, session: &mut Session, line: &str, tx: &mpsc::UnboundedSender<Value>) {
        let message: Value = match serde_json::from_str(line) {
            Ok(message) => message,
            Err(e) => {
                warn!("Unparseable request: {}", e);
                let _ = tx.send(failure(Value::Null, &RpcError::Parse(e.to_string())));
                return;
            }
        };

        let Some(envelope) = message.as_object() else {
            let _ = tx.send(failure(Value::Null, &RpcError::InvalidRequest("request must be a JSON object".into())));
            return;
        };
        let id = envelope.get("id").cloned();
        let Some(method) = envelope.get("method").and_then(Value::as_str) else {
            let err = RpcError::InvalidRequest("missing method".into());
            let _ = tx.send(failure(id.unwrap_or(Value::Null), &err));
            return;
        };
        let params = envelope.get("params").cloned().unwrap_or(Value::Null);

        // Notifications never get a response
        let Some(id) = id else {
            debug!(method, "Notification received");
            return;
        };

        match self.dispatch(session, method, params) {
            Ok(Dispatch::Reply(result)) => {
                let _ = tx.send(success(id, result));
            }
            Ok(Dispatch::Lookup(call)) => self.spawn_lookup(call, id, session.client_id.clone(), tx.clone()),
            Err(err) => {
                debug!(method, code = err.code(), "Request rejected: {}", err);
                let _ = tx.send(failure(id, &err));
            }
        }
    }

    fn dispatch(&self, session: &mut Session, method: &str, params: Value) -> Result<Dispatch, RpcError> {
        match method {
            "initialize" => {
                if session.state == SessionState::Initialized {
                    return Err(RpcError::InvalidState("session already initialized".into()));
                }
                if let Some(name) = params
                    .pointer("/clientInfo/name")
                    .and_then(Value::as_str)
                    .filter(|n| !n.trim().is_empty())
                {
                    session.client_id = Arc::from(name);
                }
                session.state = SessionState::Initialized;
                info!(client_id = %session.client_id, "Session initialized");
                Ok(Dispatch::Reply(initialize_result()))
            }
            "ping" => Ok(Dispatch::Reply(json!({}))),
            "tools/list" => Ok(Dispatch::Reply(json!({ "tools": tool_definitions() }))),
            "resources/list" => Ok(Dispatch::Reply(json!({ "resources": resource_definitions() }))),
            "resources/templates/list" => Ok(Dispatch::Reply(json!({ "resourceTemplates": resource_templates() }))),
            "tools/call" => {
                require_initialized(session)?;
                parse_tool_call(params).map(Dispatch::Lookup)
            }
            "resources/read" => {
                require_initialized(session)?;
                parse_resource_read(params).map(Dispatch::Lookup)
            }
            other => Err(RpcError::MethodNotFound(other.to_string())),
        }
    }

    fn spawn_lookup(&self, call: LookupCall, id: Value, client_id: Arc<str>, tx: mpsc::UnboundedSender<Value>) {
        let orchestrator = self.orchestrator.clone();
        tokio::spawn(async move {
            let response = match orchestrator
                .lookup_with(call.protocol, &call.target, &client_id, call.use_cache)
                .await {
                Ok(result) => {
                    let body = match &call.resource_uri {
                        Some(uri) => resource_result(uri, &result),
                        None => tool_result(&result),
                    };
                    match body {
                        Ok(body) => success(id, body),
                        Err(err) => failure(id, &err),
                    }
                }
                Err(err) => failure(id, &RpcError::Lookup(err)),
            };
            let _ = tx.send(response);
        });
    }
}

enum Dispatch {
    Reply(Value),
    Lookup(LookupCall),
}

/// Build the production pipeline and serve one session over the given
/// stream halves.
pub async fn serve_protocol<R, W>(config: Arc<Config>, input: R, output: W) -> io::Result<()>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let orchestrator = LookupOrchestrator::new(config).map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
    ProtocolServer::new(Arc::new(orchestrator)).serve(input, output).await
}

async fn write_responses<W>(mut rx: mpsc::UnboundedReceiver<Value>, mut output: W) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(message) = rx.recv().await {
        let mut line = serde_json::to_vec(&message)?;
        line.push(b'\n');
        output.write_all(&line).await?;
        output.flush().await?;
    }
    output.shutdown().await
}

fn require_initialized(session: &Session) -> Result<(), RpcError> {
    match session.state {
        SessionState::Initialized => Ok(()),
        SessionState::Uninitialized => Err(RpcError::InvalidState("session not initialized".into())),
    }
}

fn parse_tool_call(params: Value) -> Result<LookupCall, RpcError> {
    let call: ToolCallParams =
        serde_json::from_value(params).map_err(|e| RpcError::InvalidParams(format!("tools/call: {}", e)))?;

    let protocol = match call.name.as_str() {
        "whois_lookup" => Protocol::Whois,
        "rdap_lookup" => Protocol::Rdap,
        other => return Err(RpcError::InvalidParams(format!("unknown tool: {}", other))),
    };
    let arguments = call.arguments.unwrap_or(Value::Null);
    let target = arguments
        .get("target")
        .and_then(Value::as_str)
        .ok_or_else(|| RpcError::InvalidParams("missing string argument 'target'".into()))?;
    let use_cache = match arguments.get("use_cache") {
        None | Some(Value::Null) => true,
        Some(Value::Bool(flag)) => *flag,
        Some(_) => return Err(RpcError::InvalidParams("argument 'use_cache' must be a boolean".into())),
    };

    Ok(LookupCall { protocol, target: target.to_string(), resource_uri: None, use_cache })
}

fn parse_resource_read(params: Value) -> Result<LookupCall, RpcError> {
    let read: ResourceReadParams =
        serde_json::from_value(params).map_err(|e| RpcError::InvalidParams(format!("resources/read: {}", e)))?;
    let (protocol, target) = parse_resource_uri(&read.uri)?;
    Ok(LookupCall { protocol, target, resource_uri: Some(read.uri), use_cache: true })
}

/// `whois://domain/{x}`, `rdap://ip/{x}`, ...
fn parse_resource_uri(uri: &str) -> Result<(Protocol, String), RpcError> {
    let invalid = || RpcError::InvalidParams(format!("unsupported resource URI: {}", uri));

    let (scheme, rest) = uri.split_once("://").ok_or_else(invalid)?;
    let protocol = match scheme {
        "whois" => Protocol::Whois,
        "rdap" => Protocol::Rdap,
        _ => return Err(invalid()),
    };
    let (segment, value) = rest.split_once('/').ok_or_else(invalid)?;
    if value.is_empty() || value.contains('/') {
        return Err(invalid());
    }

    // Let the orchestrator report unparseable values; only reject a kind mismatch here
    if let Ok(target) = LookupTarget::parse(value) {
        let matches = match segment {
            "domain" => target.kind() == TargetKind::Domain,
            "ip" => target.kind().is_ip(),
            "asn" => target.kind() == TargetKind::Asn,
            _ => false,
        };
        if !matches {
            return Err(invalid());
        }
    } else if !matches!(segment, "domain" | "ip" | "asn") {
        return Err(invalid());
    }

    Ok((protocol, value.to_string()))
}

fn tool_result(result: &LookupResult) -> Result<Value, RpcError> {
    let text = serde_json::to_string_pretty(result).map_err(|e| RpcError::Internal(e.to_string()))?;
    Ok(json!({
        "content": [{ "type": "text", "text": text }],
        "structuredContent": result,
        "isError": false,
    }))
}

fn resource_result(uri: &str, result: &LookupResult) -> Result<Value, RpcError> {
    let text = serde_json::to_string_pretty(result).map_err(|e| RpcError::Internal(e.to_string()))?;
    Ok(json!({
        "contents": [{ "uri": uri, "mimeType": "application/json", "text": text }]
    }))
}

fn success(id: Value, result: Value) -> Value {
    json!({ "jsonrpc": "2.0", "id": id, "result": result })
}

fn failure(id: Value, err: &RpcError) -> Value {
    json!({ "jsonrpc": "2.0", "id": id, "error": err.to_error_object() })
}

fn initialize_result() -> Value {
    json!({
        "protocolVersion": PROTOCOL_VERSION,
        "capabilities": {
            "tools": { "listChanged": false },
            "resources": { "subscribe": false, "listChanged": false }
        },
        "serverInfo": {
            "name": SERVER_NAME,
            "version": env!("CARGO_PKG_VERSION")
        },
        "tools": tool_definitions(),
        "resourceTemplates": resource_templates(),
    })
}

fn tool_definitions() -> Value {
    let target_schema = |description: &str| {
        json!({
            "type": "object",
            "properties": {
                "target": { "type": "string", "description": description },
                "use_cache": {
                    "type": "boolean",
                    "description": "Serve from and store into the result cache",
                    "default": true
                }
            },
            "required": ["target"]
        })
    };
    json!([
        {
            "name": "whois_lookup",
            "description": "Whois lookup for a domain, IP address or AS number",
            "inputSchema": target_schema("Domain name, IPv4/IPv6 address, or ASN such as AS15169")
        },
        {
            "name": "rdap_lookup",
            "description": "RDAP lookup for a domain, IP address or AS number",
            "inputSchema": target_schema("Domain name, IPv4/IPv6 address, or ASN such as AS15169")
        }
    ])
}

fn resource_definitions() -> Value {
    let resource = |uri: &str, name: &str, description: &str| {
        json!({
            "uri": uri,
            "name": name,
            "description": description,
            "mimeType": "application/json"
        })
    };
    json!([
        resource("whois://domain/{domain}", "Whois domain lookup", "Whois record for a domain name"),
        resource("whois://ip/{ip}", "Whois IP lookup", "Whois record for an IPv4 or IPv6 address"),
        resource("rdap://domain/{domain}", "RDAP domain lookup", "RDAP record for a domain name"),
        resource("rdap://ip/{ip}", "RDAP IP lookup", "RDAP network record for an IPv4 or IPv6 address"),
    ])
}

fn resource_templates() -> Value {
    let template = |scheme: &str, segment: &str, var: &str, name: &str| {
        json!({
            "uriTemplate": format!("{}://{}/{{{}}}", scheme, segment, var),
            "name": name,
            "mimeType": "application/json"
        })
    };
    json!([
        template("whois", "domain", "domain", "Whois domain record"),
        template("whois", "ip", "ip", "Whois IP record"),
        template("whois", "asn", "asn", "Whois ASN record"),
        template("rdap", "domain", "domain", "RDAP domain record"),
        template("rdap", "ip", "ip", "RDAP IP network record"),
        template("rdap", "asn", "asn", "RDAP autonomous system record"),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{errors::LookupError, test_support::MockUpstream};
    use std::time::Duration;
    use tokio::{
        io::{split, AsyncBufReadExt, DuplexStream, Lines, ReadHalf, WriteHalf},
        task::JoinHandle,
    };

    struct TestSession {
        writer: Option<WriteHalf<DuplexStream>>,
        lines: Lines<BufReader<ReadHalf<DuplexStream>>>,
        server: JoinHandle<io::Result<()>>,
    }

    impl TestSession {
        fn start(whois: Arc<MockUpstream>, rdap: Arc<MockUpstream>, config: Config) -> Self {
            let orchestrator = LookupOrchestrator::with_upstreams(Arc::new(config), whois, rdap);
            let server = ProtocolServer::new(Arc::new(orchestrator));

            let (client_side, server_side) = tokio::io::duplex(64 * 1024);
            let (server_read, server_write) = split(server_side);
            let server = tokio::spawn(async move { server.serve(server_read, server_write).await });

            let (client_read, client_write) = split(client_side);
            Self { writer: Some(client_write), lines: BufReader::new(client_read).lines(), server }
        }

        fn with_mocks() -> Self {
            Self::start(
                Arc::new(MockUpstream::succeeding(Protocol::Whois)),
                Arc::new(MockUpstream::succeeding(Protocol::Rdap)),
                Config::default(),
            )
        }

        async fn send_raw(&mut self, line: &str) {
            let writer = self.writer.as_mut().expect("input still open");
            writer.write_all(line.as_bytes()).await.unwrap();
            writer.write_all(b"\n").await.unwrap();
        }

        async fn send(&mut self, message: Value) {
            self.send_raw(&message.to_string()).await;
        }

        async fn recv(&mut self) -> Value {
            let line = tokio::time::timeout(Duration::from_secs(5), self.lines.next_line())
                .await
                .expect("response in time")
                .unwrap()
                .expect("response line");
            serde_json::from_str(&line).unwrap()
        }

        async fn request(&mut self, id: Value, method: &str, params: Value) -> Value {
            self.send(json!({ "jsonrpc": "2.0", "id": id, "method": method, "params": params })).await;
            self.recv().await
        }

        async fn initialize(&mut self, client_name: &str) -> Value {
            self.request(json!(0), "initialize", json!({ "clientInfo": { "name": client_name, "version": "1.0" } }))
                .await
        }

        async fn close_input(&mut self) {
            if let Some(mut writer) = self.writer.take() {
                writer.shutdown().await.unwrap();
            }
        }

        async fn close(mut self) -> io::Result<()> {
            self.close_input().await;
            self.server.await.unwrap()
        }
    }

    #[tokio::test]
    async fn test_tool_call_before_initialize_is_invalid_state() {
        let whois = Arc::new(MockUpstream::succeeding(Protocol::Whois));
        let mut session = TestSession::start(
            whois.clone(),
            Arc::new(MockUpstream::succeeding(Protocol::Rdap)),
            Config::default(),
        );

        let response = session
            .request(json!(1), "tools/call", json!({ "name": "whois_lookup", "arguments": { "target": "example.com" } }))
            .await;
        assert_eq!(response["id"], 1);
        assert_eq!(response["error"]["code"], -32002);
        assert_eq!(response["error"]["data"]["kind"], "InvalidState");
        assert_eq!(whois.calls(), 0);

        // The rejected call did not change state; initialize still works
        let response = session.initialize("tester").await;
        assert_eq!(response["result"]["protocolVersion"], PROTOCOL_VERSION);
    }

    #[tokio::test]
    async fn test_initialize_declares_tools_and_templates() {
        let mut session = TestSession::with_mocks();

        let response = session.initialize("tester").await;
        let result = &response["result"];
        assert_eq!(result["serverInfo"]["name"], SERVER_NAME);
        let tools: Vec<&str> = result["tools"].as_array().unwrap().iter().map(|t| t["name"].as_str().unwrap()).collect();
        assert_eq!(tools, vec!["whois_lookup", "rdap_lookup"]);
        let templates = result["resourceTemplates"].as_array().unwrap();
        assert!(templates.iter().any(|t| t["uriTemplate"] == "rdap://ip/{ip}"));

        let again = session.initialize("tester").await;
        assert_eq!(again["error"]["code"], -32002);
    }

    #[tokio::test]
    async fn test_tool_call_returns_lookup_result() {
        let mut session = TestSession::with_mocks();
        session.initialize("tester").await;

        let response = session
            .request(json!("req-7"), "tools/call", json!({ "name": "whois_lookup", "arguments": { "target": "Example.COM" } }))
            .await;

        assert_eq!(response["id"], "req-7");
        let result = &response["result"];
        assert_eq!(result["isError"], false);
        assert_eq!(result["structuredContent"]["target"], "example.com");
        assert_eq!(result["structuredContent"]["protocol"], "whois");
        let text = result["content"][0]["text"].as_str().unwrap();
        assert!(text.contains("Example Registrar"));
    }

    #[tokio::test]
    async fn test_use_cache_false_refetches() {
        let whois = Arc::new(MockUpstream::succeeding(Protocol::Whois));
        let mut session =
            TestSession::start(whois.clone(), Arc::new(MockUpstream::succeeding(Protocol::Rdap)), Config::default());
        session.initialize("tester").await;

        let call = |id: i64, use_cache: Value| {
            json!({ "jsonrpc": "2.0", "id": id, "method": "tools/call",
                    "params": { "name": "whois_lookup", "arguments": { "target": "example.com", "use_cache": use_cache } } })
        };
        for (id, use_cache) in [(1, json!(true)), (2, json!(true)), (3, json!(false))] {
            session.send(call(id, use_cache)).await;
            let response = session.recv().await;
            assert_eq!(response["result"]["structuredContent"]["target"], "example.com");
        }
        assert_eq!(whois.calls(), 2);

        session.send(call(4, json!("no"))).await;
        let response = session.recv().await;
        assert_eq!(response["error"]["code"], -32602);
        assert_eq!(whois.calls(), 2);
    }

    #[tokio::test]
    async fn test_tools_declare_use_cache_argument() {
        let mut session = TestSession::with_mocks();

        let response = session.request(json!(1), "tools/list", json!({})).await;
        for tool in response["result"]["tools"].as_array().unwrap() {
            let use_cache = &tool["inputSchema"]["properties"]["use_cache"];
            assert_eq!(use_cache["type"], "boolean");
            assert_eq!(use_cache["default"], true);
        }
    }

    #[tokio::test]
    async fn test_resources_list_names_lookup_resources() {
        let mut session = TestSession::with_mocks();

        let response = session.request(json!(1), "resources/list", json!({})).await;
        let resources = response["result"]["resources"].as_array().unwrap();
        let uris: Vec<&str> = resources.iter().map(|r| r["uri"].as_str().unwrap()).collect();
        assert_eq!(
            uris,
            vec!["whois://domain/{domain}", "whois://ip/{ip}", "rdap://domain/{domain}", "rdap://ip/{ip}"]
        );
        for resource in resources {
            assert_eq!(resource["mimeType"], "application/json");
            assert!(resource["name"].is_string());
            assert!(resource["description"].is_string());
        }
    }

    #[tokio::test]
    async fn test_parse_error_keeps_session_alive() {
        let mut session = TestSession::with_mocks();

        session.send_raw("{this is not json").await;
        let response = session.recv().await;
        assert_eq!(response["error"]["code"], -32700);
        assert_eq!(response["id"], Value::Null);

        let response = session.request(json!(2), "ping", json!({})).await;
        assert_eq!(response["id"], 2);
        assert_eq!(response["result"], json!({}));
    }

    #[tokio::test]
    async fn test_unknown_method_and_bad_params() {
        let mut session = TestSession::with_mocks();
        session.initialize("tester").await;

        let response = session.request(json!(3), "tools/explode", json!({})).await;
        assert_eq!(response["error"]["code"], -32601);

        let response = session.request(json!(4), "tools/call", json!({ "name": "whois_lookup", "arguments": {} })).await;
        assert_eq!(response["error"]["code"], -32602);

        let response = session
            .request(json!(5), "tools/call", json!({ "name": "dig", "arguments": { "target": "example.com" } }))
            .await;
        assert_eq!(response["error"]["code"], -32602);
    }

    #[tokio::test]
    async fn test_resource_read_routes_to_rdap() {
        let rdap = Arc::new(MockUpstream::succeeding(Protocol::Rdap));
        let mut session =
            TestSession::start(Arc::new(MockUpstream::succeeding(Protocol::Whois)), rdap.clone(), Config::default());
        session.initialize("tester").await;

        let response = session.request(json!(6), "resources/read", json!({ "uri": "rdap://ip/8.8.8.8" })).await;
        let contents = &response["result"]["contents"][0];
        assert_eq!(contents["uri"], "rdap://ip/8.8.8.8");
        assert_eq!(contents["mimeType"], "application/json");
        assert!(contents["text"].as_str().unwrap().contains("8.8.8.8"));
        assert_eq!(rdap.calls(), 1);

        let response = session.request(json!(7), "resources/read", json!({ "uri": "whois://ip/example.com" })).await;
        assert_eq!(response["error"]["code"], -32602);
    }

    #[tokio::test]
    async fn test_lookup_errors_keep_kind() {
        let mut session = TestSession::start(
            Arc::new(MockUpstream::failing(Protocol::Whois, LookupError::Unavailable("registry down".into()))),
            Arc::new(MockUpstream::succeeding(Protocol::Rdap)),
            Config::default(),
        );
        session.initialize("tester").await;

        let response = session
            .request(json!(8), "tools/call", json!({ "name": "whois_lookup", "arguments": { "target": "example.com" } }))
            .await;
        assert_eq!(response["error"]["code"], -32000);
        assert_eq!(response["error"]["data"]["kind"], "Unavailable");
        assert!(response["error"]["data"]["message"].as_str().unwrap().contains("registry down"));
    }

    #[tokio::test]
    async fn test_client_name_is_rate_limit_identity() {
        let config = Config { client_rate_limit_burst: 1, client_rate_limit_per_second: 0.01, ..Config::default() };
        let mut session = TestSession::start(
            Arc::new(MockUpstream::succeeding(Protocol::Whois)),
            Arc::new(MockUpstream::succeeding(Protocol::Rdap)),
            config,
        );
        session.initialize("alice").await;

        let call = json!({ "name": "whois_lookup", "arguments": { "target": "example.com" } });
        assert!(session.request(json!(1), "tools/call", call.clone()).await["result"].is_object());
        let response = session.request(json!(2), "tools/call", call).await;
        assert_eq!(response["error"]["data"]["kind"], "RateLimited");
        assert!(response["error"]["message"].as_str().unwrap().contains("alice"));
    }

    #[tokio::test]
    async fn test_notifications_get_no_response() {
        let mut session = TestSession::with_mocks();
        session.initialize("tester").await;

        session.send(json!({ "jsonrpc": "2.0", "method": "notifications/initialized" })).await;
        let response = session.request(json!(9), "ping", json!(null)).await;
        assert_eq!(response["id"], 9);
    }

    #[tokio::test]
    async fn test_eof_waits_for_in_flight_responses() {
        let mut session = TestSession::start(
            Arc::new(MockUpstream::succeeding(Protocol::Whois).with_delay(Duration::from_millis(100))),
            Arc::new(MockUpstream::succeeding(Protocol::Rdap)),
            Config::default(),
        );
        session.initialize("tester").await;

        session
            .send(json!({ "jsonrpc": "2.0", "id": 10, "method": "tools/call",
                          "params": { "name": "whois_lookup", "arguments": { "target": "slow.com" } } }))
            .await;
        session.close_input().await;

        let response = session.recv().await;
        assert_eq!(response["id"], 10);
        assert!(response["result"].is_object());
        assert!(session.close().await.is_ok());
    }

    #[tokio::test]
    async fn test_serve_protocol_with_builtin_pipeline() {
        let (client_side, server_side) = tokio::io::duplex(16 * 1024);
        let (server_read, server_write) = split(server_side);
        let server =
            tokio::spawn(async move { serve_protocol(Arc::new(Config::default()), server_read, server_write).await });

        let (client_read, mut client_write) = split(client_side);
        let mut lines = BufReader::new(client_read).lines();
        client_write.write_all(b"{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"tools/list\"}\n").await.unwrap();
        let response: Value = serde_json::from_str(&lines.next_line().await.unwrap().unwrap()).unwrap();
        assert_eq!(response["result"]["tools"].as_array().unwrap().len(), 2);

        client_write.shutdown().await.unwrap();
        assert!(server.await.unwrap().is_ok());
    }

    #[test]
    fn test_resource_uri_parsing() {
        assert_eq!(parse_resource_uri("whois://domain/example.com").unwrap(), (Protocol::Whois, "example.com".to_string()));
        assert_eq!(parse_resource_uri("rdap://asn/AS15169").unwrap(), (Protocol::Rdap, "AS15169".to_string()));
        assert!(parse_resource_uri("http://domain/example.com").is_err());
        assert!(parse_resource_uri("whois://domain/").is_err());
        assert!(parse_resource_uri("whois://mailbox/example.com").is_err());
    }
}
