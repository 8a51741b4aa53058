//! In-process fakes shared by the unit tests: a counting upstream mock, a
//! scripted Whois TCP server and a minimal HTTP/1.1 responder for RDAP.

use crate::{
    errors::LookupError, orchestrator::Upstream, LookupResult, LookupTarget, Protocol,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;
use std::{
    collections::HashMap,
    net::SocketAddr,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::{
    io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader},
    net::TcpListener,
    task::JoinHandle,
};

pub fn sample_result(target: &str, protocol: Protocol) -> LookupResult {
    let target = LookupTarget::parse(target).expect("valid test target");
    let mut result = LookupResult::new(
        &target,
        protocol,
        "mock.test",
        format!("Domain Name: {}\nRegistrar: Example Registrar\n", target.as_str().to_uppercase()),
    );
    result.parsed.insert("registrar".to_string(), json!("Example Registrar"));
    result
}

/// Upstream double that counts fetches and answers with a fixed outcome.
pub struct MockUpstream {
    protocol: Protocol,
    calls: AtomicUsize,
    delay: Duration,
    error: Option<LookupError>,
}

impl MockUpstream {
    pub fn succeeding(protocol: Protocol) -> Self {
        Self { protocol, calls: AtomicUsize::new(0), delay: Duration::ZERO, error: None }
    }

    pub fn failing(protocol: Protocol, error: LookupError) -> Self {
        Self { error: Some(error), ..Self::succeeding(protocol) }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Upstream for MockUpstream {
    async fn fetch(&self, target: &LookupTarget) -> Result<LookupResult, LookupError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        match &self.error {
            Some(err) => Err(err.clone()),
            None => Ok(sample_result(target.as_str(), self.protocol)),
        }
    }
}

/// A listener on 127.0.0.1 that counts accepted connections.
pub struct FakeServer {
    pub addr: SocketAddr,
    hits: Arc<AtomicUsize>,
    requests: Arc<Mutex<Vec<String>>>,
    handle: JoinHandle<()>,
}

impl FakeServer {
    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().clone()
    }

    pub fn host(&self) -> String {
        self.addr.to_string()
    }

    pub fn base_url(&self) -> String {
        format!("http://{}/", self.addr)
    }
}

impl Drop for FakeServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Whois server that answers every query with `response` and closes.
pub async fn spawn_whois_server(response: impl Into<String>) -> FakeServer {
    let response = response.into();
    spawn_whois_server_with(move |_| response).await
}

/// Like `spawn_whois_server`, but the response may mention the server's own
/// address.
pub async fn spawn_whois_server_with(make_response: impl FnOnce(SocketAddr) -> String) -> FakeServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind whois listener");
    let addr = listener.local_addr().expect("listener address");
    let response = make_response(addr);
    let hits = Arc::new(AtomicUsize::new(0));
    let requests = Arc::new(Mutex::new(Vec::new()));

    let (task_hits, task_requests) = (hits.clone(), requests.clone());
    let handle = tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            task_hits.fetch_add(1, Ordering::SeqCst);
            let response = response.clone();
            let requests = task_requests.clone();
            tokio::spawn(async move {
                let mut reader = BufReader::new(stream);
                let mut line = String::new();
                if reader.read_line(&mut line).await.is_err() {
                    return;
                }
                requests.lock().push(line);
                let mut stream = reader.into_inner();
                let _ = stream.write_all(response.as_bytes()).await;
                let _ = stream.shutdown().await;
            });
        }
    });

    FakeServer { addr, hits, requests, handle }
}

/// Accepts connections and never answers.
pub async fn spawn_stalled_server() -> FakeServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind stalled listener");
    let addr = listener.local_addr().expect("listener address");
    let hits = Arc::new(AtomicUsize::new(0));

    let task_hits = hits.clone();
    let handle = tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((stream, _)) = listener.accept().await {
            task_hits.fetch_add(1, Ordering::SeqCst);
            held.push(stream);
        }
    });

    FakeServer { addr, hits, requests: Arc::new(Mutex::new(Vec::new())), handle }
}

/// An address nothing listens on.
pub async fn refused_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind listener");
    let addr = listener.local_addr().expect("listener address");
    drop(listener);
    addr
}

/// HTTP/1.1 responder mapping request paths to `(status, body)`; unknown
/// paths get a 404. For 3xx statuses the body is sent as `Location`.
pub async fn spawn_http_server(routes: Vec<(&str, u16, String)>) -> FakeServer {
    let routes: Arc<HashMap<String, (u16, String)>> = Arc::new(
        routes
            .into_iter()
            .map(|(path, status, body)| (path.to_string(), (status, body)))
            .collect(),
    );
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind http listener");
    let addr = listener.local_addr().expect("listener address");
    let hits = Arc::new(AtomicUsize::new(0));
    let requests = Arc::new(Mutex::new(Vec::new()));

    let (task_hits, task_requests) = (hits.clone(), requests.clone());
    let handle = tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            task_hits.fetch_add(1, Ordering::SeqCst);
            let routes = routes.clone();
            let requests = task_requests.clone();
            tokio::spawn(async move {
                let mut head = Vec::new();
                let mut buf = [0u8; 1024];
                while !head.windows(4).any(|w| w == b"\r\n\r\n") {
                    match stream.read(&mut buf).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => head.extend_from_slice(&buf[..n]),
                    }
                }
                let head = String::from_utf8_lossy(&head).into_owned();
                let path = head.split_whitespace().nth(1).unwrap_or("/").to_string();
                requests.lock().push(head);

                let (status, body) = routes
                    .get(&path)
                    .cloned()
                    .unwrap_or((404, r#"{"errorCode":404,"title":"Not Found"}"#.to_string()));
                let reply = if (300..400).contains(&status) {
                    format!(
                        "HTTP/1.1 {} Test\r\nLocation: {}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
                        status, body
                    )
                } else {
                    format!(
                        "HTTP/1.1 {} Test\r\nContent-Type: application/rdap+json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                        status,
                        body.len(),
                        body
                    )
                };
                let _ = stream.write_all(reply.as_bytes()).await;
                let _ = stream.shutdown().await;
            });
        }
    });

    FakeServer { addr, hits, requests, handle }
}
