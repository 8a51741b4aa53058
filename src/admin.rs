//! Auxiliary HTTP listener: `/health` and Prometheus `/metrics`. No lookup
//! routes live here; lookups go through the protocol session.

use crate::orchestrator::LookupOrchestrator;
use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Serialize;
use std::{io, sync::Arc};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

#[derive(Clone)]
pub struct AdminState {
    orchestrator: Arc<LookupOrchestrator>,
    metrics: Option<PrometheusHandle>,
}

impl AdminState {
    pub fn new(orchestrator: Arc<LookupOrchestrator>, metrics: Option<PrometheusHandle>) -> Self {
        Self { orchestrator, metrics }
    }
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    uptime_seconds: u64,
    cache_entries: usize,
    tracked_clients: usize,
    in_flight: usize,
}

pub fn router(state: AdminState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics_handler))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive())
                .into_inner(),
        )
        .with_state(state)
}

/// Serve the admin routes until the listener fails.
pub async fn serve(listener: TcpListener, state: AdminState) -> io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!("Admin listener on http://{} (/health, /metrics)", addr);
    }
    axum::serve(listener, router(state)).await
}

async fn health_check(State(state): State<AdminState>) -> Json<HealthResponse> {
    let orchestrator = &state.orchestrator;
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        uptime_seconds: orchestrator.config().start_time.elapsed().as_secs(),
        cache_entries: orchestrator.cache().len(),
        tracked_clients: orchestrator.rate_limiter().tracked_clients(),
        in_flight: orchestrator.in_flight_count(),
    })
}

async fn metrics_handler(State(state): State<AdminState>) -> impl IntoResponse {
    match &state.metrics {
        Some(handle) => (StatusCode::OK, handle.render()),
        None => (StatusCode::SERVICE_UNAVAILABLE, "Metrics not initialized".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::Config, test_support::MockUpstream, Protocol};
    use axum::{body::Body, http::Request};
    use metrics_exporter_prometheus::PrometheusBuilder;
    use serde_json::Value;
    use tower::ServiceExt;

    fn state(metrics: Option<PrometheusHandle>) -> AdminState {
        let orchestrator = LookupOrchestrator::with_upstreams(
            Arc::new(Config::default()),
            Arc::new(MockUpstream::succeeding(Protocol::Whois)),
            Arc::new(MockUpstream::succeeding(Protocol::Rdap)),
        );
        AdminState::new(Arc::new(orchestrator), metrics)
    }

    async fn get(app: Router, uri: &str) -> (StatusCode, String) {
        let response = app.oneshot(Request::get(uri).body(Body::empty()).unwrap()).await.unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn test_health_reports_cache_and_clients() {
        let state = state(None);
        state.orchestrator.lookup_whois("example.com", "c1").await.unwrap();

        let (status, body) = get(router(state), "/health").await;
        assert_eq!(status, StatusCode::OK);
        let health: Value = serde_json::from_str(&body).unwrap();
        assert_eq!(health["status"], "healthy");
        assert_eq!(health["cache_entries"], 1);
        assert_eq!(health["tracked_clients"], 1);
    }

    #[tokio::test]
    async fn test_metrics_without_recorder_is_unavailable() {
        let (status, _) = get(router(state(None)), "/metrics").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_metrics_renders_prometheus_text() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        metrics::with_local_recorder(&recorder, crate::metrics::record_cache_miss);

        let (status, body) = get(router(state(Some(handle))), "/metrics").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("gateway_cache_misses_total 1"));
    }

    #[tokio::test]
    async fn test_unknown_route_is_404() {
        let (status, _) = get(router(state(None)), "/whois/example.com").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
