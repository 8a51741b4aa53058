use anyhow::Context;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use whois_gateway::{Config, LookupOrchestrator, ProtocolServer};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Arc::new(Config::load().context("failed to load configuration")?);

    // stdout carries the protocol; logs go to stderr
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("whois_gateway={},tower_http=info", config.log_level))
        }))
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    info!("Configuration loaded successfully");
    info!(
        "Cache: {} entries, {}s TTL; rate limits: {}/s global, {}/s per client",
        config.cache_max_entries,
        config.cache_ttl_seconds,
        config.global_rate_limit_per_second,
        config.client_rate_limit_per_second
    );

    let orchestrator = Arc::new(LookupOrchestrator::new(config.clone()).context("failed to build lookup pipeline")?);

    #[cfg(feature = "server")]
    spawn_admin(&config, orchestrator.clone()).await;

    let server = ProtocolServer::new(orchestrator);
    info!("Serving tool protocol on stdio");

    tokio::select! {
        result = server.serve(tokio::io::stdin(), tokio::io::stdout()) => {
            result.context("protocol session failed")?;
            info!("Input closed, shutting down");
        }
        _ = shutdown_signal() => info!("Received shutdown signal, shutting down"),
    }

    Ok(())
}

#[cfg(feature = "server")]
async fn spawn_admin(config: &Config, orchestrator: Arc<LookupOrchestrator>) {
    use whois_gateway::{admin, metrics};

    let state = admin::AdminState::new(orchestrator, metrics::install_recorder());
    let addr = format!("{}:{}", config.bind_host, config.bind_port);

    match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => {
            tokio::spawn(async move {
                if let Err(e) = admin::serve(listener, state).await {
                    warn!("Admin listener stopped: {}", e);
                }
            });
        }
        // The protocol session does not depend on the admin listener
        Err(e) => warn!("Admin listener disabled, cannot bind {}: {}", addr, e),
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to install CTRL+C handler: {}", e);
        std::future::pending::<()>().await;
    }
}
