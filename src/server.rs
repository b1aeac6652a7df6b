//! HTTP server for health and metrics endpoints

use std::net::SocketAddr;

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use eyre::{eyre, Result};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::listener::{ListenerState, SharedStats};
use crate::metrics;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub chain_id: u8,
    pub chain_name: String,
    pub state: ListenerState,
    pub retries_remaining: u32,
    pub cycles: u64,
    pub deposits_fetched: u64,
    pub messages_routed: u64,
    pub last_successful_poll: Option<String>,
}

async fn health_check(State(stats): State<SharedStats>) -> (StatusCode, Json<HealthResponse>) {
    let stats = stats.read().await;
    let (code, status) = match stats.state {
        ListenerState::Fatal => (StatusCode::SERVICE_UNAVAILABLE, "fatal"),
        ListenerState::Stopped => (StatusCode::SERVICE_UNAVAILABLE, "stopped"),
        ListenerState::Retrying => (StatusCode::OK, "degraded"),
        ListenerState::Polling | ListenerState::Draining => (StatusCode::OK, "healthy"),
    };

    (
        code,
        Json(HealthResponse {
            status,
            chain_id: stats.chain_id,
            chain_name: stats.chain_name.clone(),
            state: stats.state,
            retries_remaining: stats.retries_remaining,
            cycles: stats.cycles,
            deposits_fetched: stats.deposits_fetched,
            messages_routed: stats.messages_routed,
            last_successful_poll: stats.last_successful_poll.map(|t| t.to_rfc3339()),
        }),
    )
}

/// Liveness probe (always returns OK if server is running)
async fn liveness() -> &'static str {
    "OK"
}

/// Prometheus metrics endpoint
async fn prometheus_metrics() -> Response {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        metrics::render(),
    )
        .into_response()
}

pub fn router(stats: SharedStats) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/healthz", get(liveness))
        .route("/metrics", get(prometheus_metrics))
        .with_state(stats)
}

/// Serve health and metrics until `shutdown` is cancelled
pub async fn start_server(port: u16, stats: SharedStats, shutdown: CancellationToken) -> Result<()> {
    let addr: SocketAddr = format!("0.0.0.0:{}", port)
        .parse()
        .map_err(|e| eyre!("Invalid bind port {}: {}", port, e))?;
    info!("Health server listening on {}", addr);
    info!("  /health  - Listener status (JSON)");
    info!("  /metrics - Prometheus metrics");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router(stats))
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await?;

    Ok(())
}
