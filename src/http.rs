//! Liveness endpoint.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::orchestrator::SubscriberStore;
use crate::{AppError, Result};

/// Body of `GET /health`.
#[derive(Debug, Serialize)]
pub struct HealthReport {
    /// Always `"ok"` while the process serves requests.
    pub status: &'static str,
    /// Live subscribers.
    pub subscribers: usize,
    /// Timers waiting in the multiplexer, cancelled ones included.
    pub pending_timers: usize,
}

async fn health(State(store): State<Arc<SubscriberStore>>) -> Json<HealthReport> {
    Json(HealthReport {
        status: "ok",
        subscribers: store.len(),
        pending_timers: store.engine().timers().pending_len(),
    })
}

/// Routes served by the health endpoint.
#[must_use]
pub fn router(store: Arc<SubscriberStore>) -> Router {
    Router::new().route("/health", get(health)).with_state(store)
}

/// Serve `GET /health` on `port` until `ct` is cancelled.
///
/// # Errors
///
/// Returns `AppError::Config` if the port cannot be bound, or
/// `AppError::Io` if the server fails.
pub async fn serve_health(
    port: u16,
    store: Arc<SubscriberStore>,
    ct: CancellationToken,
) -> Result<()> {
    let bind = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .map_err(|err| AppError::Config(format!("failed to bind health endpoint on {bind}: {err}")))?;

    info!(%bind, "starting health endpoint");

    axum::serve(listener, router(store))
        .with_graceful_shutdown(async move { ct.cancelled().await })
        .await
        .map_err(|err| AppError::Io(format!("health endpoint error: {err}")))?;

    info!("health endpoint shut down");
    Ok(())
}
