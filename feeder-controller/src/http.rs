use std::net::SocketAddr;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::monitor::ConnectionMonitor;

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub connected: bool,
    pub uptime_secs: u64,
}

pub fn router(monitor: ConnectionMonitor) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/status", get(status_handler))
        .with_state(monitor)
}

/// Serve [`router`] on `addr` until `cancel` fires.
pub async fn serve(
    addr: SocketAddr,
    monitor: ConnectionMonitor,
    cancel: CancellationToken,
) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!(http_addr = %addr, "HTTP server listening");

    let result = axum::serve(listener, router(monitor))
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await;
    if let Err(e) = &result {
        error!(error = ?e, "HTTP server error");
    }
    info!("HTTP server shut down");
    result
}

async fn health_handler() -> &'static str {
    "OK"
}

async fn status_handler(State(monitor): State<ConnectionMonitor>) -> Json<StatusResponse> {
    Json(StatusResponse {
        connected: monitor.is_connected(),
        uptime_secs: monitor.uptime_secs(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn status_reflects_connection_flag() {
        let monitor = ConnectionMonitor::new();
        monitor.set_connected(true);

        let Json(body) = status_handler(State(monitor)).await;

        assert!(body.connected);
        assert_eq!(
            serde_json::to_value(&body).unwrap()["connected"],
            serde_json::Value::Bool(true)
        );
    }

    #[tokio::test]
    async fn health_is_ok() {
        assert_eq!(health_handler().await, "OK");
    }
}
