//! Metrics Exporter
//!
//! Serves [`BalancerMetrics`] in Prometheus text format on its own listener,
//! separate from the RPC port. Every path returns the metrics except
//! `/favicon.ico`, which answers `204 No Content` so browsers pointed at the
//! exporter do not log spurious errors.

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};

use crate::registry::BalancerMetrics;
use rpcbalancer_common::protocol::error::{BalancerError, Result};

/// HTTP server exposing the balancer's Prometheus metrics.
pub struct MetricsServer {
    metrics: Arc<BalancerMetrics>,
}

impl MetricsServer {
    pub fn new(metrics: Arc<BalancerMetrics>) -> Self {
        Self { metrics }
    }

    /// Builds the axum router without binding a socket.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/favicon.ico", get(favicon))
            .fallback(metrics_handler)
            .with_state(self.metrics.clone())
    }

    /// Binds to `addr` and serves until the process exits.
    pub async fn run(self, addr: SocketAddr) -> Result<()> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| BalancerError::Transport(format!("Failed to bind to {}: {}", addr, e)))?;
        self.serve(listener).await
    }

    /// Serves on an already-bound listener.
    pub async fn serve(self, listener: TcpListener) -> Result<()> {
        info!(
            "Metrics server listening on {}",
            listener.local_addr().map_err(|e| {
                BalancerError::Transport(format!("Failed to get local addr: {}", e))
            })?
        );

        axum::serve(listener, self.router())
            .await
            .map_err(|e| BalancerError::Transport(format!("Metrics server error: {}", e)))
    }
}

async fn metrics_handler(State(metrics): State<Arc<BalancerMetrics>>) -> Response {
    match metrics.encode() {
        Ok((content_type, buffer)) => {
            ([(header::CONTENT_TYPE, content_type)], buffer).into_response()
        }
        Err(e) => {
            error!(error = %e, "Failed to encode metrics");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to encode metrics".to_string(),
            )
                .into_response()
        }
    }
}

async fn favicon() -> StatusCode {
    StatusCode::NO_CONTENT
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn test_favicon_is_no_content() {
        assert_eq!(favicon().await, StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn test_metrics_handler_returns_text_format() {
        let metrics = Arc::new(BalancerMetrics::new().unwrap());
        metrics.record_invalid_request();

        let response = metrics_handler(State(metrics)).await;
        assert_eq!(response.status(), StatusCode::OK);

        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .unwrap()
            .to_str()
            .unwrap()
            .to_string();
        assert!(content_type.starts_with("text/plain"));

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains("num_requests_invalid 1"));
    }

    #[tokio::test]
    async fn test_server_serves_on_ephemeral_port() {
        let metrics = Arc::new(BalancerMetrics::new().unwrap());
        metrics.set_block_height(42);

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(MetricsServer::new(metrics).serve(listener));

        let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(b"GET /metrics HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
            .await
            .unwrap();
        let mut raw = String::new();
        stream.read_to_string(&mut raw).await.unwrap();

        assert!(raw.starts_with("HTTP/1.1 200"));
        assert!(raw.contains("block_height 42"));
    }
}
