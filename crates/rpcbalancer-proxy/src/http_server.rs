//! HTTP Server for the Balancer
//!
//! Accepts JSON-RPC calls on any path and method and hands them to the
//! [`RequestForwarder`]. When a URL key is configured, a middleware checks
//! the first path segment before the forwarder runs and answers 401 on a
//! mismatch.
//!
//! Bodies are read up to a configurable cap; anything larger is answered
//! with 520 and counted as invalid without contacting a node.

use axum::{
    extract::{ConnectInfo, Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::Response,
    Router,
};
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tracing::{debug, info, warn};

use crate::forwarder::{error_response, RequestForwarder, STATUS_INVALID_REQUEST};
use rpcbalancer_common::protocol::error::{BalancerError, Result};
use rpcbalancer_common::protocol::JsonRpcError;
use rpcbalancer_common::AuthConfig;
use rpcbalancer_metrics::BalancerMetrics;

/// Default cap on an inbound body, in bytes.
pub const DEFAULT_MAX_BODY_SIZE: usize = 4 * 1024 * 1024;

#[derive(Clone)]
struct AppState {
    forwarder: Arc<RequestForwarder>,
    metrics: Arc<BalancerMetrics>,
    auth: Arc<AuthConfig>,
    max_body_size: usize,
}

/// Inbound JSON-RPC listener.
pub struct HttpServer {
    forwarder: Arc<RequestForwarder>,
    metrics: Arc<BalancerMetrics>,
    auth: AuthConfig,
    max_body_size: usize,
}

impl HttpServer {
    /// Creates a server with the URL-key gate disabled.
    pub fn new(forwarder: Arc<RequestForwarder>, metrics: Arc<BalancerMetrics>) -> Self {
        Self {
            forwarder,
            metrics,
            auth: AuthConfig::disabled(),
            max_body_size: DEFAULT_MAX_BODY_SIZE,
        }
    }

    pub fn with_auth(mut self, auth: AuthConfig) -> Self {
        self.auth = auth;
        self
    }

    /// Largest inbound body accepted, in bytes.
    pub fn with_max_body_size(mut self, max_body_size: usize) -> Self {
        self.max_body_size = max_body_size;
        self
    }

    /// Builds the axum router without binding a socket.
    ///
    /// The router needs `ConnectInfo<SocketAddr>`, so serve it with
    /// `into_make_service_with_connect_info`.
    pub fn router(&self) -> Router {
        let state = AppState {
            forwarder: self.forwarder.clone(),
            metrics: self.metrics.clone(),
            auth: Arc::new(self.auth.clone()),
            max_body_size: self.max_body_size,
        };

        Router::new()
            .fallback(handle_rpc)
            .layer(middleware::from_fn_with_state(state.clone(), require_url_key))
            .layer(CorsLayer::permissive())
            .with_state(state)
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
            auth = %self.auth,
            "RPC server listening on {}",
            listener.local_addr().map_err(|e| {
                BalancerError::Transport(format!("Failed to get local addr: {}", e))
            })?
        );

        let app = self.router();
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .map_err(|e| BalancerError::Transport(format!("Server error: {}", e)))
    }
}

async fn handle_rpc(
    State(state): State<AppState>,
    ConnectInfo(client_addr): ConnectInfo<SocketAddr>,
    request: Request,
) -> Response {
    let (parts, body) = request.into_parts();
    let body = match axum::body::to_bytes(body, state.max_body_size).await {
        Ok(body) => body,
        Err(e) => {
            state.metrics.record_invalid_request();
            debug!(
                client = %client_addr,
                limit = state.max_body_size,
                error = %e,
                "Rejected unreadable request body"
            );
            return error_response(
                STATUS_INVALID_REQUEST,
                Value::Null,
                JsonRpcError::server_error(&format!(
                    "request body exceeds {} bytes",
                    state.max_body_size
                )),
            );
        }
    };

    state
        .forwarder
        .handle_request(body, &parts.headers, client_addr)
        .await
}

async fn require_url_key(State(state): State<AppState>, request: Request, next: Next) -> Response {
    if state.auth.validate_path(request.uri().path()) {
        return next.run(request).await;
    }

    state.metrics.record_denied_request();
    warn!(method = %request.method(), "Denied request with wrong url key");
    error_response(
        StatusCode::UNAUTHORIZED.as_u16(),
        Value::Null,
        JsonRpcError::unauthorized(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::NodePool;
    use crate::selection::SelectionMethod;

    fn server_with_metrics() -> (HttpServer, Arc<BalancerMetrics>) {
        let metrics = Arc::new(BalancerMetrics::new().unwrap());
        let forwarder = Arc::new(RequestForwarder::new(
            Arc::new(NodePool::new(SelectionMethod::Failover)),
            metrics.clone(),
        ));
        (HttpServer::new(forwarder, metrics.clone()), metrics)
    }

    fn server() -> HttpServer {
        server_with_metrics().0
    }

    async fn spawn(server: HttpServer) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(server.serve(listener));
        addr
    }

    #[test]
    fn test_auth_disabled_by_default() {
        let server = server();
        assert!(!server.auth.requires_auth());
    }

    #[test]
    fn test_with_auth() {
        let server = server().with_auth(AuthConfig::with_url_key("k"));
        assert!(server.auth.requires_auth());
        assert_eq!(server.auth.to_string(), "UrlKey(*****)");
    }

    #[test]
    fn test_default_body_limit() {
        assert_eq!(server().max_body_size, DEFAULT_MAX_BODY_SIZE);
        assert_eq!(server().with_max_body_size(1024).max_body_size, 1024);
    }

    #[tokio::test]
    async fn test_oversized_body_is_invalid() {
        let (server, metrics) = server_with_metrics();
        let addr = spawn(server.with_max_body_size(64)).await;

        let params = "0".repeat(128);
        let response = reqwest::Client::new()
            .post(format!("http://{}/", addr))
            .body(format!(
                r#"{{"jsonrpc":"2.0","method":"eth_sendRawTransaction","params":["0x{}"],"id":1}}"#,
                params
            ))
            .send()
            .await
            .unwrap();

        assert_eq!(response.status().as_u16(), STATUS_INVALID_REQUEST);
        assert_eq!(metrics.invalid_requests(), 1);
        assert_eq!(metrics.requests_by_method("eth_sendRawTransaction"), 0);
    }

    #[tokio::test]
    async fn test_serves_on_ephemeral_port() {
        let addr = spawn(server()).await;

        // empty pool, no fallback: decodable call ends in 521
        let response = reqwest::Client::new()
            .post(format!("http://{}/", addr))
            .body(r#"{"jsonrpc":"2.0","method":"eth_chainId","id":1}"#)
            .send()
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 521);
    }
}
