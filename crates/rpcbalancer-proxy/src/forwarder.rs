//! Request Forwarder
//!
//! Takes a raw inbound JSON-RPC call, picks a node from the pool and relays
//! the call, demoting and moving past nodes that fail. The body is forwarded
//! byte-for-byte; only the method names are read, for labeling.

use axum::{
    body::{Body, Bytes},
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::Value;
use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{debug, error, warn};

use crate::node::Node;
use crate::pool::NodePool;
use crate::selection::Selection;
use rpcbalancer_common::protocol::error::{BalancerError, Result};
use rpcbalancer_common::protocol::{InboundCall, JsonRpcError, JsonRpcResponse};
use rpcbalancer_metrics::BalancerMetrics;

/// Status returned when the inbound body is not a JSON-RPC envelope.
pub const STATUS_INVALID_REQUEST: u16 = 520;
/// Status returned when no node (fallback included) could serve the call.
pub const STATUS_NO_HEALTHY_NODE: u16 = 521;

const X_FORWARDED_FOR: &str = "x-forwarded-for";

/// Headers that describe a single hop, or are recomputed per hop.
const HOP_BY_HOP: [&str; 10] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
    "host",
    "content-length",
];

/// Backend response relayed to the caller.
#[derive(Debug)]
pub(crate) struct Relayed {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
}

impl IntoResponse for Relayed {
    fn into_response(self) -> Response {
        let mut response = Response::new(Body::from(self.body));
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        response
    }
}

/// Drives selection and delivery for one inbound call at a time.
///
/// Cheap to share: it only holds `Arc`s, and each call keeps its own retry
/// state.
pub struct RequestForwarder {
    pool: Arc<NodePool>,
    metrics: Arc<BalancerMetrics>,
}

impl RequestForwarder {
    pub fn new(pool: Arc<NodePool>, metrics: Arc<BalancerMetrics>) -> Self {
        Self { pool, metrics }
    }

    /// Handles one inbound call end to end.
    ///
    /// A body that does not decode is answered with
    /// [`STATUS_INVALID_REQUEST`] and never reaches a node. Otherwise the call
    /// is relayed and the first successful backend response is returned as
    /// is; if every candidate fails the caller gets
    /// [`STATUS_NO_HEALTHY_NODE`] with a JSON-RPC error body.
    pub async fn handle_request(
        &self,
        body: Bytes,
        headers: &HeaderMap,
        client_addr: SocketAddr,
    ) -> Response {
        let call = match InboundCall::decode(&body) {
            Ok(call) => call,
            Err(e) => {
                self.metrics.record_invalid_request();
                debug!(client = %client_addr, error = %e, "Rejected undecodable request");
                return error_response(
                    STATUS_INVALID_REQUEST,
                    Value::Null,
                    JsonRpcError::parse_error(),
                );
            }
        };

        for method in call.methods() {
            self.metrics.record_request(method);
        }

        match self.forward(&body, headers, client_addr).await {
            Ok(relayed) => relayed.into_response(),
            Err(e) => error_response(
                STATUS_NO_HEALTHY_NODE,
                call.id(),
                JsonRpcError::server_error(&e.to_string()),
            ),
        }
    }

    /// Bounded retry loop over the pool.
    ///
    /// Every regular node that fails is demoted and excluded for the rest of
    /// this call, so the loop ends within `node_count + 1` attempts: a
    /// success, a fallback attempt, or exhaustion.
    async fn forward(
        &self,
        body: &Bytes,
        headers: &HeaderMap,
        client_addr: SocketAddr,
    ) -> Result<Relayed> {
        let max_attempts = self.pool.node_count() + 1;
        let mut tried: HashSet<String> = HashSet::new();

        for attempt in 1..=max_attempts {
            let (node, is_fallback) = match self.pool.select_node_excluding(&tried) {
                Selection::Node(node) => (node, false),
                Selection::Fallback(node) => (node, true),
                Selection::Exhausted => return Err(BalancerError::NoHealthyNode),
            };

            debug!(
                node = node.uri(),
                attempt,
                max_attempts,
                fallback = is_fallback,
                "Forwarding request"
            );

            match send(&node, body, headers, client_addr).await {
                Ok(relayed) => return Ok(relayed),
                Err(e) if is_fallback => {
                    error!(node = node.uri(), error = %e, "Request failed at fallback");
                    return Err(BalancerError::FallbackFailure(e.to_string()));
                }
                Err(e) => {
                    warn!(node = node.uri(), error = %e, "Node failed, marking unhealthy");
                    node.set_healthy(false);
                    self.metrics.record_failover(node.uri());
                    tried.insert(node.uri().to_string());
                }
            }
        }

        Err(BalancerError::NoHealthyNode)
    }
}

/// One outbound attempt. Any transport error or non-2xx status is a failure.
async fn send(
    node: &Node,
    body: &Bytes,
    headers: &HeaderMap,
    client_addr: SocketAddr,
) -> Result<Relayed> {
    let response = node
        .client()
        .post(node.uri())
        .headers(outbound_headers(headers, client_addr))
        .body(body.clone())
        .send()
        .await
        .map_err(|e| classify(node, e))?;

    let status = response.status();
    if !status.is_success() {
        return Err(BalancerError::NodeUnavailable(format!(
            "{} responded with {}",
            node.uri(),
            status
        )));
    }

    let headers = relayable_headers(response.headers());
    let body = response.bytes().await.map_err(|e| classify(node, e))?;

    Ok(Relayed {
        status,
        headers,
        body,
    })
}

fn classify(node: &Node, err: reqwest::Error) -> BalancerError {
    if err.is_timeout() {
        BalancerError::timeout(node.timeout())
    } else {
        BalancerError::NodeUnavailable(format!("{}: {}", node.uri(), err))
    }
}

fn is_relayable(name: &HeaderName) -> bool {
    !HOP_BY_HOP.contains(&name.as_str())
}

/// Inbound headers minus per-hop ones, with `X-Forwarded-For` set to the caller.
pub(crate) fn outbound_headers(inbound: &HeaderMap, client_addr: SocketAddr) -> HeaderMap {
    let mut headers = relayable_headers(inbound);
    if let Ok(value) = HeaderValue::from_str(&client_addr.ip().to_string()) {
        headers.insert(X_FORWARDED_FOR, value);
    }
    headers
}

fn relayable_headers(source: &HeaderMap) -> HeaderMap {
    let mut headers = HeaderMap::with_capacity(source.len());
    for (name, value) in source.iter().filter(|(name, _)| is_relayable(name)) {
        headers.append(name.clone(), value.clone());
    }
    headers
}

/// Maps a balancer-originated code to a `StatusCode`.
pub(crate) fn balancer_status(code: u16) -> StatusCode {
    StatusCode::from_u16(code).unwrap_or(StatusCode::BAD_GATEWAY)
}

pub(crate) fn error_response(code: u16, id: Value, error: JsonRpcError) -> Response {
    (
        balancer_status(code),
        Json(JsonRpcResponse::error(id, error)),
    )
        .into_response()
}
