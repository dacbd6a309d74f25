use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use rpcbalancer_common::protocol::error::{BalancerError, Result};
use rpcbalancer_metrics::BalancerMetrics;

/// Default bound on a single outbound attempt.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// A backend RPC endpoint with its health flag and its own HTTP client.
///
/// The health flag sits behind a lock owned by the node alone, separate from
/// the pool's structural lock, so concurrent selectors reading health never
/// contend on the pool. Every write republishes the `service_is_healthy`
/// gauge for this node's URI.
pub struct Node {
    uri: String,
    healthy: RwLock<bool>,
    client: reqwest::Client,
    timeout: Duration,
    metrics: Arc<BalancerMetrics>,
}

impl Node {
    /// Creates a healthy node with the default request timeout.
    pub fn new(uri: impl Into<String>, metrics: Arc<BalancerMetrics>) -> Result<Self> {
        Self::with_timeout(uri, DEFAULT_REQUEST_TIMEOUT, metrics)
    }

    /// Creates a healthy node whose client gives up on an attempt after `timeout`.
    pub fn with_timeout(
        uri: impl Into<String>,
        timeout: Duration,
        metrics: Arc<BalancerMetrics>,
    ) -> Result<Self> {
        let uri = uri.into();
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| {
                BalancerError::Transport(format!("Failed to build client for {}: {}", uri, e))
            })?;

        metrics.set_node_health(&uri, true);

        Ok(Self {
            uri,
            healthy: RwLock::new(true),
            client,
            timeout,
            metrics,
        })
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    /// Per-attempt bound applied by [`client`](Self::client).
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn is_healthy(&self) -> bool {
        *self.healthy.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Sets the health flag and republishes it, whether or not it changed.
    pub fn set_healthy(&self, healthy: bool) {
        let mut flag = self.healthy.write().unwrap_or_else(PoisonError::into_inner);
        *flag = healthy;
        self.metrics.set_node_health(&self.uri, healthy);
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("uri", &self.uri)
            .field("healthy", &self.is_healthy())
            .finish()
    }
}
