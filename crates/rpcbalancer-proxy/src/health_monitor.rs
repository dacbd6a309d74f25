use futures::future::join_all;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::node::Node;
use crate::pool::NodePool;
use rpcbalancer_common::protocol::error::{BalancerError, Result};
use rpcbalancer_common::protocol::{JsonRpcRequest, JsonRpcResponse};
use rpcbalancer_metrics::BalancerMetrics;

/// JSON-RPC method used as the liveness probe.
pub const PROBE_METHOD: &str = "eth_blockNumber";

/// Health monitor configuration.
#[derive(Debug, Clone)]
pub struct HealthCheckConfig {
    pub interval: Duration,
    pub timeout: Duration,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            timeout: Duration::from_millis(2000),
        }
    }
}

/// Background task that reinstates unhealthy nodes.
///
/// Only nodes currently marked unhealthy are probed, and the fallback is
/// never probed. Demotion is the forwarder's job; the monitor only promotes.
pub struct HealthMonitor {
    pool: Arc<NodePool>,
    metrics: Arc<BalancerMetrics>,
    config: HealthCheckConfig,
}

impl HealthMonitor {
    pub fn new(
        pool: Arc<NodePool>,
        metrics: Arc<BalancerMetrics>,
        config: HealthCheckConfig,
    ) -> Self {
        Self {
            pool,
            metrics,
            config,
        }
    }

    /// Starts the monitor task.
    pub fn spawn(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            self.run().await;
        })
    }

    async fn run(self) {
        let mut interval = tokio::time::interval(self.config.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            interval.tick().await;
            self.check_unhealthy_nodes().await;
        }
    }

    /// Runs one tick: probes every unhealthy node concurrently.
    ///
    /// Returns how many nodes were reinstated.
    pub async fn check_unhealthy_nodes(&self) -> usize {
        let unhealthy: Vec<Arc<Node>> = self
            .pool
            .nodes()
            .into_iter()
            .filter(|node| !node.is_healthy())
            .collect();

        if unhealthy.is_empty() {
            return 0;
        }
        debug!(count = unhealthy.len(), "Probing unhealthy nodes");

        let timeout = self.config.timeout;
        let probes = unhealthy.into_iter().map(|node| async move {
            let result = probe(&node, timeout).await;
            (node, result)
        });

        let mut recovered = 0;
        for (node, result) in join_all(probes).await {
            match result {
                Ok(height) => {
                    node.set_healthy(true);
                    self.metrics.set_block_height(height);
                    info!(node = node.uri(), block_height = height, "Node is healthy again");
                    recovered += 1;
                }
                Err(BalancerError::RateLimited(_)) => {
                    warn!(node = node.uri(), "Health check rate limited");
                }
                Err(e) => {
                    warn!(node = node.uri(), error = %e, "Health check failed");
                }
            }
        }
        recovered
    }
}

/// Sends the liveness probe and returns the reported chain height.
async fn probe(node: &Node, timeout: Duration) -> Result<u64> {
    let request = JsonRpcRequest::new(PROBE_METHOD, json!([]), json!(1));

    let response = node
        .client()
        .post(node.uri())
        .timeout(timeout)
        .json(&request)
        .send()
        .await
        .map_err(|e| {
            if e.is_timeout() {
                BalancerError::timeout(timeout)
            } else {
                BalancerError::HealthProbe(format!("{}: {}", node.uri(), e))
            }
        })?;

    let status = response.status();
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        return Err(BalancerError::RateLimited(node.uri().to_string()));
    }
    if !status.is_success() {
        return Err(BalancerError::HealthProbe(format!(
            "{} responded with {}",
            node.uri(),
            status
        )));
    }

    let body = response
        .bytes()
        .await
        .map_err(|e| BalancerError::HealthProbe(format!("{}: {}", node.uri(), e)))?;
    let envelope: JsonRpcResponse = serde_json::from_slice(&body)
        .map_err(|e| BalancerError::InvalidResponse(format!("{}: {}", node.uri(), e)))?;

    if let Some(error) = envelope.error {
        return Err(BalancerError::HealthProbe(format!(
            "{} returned error {}: {}",
            node.uri(),
            error.code,
            error.message
        )));
    }

    match envelope.result.as_ref().and_then(|v| v.as_str()) {
        Some(quantity) => parse_hex_quantity(quantity),
        None => Err(BalancerError::InvalidResponse(format!(
            "{} returned no block number",
            node.uri()
        ))),
    }
}

/// Parses a JSON-RPC hex quantity such as `"0x10"`.
pub fn parse_hex_quantity(quantity: &str) -> Result<u64> {
    let digits = quantity
        .strip_prefix("0x")
        .or_else(|| quantity.strip_prefix("0X"))
        .unwrap_or(quantity);
    u64::from_str_radix(digits, 16).map_err(|e| {
        BalancerError::InvalidResponse(format!("invalid hex quantity '{}': {}", quantity, e))
    })
}
