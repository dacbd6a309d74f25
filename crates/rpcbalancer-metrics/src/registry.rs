// Copyright 2025 rpcbalancer Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use prometheus::{
    Encoder, IntCounter, IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry, TextEncoder,
};
use rpcbalancer_common::protocol::error::{BalancerError, Result};

/// Counters and gauges updated by the balancer core.
///
/// All updates are plain atomic operations on the prometheus handles; they
/// are not ordered against response delivery and never block the caller.
///
/// # Example
///
/// ```rust
/// use rpcbalancer_metrics::BalancerMetrics;
///
/// let metrics = BalancerMetrics::new().unwrap();
/// metrics.record_failover("http://node-a:8545");
/// metrics.set_node_health("http://node-a:8545", false);
/// metrics.set_block_height(16);
/// assert_eq!(metrics.block_height(), 16);
/// ```
pub struct BalancerMetrics {
    registry: Registry,
    total_requests: IntCounterVec,
    invalid_requests: IntCounter,
    denied_requests: IntCounter,
    failover_requests: IntCounterVec,
    node_health: IntGaugeVec,
    block_height: IntGauge,
}

impl BalancerMetrics {
    /// Creates the metric handles and registers them in a fresh registry.
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let total_requests = IntCounterVec::new(
            Opts::new("num_requests", "Total number of requests processed by method"),
            &["method"],
        )
        .map_err(metrics_error)?;
        let invalid_requests = IntCounter::new(
            "num_requests_invalid",
            "Total number of invalid requests",
        )
        .map_err(metrics_error)?;
        let denied_requests = IntCounter::new(
            "num_requests_denied",
            "Total number of requests denied",
        )
        .map_err(metrics_error)?;
        let failover_requests = IntCounterVec::new(
            Opts::new(
                "num_failover_requests",
                "Total number of failover requests by endpoint",
            ),
            &["endpoint"],
        )
        .map_err(metrics_error)?;
        let node_health = IntGaugeVec::new(
            Opts::new("service_is_healthy", "Current status of node health"),
            &["endpoint"],
        )
        .map_err(metrics_error)?;
        let block_height = IntGauge::new("block_height", "Current block height")
            .map_err(metrics_error)?;

        registry
            .register(Box::new(total_requests.clone()))
            .map_err(metrics_error)?;
        registry
            .register(Box::new(invalid_requests.clone()))
            .map_err(metrics_error)?;
        registry
            .register(Box::new(denied_requests.clone()))
            .map_err(metrics_error)?;
        registry
            .register(Box::new(failover_requests.clone()))
            .map_err(metrics_error)?;
        registry
            .register(Box::new(node_health.clone()))
            .map_err(metrics_error)?;
        registry
            .register(Box::new(block_height.clone()))
            .map_err(metrics_error)?;

        Ok(Self {
            registry,
            total_requests,
            invalid_requests,
            denied_requests,
            failover_requests,
            node_health,
            block_height,
        })
    }

    pub fn record_request(&self, method: &str) {
        self.total_requests.with_label_values(&[method]).inc();
    }

    pub fn record_invalid_request(&self) {
        self.invalid_requests.inc();
    }

    pub fn record_denied_request(&self) {
        self.denied_requests.inc();
    }

    /// Counts a request that had to move off `endpoint` after it failed.
    pub fn record_failover(&self, endpoint: &str) {
        self.failover_requests.with_label_values(&[endpoint]).inc();
    }

    pub fn set_node_health(&self, endpoint: &str, healthy: bool) {
        self.node_health
            .with_label_values(&[endpoint])
            .set(i64::from(healthy));
    }

    pub fn set_block_height(&self, height: u64) {
        self.block_height
            .set(i64::try_from(height).unwrap_or(i64::MAX));
    }

    pub fn requests_by_method(&self, method: &str) -> u64 {
        self.total_requests.with_label_values(&[method]).get()
    }

    pub fn invalid_requests(&self) -> u64 {
        self.invalid_requests.get()
    }

    pub fn denied_requests(&self) -> u64 {
        self.denied_requests.get()
    }

    pub fn failover_requests(&self, endpoint: &str) -> u64 {
        self.failover_requests.with_label_values(&[endpoint]).get()
    }

    /// Last published health for `endpoint`: 1 healthy, 0 unhealthy.
    pub fn node_health(&self, endpoint: &str) -> i64 {
        self.node_health.with_label_values(&[endpoint]).get()
    }

    pub fn block_height(&self) -> i64 {
        self.block_height.get()
    }

    /// Encodes every registered series in Prometheus text format.
    ///
    /// Returns `(content_type, encoded_body)` suitable for an HTTP response.
    pub fn encode(&self) -> Result<(String, Vec<u8>)> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let content_type = encoder.format_type().to_string();
        let mut buffer = Vec::new();
        encoder
            .encode(&metric_families, &mut buffer)
            .map_err(metrics_error)?;
        Ok((content_type, buffer))
    }
}

fn metrics_error(err: prometheus::Error) -> BalancerError {
    BalancerError::Metrics(err.to_string())
}
