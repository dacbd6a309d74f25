use std::sync::Arc;
use tracing::info;

use crate::config::BalancerConfig;
use crate::forwarder::RequestForwarder;
use crate::health_monitor::HealthMonitor;
use crate::http_server::HttpServer;
use crate::node::Node;
use crate::pool::NodePool;
use rpcbalancer_common::protocol::error::Result;
use rpcbalancer_metrics::{BalancerMetrics, MetricsServer};

/// rpcbalancer - JSON-RPC reverse proxy over a pool of backend nodes.
///
/// Owns the pool and the metrics, and wires them into the three long-lived
/// pieces of a running balancer:
///
/// 1. **RPC server**: inbound calls go through the [`RequestForwarder`]
/// 2. **Health monitor**: a background task reinstating failed nodes
/// 3. **Metrics server**: Prometheus exporter on its own port
///
/// # Example
/// ```no_run
/// # use rpcbalancer_proxy::{Balancer, BalancerConfig};
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = BalancerConfig {
///     nodes: vec![
///         "http://127.0.0.1:8545".to_string(),
///         "http://127.0.0.1:8546".to_string(),
///     ],
///     ..Default::default()
/// };
/// Balancer::new(config)?.run().await?;
/// # Ok(())
/// # }
/// ```
pub struct Balancer {
    config: BalancerConfig,
    pool: Arc<NodePool>,
    metrics: Arc<BalancerMetrics>,
}

impl Balancer {
    /// Validates `config` and builds the pool with fresh metrics.
    pub fn new(config: BalancerConfig) -> Result<Self> {
        Self::with_metrics(config, Arc::new(BalancerMetrics::new()?))
    }

    /// Like [`new`](Self::new), recording into the given metrics.
    pub fn with_metrics(config: BalancerConfig, metrics: Arc<BalancerMetrics>) -> Result<Self> {
        config.validate()?;

        let mut pool = NodePool::new(config.selection_method);
        for (id, uri) in config.nodes.iter().enumerate() {
            let node = Node::with_timeout(uri.as_str(), config.request_timeout, metrics.clone())?;
            pool.add_node(node, id)?;
        }
        if let Some(uri) = config.fallback_uri() {
            pool.set_fallback(Node::with_timeout(uri, config.request_timeout, metrics.clone())?);
        }

        info!(
            nodes = pool.node_count(),
            method = %pool.selection_method(),
            fallback = pool.fallback().map(|n| n.uri()).unwrap_or("none"),
            "Balancer initialized"
        );

        Ok(Self {
            config,
            pool: Arc::new(pool),
            metrics,
        })
    }

    pub fn config(&self) -> &BalancerConfig {
        &self.config
    }

    pub fn pool(&self) -> &Arc<NodePool> {
        &self.pool
    }

    pub fn metrics(&self) -> &Arc<BalancerMetrics> {
        &self.metrics
    }

    pub fn forwarder(&self) -> RequestForwarder {
        RequestForwarder::new(self.pool.clone(), self.metrics.clone())
    }

    pub fn http_server(&self) -> HttpServer {
        HttpServer::new(Arc::new(self.forwarder()), self.metrics.clone())
            .with_auth(self.config.auth())
            .with_max_body_size(self.config.max_body_size)
    }

    pub fn health_monitor(&self) -> HealthMonitor {
        HealthMonitor::new(
            self.pool.clone(),
            self.metrics.clone(),
            self.config.health_check.clone(),
        )
    }

    /// Starts the health monitor and serves RPC and metrics until either
    /// server fails.
    pub async fn run(self) -> Result<()> {
        let monitor = self.health_monitor().spawn();

        let rpc = self.http_server().run(self.config.rpc_addr);
        let exporter = MetricsServer::new(self.metrics.clone()).run(self.config.metrics_addr);
        let result = tokio::try_join!(rpc, exporter).map(|_| ());

        monitor.abort();
        result
    }
}
