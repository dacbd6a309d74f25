//! # rpcbalancer Entry Point
//!
//! Starts a JSON-RPC load balancer in front of one or more backend nodes and
//! a Prometheus exporter next to it.
//!
//! ## Usage
//!
//! ```bash
//! # Two nodes, first one preferred, fallback to a hosted provider
//! rpcbalancer \
//!   --node http://127.0.0.1:8545 \
//!   --node http://127.0.0.1:8546 \
//!   --fallback https://rpc.example.org
//!
//! # Spread load evenly and require a key in the URL path
//! RPCBALANCER_URL_KEY=s3cret rpcbalancer --selection-method roundrobin \
//!   --node http://10.0.0.1:8545 --node http://10.0.0.2:8545
//! ```
//!
//! ## URL Format
//!
//! Node and fallback addresses must include the `http://` or `https://` prefix:
//! - ✅ `http://127.0.0.1:8545`
//! - ✅ `https://rpc.example.org/v1/abc`
//! - ❌ `127.0.0.1:8545`

use anyhow::{Context, Result};
use argh::FromArgs;
use rpcbalancer_proxy::{Balancer, BalancerConfig, HealthCheckConfig, SelectionMethod};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Environment variable read when `--url-key` is not given.
const URL_KEY_ENV: &str = "RPCBALANCER_URL_KEY";

#[derive(FromArgs, Debug)]
/// rpcbalancer - load balancer for JSON-RPC nodes
struct Args {
    /// port for inbound JSON-RPC traffic
    #[argh(option, long = "rpc-port", default = "8080")]
    rpc_port: u16,

    /// port for the Prometheus metrics exporter
    #[argh(option, long = "metrics-port", default = "8081")]
    metrics_port: u16,

    /// node used when no regular node is healthy
    ///
    /// Defaults to the first --node. Never health checked.
    #[argh(option)]
    fallback: Option<String>,

    /// node selection method: failover, roundrobin or random
    #[argh(option, long = "selection-method", default = "SelectionMethod::Failover")]
    selection_method: SelectionMethod,

    /// seconds between health checks of unhealthy nodes
    #[argh(option, long = "health-check-interval", default = "5")]
    health_check_interval: u64,

    /// timeout for each health check in milliseconds
    #[argh(option, long = "health-check-timeout", default = "2000")]
    health_check_timeout: u64,

    /// timeout for each forwarded request in seconds
    #[argh(option, long = "request-timeout", default = "30")]
    request_timeout: u64,

    /// largest inbound request body in bytes
    #[argh(option, long = "max-body-size", default = "4 * 1024 * 1024")]
    max_body_size: usize,

    /// backend node address, can be repeated
    ///
    /// Order matters for the failover method: earlier nodes are preferred.
    #[argh(option, long = "node")]
    nodes: Vec<String>,

    /// access key expected as the first URL path segment
    ///
    /// Falls back to the RPCBALANCER_URL_KEY environment variable.
    #[argh(option, long = "url-key")]
    url_key: Option<String>,

    /// log level used when RUST_LOG is not set
    #[argh(option, long = "log-level", default = "String::from(\"info\")")]
    log_level: String,
}

impl Args {
    fn into_config(self, env_url_key: Option<String>) -> BalancerConfig {
        let host = IpAddr::V4(Ipv4Addr::UNSPECIFIED);
        BalancerConfig {
            rpc_addr: SocketAddr::new(host, self.rpc_port),
            metrics_addr: SocketAddr::new(host, self.metrics_port),
            nodes: self.nodes,
            fallback: self.fallback,
            selection_method: self.selection_method,
            health_check: HealthCheckConfig {
                interval: Duration::from_secs(self.health_check_interval),
                timeout: Duration::from_millis(self.health_check_timeout),
            },
            request_timeout: Duration::from_secs(self.request_timeout),
            max_body_size: self.max_body_size,
            url_key: self.url_key.or(env_url_key),
        }
    }
}

/// `RUST_LOG` wins; otherwise the `--log-level` value.
fn env_filter(log_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args: Args = argh::from_env();

    tracing_subscriber::fmt()
        .with_env_filter(env_filter(&args.log_level))
        .init();

    let config = args.into_config(std::env::var(URL_KEY_ENV).ok());
    tracing::info!("Starting rpcbalancer");
    tracing::info!("RPC listening on: {}", config.rpc_addr);
    tracing::info!("Metrics listening on: {}", config.metrics_addr);
    tracing::info!("Nodes: {:?}", config.nodes);
    tracing::info!("Selection method: {}", config.selection_method);

    let balancer = Balancer::new(config).context("Invalid configuration")?;
    balancer.run().await.context("Balancer stopped")?;

    Ok(())
}
