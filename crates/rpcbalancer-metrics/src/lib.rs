//! rpcbalancer Metrics
//!
//! Prometheus instrumentation for the balancer and the HTTP endpoint that
//! exports it.
//!
//! # Architecture
//!
//! - [`BalancerMetrics`]: owns a private `prometheus::Registry` and the
//!   counters/gauges the core updates. It is built once at startup and passed
//!   as an `Arc` into nodes, the forwarder and the health monitor, so tests can
//!   use isolated instances.
//! - [`MetricsServer`]: serves the registry in Prometheus text format.
//!
//! # Exported series
//!
//! | Name | Type | Labels |
//! |---|---|---|
//! | `num_requests` | counter | `method` |
//! | `num_requests_invalid` | counter | |
//! | `num_requests_denied` | counter | |
//! | `num_failover_requests` | counter | `endpoint` |
//! | `service_is_healthy` | gauge | `endpoint` |
//! | `block_height` | gauge | |
//!
//! # Usage Example
//!
//! ```rust
//! use rpcbalancer_metrics::BalancerMetrics;
//!
//! let metrics = BalancerMetrics::new().unwrap();
//! metrics.record_request("eth_blockNumber");
//! assert_eq!(metrics.requests_by_method("eth_blockNumber"), 1);
//! ```

mod exporter;
mod registry;

pub use exporter::MetricsServer;
pub use registry::BalancerMetrics;
