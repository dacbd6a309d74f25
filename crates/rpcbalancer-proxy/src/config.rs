use std::net::SocketAddr;
use std::time::Duration;

use crate::health_monitor::HealthCheckConfig;
use crate::http_server::DEFAULT_MAX_BODY_SIZE;
use crate::node::DEFAULT_REQUEST_TIMEOUT;
use crate::selection::SelectionMethod;
use rpcbalancer_common::protocol::error::{BalancerError, Result};
use rpcbalancer_common::AuthConfig;

/// Everything needed to start a balancer.
#[derive(Debug, Clone)]
pub struct BalancerConfig {
    /// Listen address for inbound JSON-RPC traffic.
    pub rpc_addr: SocketAddr,
    /// Listen address for the Prometheus exporter.
    pub metrics_addr: SocketAddr,
    /// Regular nodes; list order is failover priority.
    pub nodes: Vec<String>,
    /// Last-resort node. Defaults to the first regular node.
    pub fallback: Option<String>,
    pub selection_method: SelectionMethod,
    pub health_check: HealthCheckConfig,
    /// Bound on one outbound attempt.
    pub request_timeout: Duration,
    /// Largest inbound body accepted, in bytes.
    pub max_body_size: usize,
    /// Access key expected as the first URL path segment.
    pub url_key: Option<String>,
}

impl Default for BalancerConfig {
    fn default() -> Self {
        Self {
            rpc_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            metrics_addr: SocketAddr::from(([0, 0, 0, 0], 8081)),
            nodes: Vec::new(),
            fallback: None,
            selection_method: SelectionMethod::default(),
            health_check: HealthCheckConfig::default(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            max_body_size: DEFAULT_MAX_BODY_SIZE,
            url_key: None,
        }
    }
}

impl BalancerConfig {
    /// Checks the configuration before any node is built.
    pub fn validate(&self) -> Result<()> {
        if self.nodes.is_empty() && self.fallback.is_none() {
            return Err(BalancerError::Config(
                "at least one node or a fallback is required".to_string(),
            ));
        }
        for uri in self.nodes.iter().chain(self.fallback.iter()) {
            validate_http_url(uri)?;
        }
        if self.request_timeout.is_zero() {
            return Err(BalancerError::Config(
                "request timeout must be greater than zero".to_string(),
            ));
        }
        if self.max_body_size == 0 {
            return Err(BalancerError::Config(
                "max body size must be greater than zero".to_string(),
            ));
        }
        if self.health_check.interval.is_zero() {
            return Err(BalancerError::Config(
                "health check interval must be greater than zero".to_string(),
            ));
        }
        if self.health_check.timeout.is_zero() {
            return Err(BalancerError::Config(
                "health check timeout must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// The fallback actually used: the explicit one, else the first node.
    pub fn fallback_uri(&self) -> Option<&str> {
        self.fallback
            .as_deref()
            .or_else(|| self.nodes.first().map(String::as_str))
    }

    pub fn auth(&self) -> AuthConfig {
        AuthConfig::from_optional(self.url_key.clone())
    }
}

/// Accepts only absolute `http://` or `https://` addresses with a host.
pub fn validate_http_url(uri: &str) -> Result<()> {
    let rest = uri
        .strip_prefix("http://")
        .or_else(|| uri.strip_prefix("https://"))
        .ok_or_else(|| {
            BalancerError::Config(format!(
                "node address '{}' must start with http:// or https://",
                uri
            ))
        })?;

    if rest.is_empty() || rest.starts_with('/') {
        return Err(BalancerError::Config(format!(
            "node address '{}' has no host",
            uri
        )));
    }
    Ok(())
}
