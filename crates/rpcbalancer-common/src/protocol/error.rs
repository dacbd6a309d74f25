use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BalancerError {
    /// Inbound body is not a JSON-RPC envelope.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Request timeout after {0}ms")]
    Timeout(u64),

    /// A regular node failed in-band and was taken out of rotation.
    #[error("Node unavailable: {0}")]
    NodeUnavailable(String),

    /// The fallback node itself failed; nothing is left to try.
    #[error("Request failed at fallback: {0}")]
    FallbackFailure(String),

    #[error("No healthy nodes available")]
    NoHealthyNode,

    #[error("Health probe failed: {0}")]
    HealthProbe(String),

    #[error("Rate limited by {0}")]
    RateLimited(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Metrics error: {0}")]
    Metrics(String),
}

impl BalancerError {
    /// Timeout after `after`, saturating at `u64::MAX` milliseconds.
    pub fn timeout(after: Duration) -> Self {
        BalancerError::Timeout(u64::try_from(after.as_millis()).unwrap_or(u64::MAX))
    }
}

pub type Result<T> = std::result::Result<T, BalancerError>;
