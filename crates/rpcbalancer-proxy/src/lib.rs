pub mod balancer;
pub mod config;
pub mod forwarder;
pub mod health_monitor;
pub mod http_server;
pub mod node;
pub mod pool;
pub mod selection;

pub use balancer::Balancer;
pub use config::{validate_http_url, BalancerConfig};
pub use forwarder::{RequestForwarder, STATUS_INVALID_REQUEST, STATUS_NO_HEALTHY_NODE};
pub use health_monitor::{parse_hex_quantity, HealthCheckConfig, HealthMonitor};
pub use http_server::{HttpServer, DEFAULT_MAX_BODY_SIZE};
pub use node::Node;
pub use pool::NodePool;
pub use selection::{Selection, SelectionMethod};
