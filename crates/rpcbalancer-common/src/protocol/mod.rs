pub mod error;
pub mod jsonrpc;

pub use error::{BalancerError, Result};
pub use jsonrpc::{InboundCall, JsonRpcError, JsonRpcRequest, JsonRpcResponse};
