//! JSON-RPC 2.0 Protocol Types
//!
//! The balancer treats JSON-RPC bodies as opaque: inbound calls are decoded
//! only far enough to read the method name (used as a metric label) and the
//! request id (echoed in balancer-originated errors). `params` and `result`
//! are never validated or rewritten.
//!
//! - Request format: `{"jsonrpc": "2.0", "method": "...", "params": ..., "id": ...}`
//! - Response format: `{"jsonrpc": "2.0", "result": ..., "error": ..., "id": ...}`
//! - Error format: `{"code": ..., "message": "...", "data": ...}`
//!
//! # Example
//!
//! ```
//! use rpcbalancer_common::protocol::jsonrpc::{JsonRpcRequest, JsonRpcResponse, JsonRpcError};
//! use serde_json::json;
//!
//! let request = JsonRpcRequest::new("eth_blockNumber", json!([]), json!(1));
//! let response = JsonRpcResponse::success(json!(1), json!("0x10"));
//! let error_response = JsonRpcResponse::error(json!(1), JsonRpcError::parse_error());
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::error::{BalancerError, Result};

/// JSON-RPC 2.0 request
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JsonRpcRequest {
    /// JSON-RPC version, "2.0" when absent
    #[serde(default = "default_version")]
    pub jsonrpc: String,
    /// Name of the method to invoke
    pub method: String,
    /// Parameter values, passed through untouched
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub params: Value,
    /// Request identifier (number, string, or null)
    #[serde(default)]
    pub id: Value,
}

/// JSON-RPC 2.0 response
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JsonRpcResponse {
    #[serde(default = "default_version")]
    pub jsonrpc: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
    #[serde(default)]
    pub id: Value,
}

/// JSON-RPC 2.0 error object
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Invalid JSON was received by the server
pub const PARSE_ERROR: i32 = -32700;
/// Generic server error
pub const SERVER_ERROR: i32 = -32000;
/// Access key missing or wrong
pub const UNAUTHORIZED: i32 = -32001;

fn default_version() -> String {
    "2.0".into()
}

impl JsonRpcRequest {
    pub fn new(method: impl Into<String>, params: Value, id: Value) -> Self {
        Self {
            jsonrpc: default_version(),
            method: method.into(),
            params,
            id,
        }
    }
}

impl JsonRpcError {
    /// Create a parse error (-32700)
    pub fn parse_error() -> Self {
        Self {
            code: PARSE_ERROR,
            message: "Parse error".into(),
            data: None,
        }
    }

    /// Create a server error (-32000)
    pub fn server_error(msg: &str) -> Self {
        Self {
            code: SERVER_ERROR,
            message: msg.into(),
            data: None,
        }
    }

    /// Create an unauthorized error (-32001)
    pub fn unauthorized() -> Self {
        Self {
            code: UNAUTHORIZED,
            message: "Unauthorized".into(),
            data: None,
        }
    }
}

impl JsonRpcResponse {
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: default_version(),
            result: Some(result),
            error: None,
            id,
        }
    }

    pub fn error(id: Value, error: JsonRpcError) -> Self {
        Self {
            jsonrpc: default_version(),
            result: None,
            error: Some(error),
            id,
        }
    }
}

/// A decoded inbound body: one call or a batch of calls.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum InboundCall {
    Single(JsonRpcRequest),
    Batch(Vec<JsonRpcRequest>),
}

impl InboundCall {
    /// Decodes a raw HTTP body.
    ///
    /// Anything that is not a request object or a non-empty array of request
    /// objects is rejected with [`BalancerError::InvalidRequest`].
    pub fn decode(body: &[u8]) -> Result<Self> {
        let call: InboundCall = serde_json::from_slice(body)
            .map_err(|e| BalancerError::InvalidRequest(e.to_string()))?;

        if let InboundCall::Batch(calls) = &call {
            if calls.is_empty() {
                return Err(BalancerError::InvalidRequest("empty batch".into()));
            }
        }

        Ok(call)
    }

    /// Method names in body order.
    pub fn methods(&self) -> Vec<&str> {
        match self {
            InboundCall::Single(req) => vec![req.method.as_str()],
            InboundCall::Batch(reqs) => reqs.iter().map(|r| r.method.as_str()).collect(),
        }
    }

    /// Id to echo in a balancer-originated error; batches get `null`.
    pub fn id(&self) -> Value {
        match self {
            InboundCall::Single(req) => req.id.clone(),
            InboundCall::Batch(_) => Value::Null,
        }
    }
}
