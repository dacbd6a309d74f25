//! rpcbalancer Common Types
//!
//! This crate provides the protocol definitions and the access-key gate shared
//! by every rpcbalancer component.
//!
//! # Overview
//!
//! rpcbalancer is a reverse proxy that spreads JSON-RPC calls across a pool of
//! blockchain RPC endpoints. This crate contains the pieces that are not tied
//! to the pool itself:
//!
//! - **Protocol Layer**: JSON-RPC 2.0 envelopes and the shared error type
//! - **Auth Layer**: the URL-path access key checked before forwarding
//!
//! # Components
//!
//! - [`protocol`] - JSON-RPC request/response types and [`BalancerError`]
//! - [`auth`] - URL-path key validation
//!
//! # Example
//!
//! ```
//! use rpcbalancer_common::{InboundCall, JsonRpcResponse};
//! use serde_json::json;
//!
//! let call = InboundCall::decode(br#"{"jsonrpc":"2.0","id":1,"method":"eth_chainId","params":[]}"#).unwrap();
//! assert_eq!(call.methods(), vec!["eth_chainId"]);
//!
//! let response = JsonRpcResponse::success(json!(1), json!("0x1"));
//! assert!(response.error.is_none());
//! ```

pub mod auth;
pub mod protocol;

pub use auth::AuthConfig;
pub use protocol::*;
