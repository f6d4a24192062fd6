//! Wire and configuration types shared by the chainprobe runtime and CLI.
//!
//! # Main Types
//!
//! - [`ClientConfig`] - one client configuration, identified by [`ConfigId`]
//! - [`TransportKind`] - how a session reaches its client
//! - [`RpcRequest`] / [`RpcResponse`] - the JSON-RPC envelope

pub mod config;
pub mod rpc;

pub use config::{ClientConfig, ConfigId, TransportKind};
pub use rpc::{JSONRPC_VERSION, RpcError, RpcRequest, RpcResponse};
