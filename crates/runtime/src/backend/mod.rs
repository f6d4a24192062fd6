//! Session backends: one open channel to one client.
//!
//! Every transport implements [`SessionBackend`]. The registry stores backends
//! as `Arc<dyn SessionBackend>` and hands clones to worker threads, which then
//! talk to the client without holding the registry lock. Each backend guards
//! its own stream state, so a backend is `Send + Sync`.
//!
//! | transport | backend |
//! |-----------|---------|
//! | `ipc`, `ipc-debug` | [`IpcBackend`] |
//! | `tcp` | [`HttpBackend`] |
//! | `tool` | [`ToolBackend`] |

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use chainprobe_protocol::{RpcRequest, RpcResponse, TransportKind};
use serde_json::Value;
use tracing::trace;

use crate::error::{Error, Result};

mod http;
mod ipc;
mod tool;


pub use http::HttpBackend;
pub use ipc::IpcBackend;
pub use tool::{CommandTool, ToolBackend, ToolRunner};

/// Capability set shared by every transport.
pub trait SessionBackend: Send + Sync + fmt::Debug {
	/// Transport this backend speaks.
	fn kind(&self) -> TransportKind;

	/// Address the backend is bound to (socket path, `host:port`, or tool).
	fn address(&self) -> &str;

	/// Opens the underlying channel. Calling it on an open backend is a no-op.
	fn open(&self) -> Result<()>;

	/// Sends one request.
	fn send(&self, request: &RpcRequest) -> Result<()>;

	/// Reads the next response.
	fn receive(&self) -> Result<RpcResponse>;

	/// Closes the channel; the next `open` reconnects.
	fn close(&self);

	/// Allocates the next request id.
	fn next_id(&self) -> u64;

	/// Sends `request` and reads its response.
	fn exchange(&self, request: &RpcRequest) -> Result<RpcResponse> {
		self.send(request)?;
		self.receive()
	}

	/// Performs one JSON-RPC call and returns its result.
	fn call(&self, method: &str, params: Value) -> Result<Value> {
		let request = RpcRequest::new(self.next_id(), method, params);
		trace!(target = "chainprobe.rpc", address = self.address(), id = request.id, method, "rpc call");

		let response = self.exchange(&request)?;
		if response.id.is_some_and(|id| id != request.id) {
			return Err(Error::Protocol(format!(
				"response id {:?} does not match request id {} for '{}'",
				response.id, request.id, method
			)));
		}
		response.into_result().map_err(Error::Rpc)
	}
}

/// Sequential request id counter shared by the backends.
#[derive(Debug, Default)]
pub(crate) struct RequestIds {
	last_id: AtomicU64,
}

impl RequestIds {
	pub(crate) fn next(&self) -> u64 {
		self.last_id.fetch_add(1, Ordering::SeqCst) + 1
	}
}
