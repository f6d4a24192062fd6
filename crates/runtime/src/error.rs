//! Error types for the session runtime.

use std::path::PathBuf;
use std::time::Duration;

use chainprobe_protocol::{ConfigId, RpcError, TransportKind};
use thiserror::Error;

/// Result type alias for runtime operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while acquiring, using, or launching sessions.
#[derive(Debug, Error)]
pub enum Error {
	/// A thread asked for a session while holding one opened for another client.
	#[error("session for thread '{thread}' was opened for client '{held}', but '{current}' is active")]
	ConfigMismatch { thread: String, held: ConfigId, current: ConfigId },

	/// The registry holds more sessions than there are worker threads.
	#[error("pool holds {live} sessions but only {limit} worker threads are configured")]
	CapacityExceeded { live: usize, limit: usize },

	/// No session exists after a creation attempt.
	#[error("failed to create any client session")]
	NoSessions,

	/// Every candidate network address is already bound to another session.
	#[error("no free address left for thread '{thread}' ({bound} addresses already bound)")]
	AddressesExhausted { thread: String, bound: usize },

	/// Spawned client never produced its socket file.
	#[error("client '{client}' took too long to start: no socket at {} after {:?}", socket.display(), waited)]
	LaunchTimeout { client: ConfigId, socket: PathBuf, waited: Duration },

	/// Spawned client exited before its socket appeared.
	#[error("client '{client}' exited during startup ({status})")]
	ClientExited { client: ConfigId, status: String },

	/// Configuration requests a transport the launcher does not know.
	#[error("unknown transport '{kind}' in config '{client}'")]
	UnknownTransport { client: ConfigId, kind: TransportKind },

	/// Configuration is missing something its transport needs.
	#[error("invalid config '{client}': {reason}")]
	InvalidConfig { client: ConfigId, reason: String },

	/// No client configuration has been made current.
	#[error("no client configuration is active")]
	NoActiveConfig,

	/// Failed to start the client or tool process.
	#[error("failed to spawn '{}': {source}", program.display())]
	Spawn {
		program: PathBuf,
		#[source]
		source: std::io::Error,
	},

	/// Transport-level failure talking to a client.
	#[error("transport error on {address}: {message}")]
	Transport { address: String, message: String },

	/// Response did not match the request or could not be read.
	#[error("protocol error: {0}")]
	Protocol(String),

	/// Client answered with a JSON-RPC error object.
	#[error("rpc error {}: {}", .0.code, .0.message)]
	Rpc(RpcError),

	/// I/O error.
	#[error("I/O error: {0}")]
	Io(#[from] std::io::Error),

	/// JSON serialization/deserialization error.
	#[error("JSON error: {0}")]
	Json(#[from] serde_json::Error),

	/// HTTP client error.
	#[error("HTTP error: {0}")]
	Http(#[from] reqwest::Error),
}

impl Error {
	/// Returns true for conditions that must abort the whole run.
	///
	/// These are pool invariant violations and launch failures; continuing
	/// after them would leave a worker talking to the wrong client or none.
	pub fn is_fatal(&self) -> bool {
		matches!(
			self,
			Error::ConfigMismatch { .. }
				| Error::CapacityExceeded { .. }
				| Error::NoSessions
				| Error::AddressesExhausted { .. }
				| Error::LaunchTimeout { .. }
				| Error::ClientExited { .. }
				| Error::UnknownTransport { .. }
				| Error::InvalidConfig { .. }
				| Error::NoActiveConfig
				| Error::Spawn { .. }
		)
	}

	pub(crate) fn transport(address: &str, message: impl Into<String>) -> Self {
		Error::Transport {
			address: address.to_string(),
			message: message.into(),
		}
	}
}
