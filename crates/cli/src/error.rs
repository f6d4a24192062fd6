use std::path::PathBuf;

use thiserror::Error;

use crate::output::{CommandError, ErrorCode};

pub type Result<T> = std::result::Result<T, HarnessError>;

#[derive(Debug, Error)]
pub enum HarnessError {
	#[error("data directory not found: {}", path.display())]
	DataDir { path: PathBuf },

	#[error("failed to read client config {}", path.display())]
	ReadConfig {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},

	#[error("malformed client config {}: {source}", path.display())]
	ParseConfig {
		path: PathBuf,
		#[source]
		source: serde_json::Error,
	},

	#[error("no client configs found in {}", path.display())]
	NoClients { path: PathBuf },

	#[error("unknown client '{name}' (available: {available})")]
	UnknownClient { name: String, available: String },

	#[error("interrupted")]
	Interrupted,

	#[error(transparent)]
	Runtime(#[from] chainprobe_runtime::Error),

	#[error(transparent)]
	Io(#[from] std::io::Error),

	#[error(transparent)]
	Anyhow(#[from] anyhow::Error),
}

impl HarnessError {
	/// Convert this error to a CommandError for structured output
	pub fn to_command_error(&self) -> CommandError {
		let (code, details) = match self {
			HarnessError::DataDir { path } | HarnessError::NoClients { path } => {
				(ErrorCode::ConfigError, Some(serde_json::json!({ "path": path })))
			}
			HarnessError::ReadConfig { path, .. } | HarnessError::ParseConfig { path, .. } => {
				(ErrorCode::ConfigError, Some(serde_json::json!({ "path": path })))
			}
			HarnessError::UnknownClient { name, .. } => (ErrorCode::InvalidInput, Some(serde_json::json!({ "client": name }))),
			HarnessError::Interrupted => (ErrorCode::Interrupted, None),
			HarnessError::Runtime(err) if err.is_fatal() => (ErrorCode::PoolFailure, None),
			HarnessError::Runtime(_) => (ErrorCode::SessionError, None),
			HarnessError::Io(_) => (ErrorCode::IoError, None),
			HarnessError::Anyhow(_) => (ErrorCode::InternalError, None),
		};

		CommandError {
			code,
			message: self.to_string(),
			details,
		}
	}
}

#[cfg(test)]
mod tests {
	use chainprobe_protocol::ConfigId;

	use super::*;

	#[test]
	fn fatal_runtime_errors_map_to_pool_failure() {
		let err = HarnessError::from(chainprobe_runtime::Error::NoSessions);
		let command_error = err.to_command_error();
		assert_eq!(command_error.code, ErrorCode::PoolFailure);
		assert_eq!(command_error.message, "failed to create any client session");
	}

	#[test]
	fn config_errors_carry_path() {
		let err = HarnessError::NoClients {
			path: PathBuf::from("/data/clients"),
		};
		let command_error = err.to_command_error();
		assert_eq!(command_error.code, ErrorCode::ConfigError);
		assert_eq!(command_error.details.unwrap()["path"], "/data/clients");
	}

	#[test]
	fn runtime_message_is_kept_verbatim() {
		let err = HarnessError::from(chainprobe_runtime::Error::InvalidConfig {
			client: ConfigId::new("geth"),
			reason: "ipc transport requires a launch script".into(),
		});
		assert_eq!(err.to_string(), "invalid config 'geth': ipc transport requires a launch script");
	}
}
