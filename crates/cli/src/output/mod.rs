//! Result envelope printed by every command.
//!
//! In JSON mode a command prints one envelope on stdout:
//!
//! ```json
//! {
//!   "ok": true,
//!   "command": "run",
//!   "data": { ... },
//!   "timings": { "durationMs": 1234 }
//! }
//! ```
//!
//! On failure `data` is replaced by
//! `"error": { "code": "POOL_FAILURE", "message": "..." }`.

#[cfg(test)]
mod tests;

use std::fmt;
use std::io::{self, Write};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::runner::{ClientReport, RunReport};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
	/// Human-readable text
	#[default]
	Text,
	/// JSON envelope
	Json,
}

impl fmt::Display for OutputFormat {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			OutputFormat::Text => write!(f, "text"),
			OutputFormat::Json => write!(f, "json"),
		}
	}
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandResult<T> {
	pub ok: bool,
	pub command: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub data: Option<T>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub error: Option<CommandError>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub timings: Option<Timings>,
}

impl<T> CommandResult<T> {
	pub fn success(command: &str, data: T) -> Self {
		Self {
			ok: true,
			command: command.to_string(),
			data: Some(data),
			error: None,
			timings: None,
		}
	}

	pub fn failure(command: &str, error: CommandError) -> Self {
		Self {
			ok: false,
			command: command.to_string(),
			data: None,
			error: Some(error),
			timings: None,
		}
	}

	pub fn with_duration(mut self, duration: Duration) -> Self {
		self.timings = Some(duration.into());
		self
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandError {
	pub code: ErrorCode,
	pub message: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub details: Option<serde_json::Value>,
}

/// Standardized error codes for programmatic handling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
	/// Client configuration missing or unreadable
	ConfigError,
	/// Invalid input provided
	InvalidInput,
	/// Pool invariant broken or client failed to launch
	PoolFailure,
	/// Talking to a client failed
	SessionError,
	/// Run stopped by Ctrl+C
	Interrupted,
	IoError,
	InternalError,
}

impl fmt::Display for ErrorCode {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let code = match self {
			ErrorCode::ConfigError => "CONFIG_ERROR",
			ErrorCode::InvalidInput => "INVALID_INPUT",
			ErrorCode::PoolFailure => "POOL_FAILURE",
			ErrorCode::SessionError => "SESSION_ERROR",
			ErrorCode::Interrupted => "INTERRUPTED",
			ErrorCode::IoError => "IO_ERROR",
			ErrorCode::InternalError => "INTERNAL_ERROR",
		};
		f.write_str(code)
	}
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Timings {
	pub duration_ms: u64,
}

impl From<Duration> for Timings {
	fn from(duration: Duration) -> Self {
		Timings {
			duration_ms: duration.as_millis() as u64,
		}
	}
}

/// One row of `chainprobe clients`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ClientListing {
	pub name: String,
	pub transport: String,
	pub addresses: Vec<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub launch_script: Option<String>,
}

pub fn render_json<T: Serialize>(result: &CommandResult<T>) -> serde_json::Result<String> {
	serde_json::to_string_pretty(result)
}

/// Renders a run report the way `chainprobe run` prints it in text mode.
pub fn render_run_text(report: &RunReport) -> String {
	let mut out = String::new();
	for client in &report.clients {
		out.push_str(&client_line(client));
		out.push('\n');
		for failure in &client.failures {
			out.push_str(&format!(
				"  unit {} on {}: {} failed: {}\n",
				failure.unit, failure.thread, failure.method, failure.message
			));
		}
	}
	let failed = report.failed_units();
	let status = if failed == 0 { "ok" } else { "FAILED" };
	out.push_str(&format!("{status}: {} clients, {} units, {failed} with failures\n", report.clients.len(), report.total_units()));
	out
}

fn client_line(client: &ClientReport) -> String {
	format!(
		"{} ({}): {} units, {} failed, {} sessions launched in {:.1}s",
		client.client,
		client.transport,
		client.units,
		client.failed_units,
		client.sessions_launched,
		client.duration_ms as f64 / 1000.0
	)
}

pub fn render_clients_text(clients: &[ClientListing]) -> String {
	let mut out = String::new();
	for client in clients {
		let addresses = if client.addresses.is_empty() {
			"-".to_string()
		} else {
			client.addresses.join(",")
		};
		out.push_str(&format!("{:<16} {:<10} {}", client.name, client.transport, addresses));
		if let Some(script) = &client.launch_script {
			out.push_str(&format!("  ({script})"));
		}
		out.push('\n');
	}
	out
}

/// Print a command result to stdout in the requested format.
pub fn print_result<T: Serialize>(result: &CommandResult<T>, format: OutputFormat, text: impl FnOnce(&T) -> String) {
	let mut stdout = io::stdout().lock();
	match format {
		OutputFormat::Json => {
			if let Ok(json) = render_json(result) {
				let _ = writeln!(stdout, "{json}");
			}
		}
		OutputFormat::Text => match (&result.data, &result.error) {
			(Some(data), _) => {
				let _ = write!(stdout, "{}", text(data));
			}
			(None, Some(error)) => {
				let _ = writeln!(stdout, "Error [{}]: {}", error.code, error.message);
			}
			(None, None) => {}
		},
	}
}

/// Print an error to stderr in human-readable format
pub fn print_error_stderr(error: &CommandError) {
	eprintln!("Error [{}]: {}", error.code, error.message);
}
