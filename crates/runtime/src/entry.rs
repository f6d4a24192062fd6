//! The unit stored in the session registry.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chainprobe_protocol::ConfigId;
use serde::Serialize;
use tracing::debug;

use crate::backend::SessionBackend;
use crate::process::OwnedProcess;

/// Lifecycle marker deciding whether an entry may be handed out again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
	/// No session, or the client behind it vanished.
	NotExist,
	/// Idle and reusable by any thread testing the same configuration.
	Available,
	/// Bound to the thread that owns it.
	Working,
}

impl fmt::Display for SessionStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			SessionStatus::NotExist => write!(f, "not_exist"),
			SessionStatus::Available => write!(f, "available"),
			SessionStatus::Working => write!(f, "working"),
		}
	}
}

/// A live session: backend, optional owned client process, and status.
#[derive(Debug)]
pub struct SessionEntry {
	backend: Arc<dyn SessionBackend>,
	process: Option<OwnedProcess>,
	config_id: ConfigId,
	status: SessionStatus,
	owner: Option<String>,
}

impl SessionEntry {
	/// Entry for a client the harness does not own (network, attached, tool).
	pub fn new(backend: Arc<dyn SessionBackend>, config_id: ConfigId) -> Self {
		Self {
			backend,
			process: None,
			config_id,
			status: SessionStatus::Working,
			owner: None,
		}
	}

	/// Entry owning the spawned client process behind `backend`.
	pub fn with_process(backend: Arc<dyn SessionBackend>, process: OwnedProcess, config_id: ConfigId) -> Self {
		Self {
			process: Some(process),
			..Self::new(backend, config_id)
		}
	}

	pub fn backend(&self) -> &Arc<dyn SessionBackend> {
		&self.backend
	}

	pub fn config_id(&self) -> &ConfigId {
		&self.config_id
	}

	pub fn status(&self) -> SessionStatus {
		self.status
	}

	pub(crate) fn set_status(&mut self, status: SessionStatus) {
		self.status = status;
	}

	/// Thread id currently mapped to this entry, if any.
	pub fn owner(&self) -> Option<&str> {
		self.owner.as_deref()
	}

	pub(crate) fn set_owner(&mut self, owner: &str) -> Option<String> {
		self.owner.replace(owner.to_string())
	}

	pub fn owns_process(&self) -> bool {
		self.process.is_some()
	}

	pub fn process(&self) -> Option<&OwnedProcess> {
		self.process.as_ref()
	}

	/// Closes the backend and releases any owned client process.
	pub fn teardown(mut self, grace: Duration) {
		self.backend.close();
		if let Some(mut process) = self.process.take() {
			debug!(
				target = "chainprobe.pool",
				client = %self.config_id,
				pid = process.pid(),
				address = self.backend.address(),
				"stopping client"
			);
			process.terminate(grace);
		}
	}
}
