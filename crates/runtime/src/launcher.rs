//! Turning a client configuration into a live [`SessionEntry`].

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::os::unix::process::CommandExt;
use std::process::{Command, Stdio};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use chainprobe_protocol::{ClientConfig, TransportKind};
use tracing::{debug, info};

use crate::backend::{HttpBackend, IpcBackend, ToolBackend};
use crate::entry::SessionEntry;
use crate::error::{Error, Result};
use crate::process::OwnedProcess;

/// File name of the socket a spawned client is asked to create.
pub const SOCKET_NAME: &str = "geth.ipc";

/// Prefix of the scratch directory created for every spawned client.
pub const TEMP_DIR_PREFIX: &str = "chainprobe-";

/// Creates sessions for the registry.
///
/// Returning `Ok(None)` means the configuration is valid but nothing can be
/// launched right now (every network address is taken).
pub trait Launch: Send + Sync {
	fn launch(&self, config: &ClientConfig, bound: &BoundAddresses) -> Result<Option<SessionEntry>>;

	/// Grace period given to owned clients between SIGTERM and kill.
	fn teardown_grace(&self) -> Duration {
		LaunchTimings::default().teardown_grace
	}
}

/// Addresses already held by entries in the registry.
#[derive(Debug, Clone, Default)]
pub struct BoundAddresses(HashSet<String>);

impl BoundAddresses {
	pub fn contains(&self, address: &str) -> bool {
		self.0.contains(address)
	}

	pub fn insert(&mut self, address: impl Into<String>) {
		self.0.insert(address.into());
	}

	pub fn len(&self) -> usize {
		self.0.len()
	}

	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}
}

impl<S: Into<String>> FromIterator<S> for BoundAddresses {
	fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
		Self(iter.into_iter().map(Into::into).collect())
	}
}

/// Waits applied while starting and stopping clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaunchTimings {
	/// Pause between checks for the client's socket file.
	pub poll_interval: Duration,
	/// Number of socket checks before the launch is abandoned.
	pub poll_attempts: u32,
	/// Sleep after the socket appears; a config's `initializeTime` wins.
	pub warm_up: Duration,
	/// Wait between SIGTERM and SIGKILL on teardown.
	pub teardown_grace: Duration,
}

impl Default for LaunchTimings {
	fn default() -> Self {
		Self {
			poll_interval: Duration::from_secs(1),
			poll_attempts: 25,
			warm_up: Duration::from_secs(4),
			teardown_grace: Duration::from_secs(4),
		}
	}
}

impl LaunchTimings {
	/// Longest time a launch may wait for the socket.
	pub fn poll_window(&self) -> Duration {
		self.poll_interval * self.poll_attempts
	}
}

#[derive(Debug, Clone)]
pub struct LaunchSettings {
	pub timings: LaunchTimings,
	/// Forward client stdout/stderr to the harness instead of discarding it.
	pub client_output: bool,
	/// Operator-supplied network addresses; replaces config addresses when set.
	pub nodes_override: Vec<String>,
	/// Interpreter used to run launch scripts.
	pub shell: PathBuf,
}

impl Default for LaunchSettings {
	fn default() -> Self {
		Self {
			timings: LaunchTimings::default(),
			client_output: false,
			nodes_override: Vec::new(),
			shell: PathBuf::from("/bin/sh"),
		}
	}
}

/// Production launcher: spawns local clients, connects to remote ones.
#[derive(Debug, Clone, Default)]
pub struct ClientLauncher {
	settings: LaunchSettings,
}

impl ClientLauncher {
	pub fn new(settings: LaunchSettings) -> Self {
		Self { settings }
	}

	pub fn settings(&self) -> &LaunchSettings {
		&self.settings
	}

	/// First candidate address not already bound, override list first.
	pub fn select_address(&self, config: &ClientConfig, bound: &BoundAddresses) -> Option<String> {
		let candidates = if self.settings.nodes_override.is_empty() {
			config.addresses()
		} else {
			&self.settings.nodes_override
		};
		candidates.iter().find(|address| !bound.contains(address)).cloned()
	}

	fn launch_local(&self, config: &ClientConfig) -> Result<SessionEntry> {
		let script = config.launch_script().ok_or_else(|| Error::InvalidConfig {
			client: config.id(),
			reason: "ipc transport requires a launch script".to_string(),
		})?;

		let temp_dir = tempfile::Builder::new().prefix(TEMP_DIR_PREFIX).tempdir()?;
		let socket = temp_dir.path().join(SOCKET_NAME);

		let child = Command::new(&self.settings.shell)
			.arg(script)
			.arg(temp_dir.path())
			.arg(&socket)
			.stdin(Stdio::null())
			.stdout(self.output())
			.stderr(self.output())
			.process_group(0)
			.spawn()
			.map_err(|source| Error::Spawn {
				program: self.settings.shell.clone(),
				source,
			})?;

		let mut process = OwnedProcess::group_leader(child, temp_dir);
		info!(
			target = "chainprobe.launch",
			client = %config.id(),
			pid = process.pid(),
			socket = %socket.display(),
			"spawned client"
		);

		self.wait_for_socket(config, &socket, &mut process)?;

		let warm_up = config.initialize_time.map(Duration::from_secs).unwrap_or(self.settings.timings.warm_up);
		debug!(target = "chainprobe.launch", client = %config.id(), ?warm_up, "socket ready; warming up");
		thread::sleep(warm_up);

		Ok(SessionEntry::with_process(Arc::new(IpcBackend::new(&socket)), process, config.id()))
	}

	fn wait_for_socket(&self, config: &ClientConfig, socket: &Path, process: &mut OwnedProcess) -> Result<()> {
		let timings = &self.settings.timings;
		for attempt in 1..=timings.poll_attempts {
			if socket.exists() {
				debug!(target = "chainprobe.launch", client = %config.id(), attempt, "socket appeared");
				return Ok(());
			}
			if let Some(status) = process.try_exited() {
				process.kill();
				return Err(Error::ClientExited {
					client: config.id(),
					status,
				});
			}
			thread::sleep(timings.poll_interval);
		}

		process.kill();
		Err(Error::LaunchTimeout {
			client: config.id(),
			socket: socket.to_path_buf(),
			waited: timings.poll_window(),
		})
	}

	fn output(&self) -> Stdio {
		if self.settings.client_output {
			Stdio::inherit()
		} else {
			Stdio::null()
		}
	}
}

impl Launch for ClientLauncher {
	fn launch(&self, config: &ClientConfig, bound: &BoundAddresses) -> Result<Option<SessionEntry>> {
		match config.transport {
			TransportKind::Ipc => self.launch_local(config).map(Some),
			TransportKind::Tcp => Ok(self.select_address(config, bound).map(|address| {
				debug!(target = "chainprobe.launch", client = %config.id(), %address, "binding network address");
				SessionEntry::new(Arc::new(HttpBackend::new(address)), config.id())
			})),
			TransportKind::IpcDebug => {
				let path = require_address(config)?;
				Ok(Some(SessionEntry::new(Arc::new(IpcBackend::attached(path)), config.id())))
			}
			TransportKind::Tool => {
				let backend = match config.launch_script() {
					Some(script) => ToolBackend::script(&self.settings.shell, script),
					None => ToolBackend::command(require_address(config)?),
				};
				Ok(Some(SessionEntry::new(Arc::new(backend), config.id())))
			}
			TransportKind::Unsupported => Err(Error::UnknownTransport {
				client: config.id(),
				kind: config.transport,
			}),
		}
	}

	fn teardown_grace(&self) -> Duration {
		self.settings.timings.teardown_grace
	}
}

fn require_address(config: &ClientConfig) -> Result<&str> {
	match config.address() {
		"" => Err(Error::InvalidConfig {
			client: config.id(),
			reason: format!("{} transport requires a socket address", config.transport),
		}),
		address => Ok(address),
	}
}
