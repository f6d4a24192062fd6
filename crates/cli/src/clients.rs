//! Client configurations on disk.
//!
//! Every client lives in its own directory under the data directory:
//!
//! ```text
//! <datadir>/
//!   geth/
//!     config      JSON ClientConfig
//!     start.sh    optional launch script
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use chainprobe_protocol::ClientConfig;
use tracing::debug;

use crate::error::{HarnessError, Result};

pub const CONFIG_FILE: &str = "config";
pub const LAUNCH_SCRIPT: &str = "start.sh";

/// `~/.chainprobe`, or `./.chainprobe` when no home directory is known.
pub fn default_datadir() -> PathBuf {
	dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")).join(".chainprobe")
}

/// Loads the client stored in `dir`.
pub fn load_client(dir: &Path) -> Result<ClientConfig> {
	let path = dir.join(CONFIG_FILE);
	let body = fs::read_to_string(&path).map_err(|source| HarnessError::ReadConfig {
		path: path.clone(),
		source,
	})?;
	let mut config = ClientConfig::from_json(&body).map_err(|source| HarnessError::ParseConfig { path, source })?;

	let script = dir.join(LAUNCH_SCRIPT);
	if script.is_file() {
		config.launch_script = Some(script);
	}
	Ok(config)
}

/// Loads every client under `datadir`, sorted by name.
///
/// Directories without a `config` file are skipped.
pub fn discover(datadir: &Path) -> Result<Vec<ClientConfig>> {
	if !datadir.is_dir() {
		return Err(HarnessError::DataDir {
			path: datadir.to_path_buf(),
		});
	}

	let mut clients = Vec::new();
	for entry in fs::read_dir(datadir)? {
		let dir = entry?.path();
		if !dir.is_dir() {
			continue;
		}
		if !dir.join(CONFIG_FILE).is_file() {
			debug!(target = "chainprobe.runner", dir = %dir.display(), "skipping directory without client config");
			continue;
		}
		let config = load_client(&dir)?;
		debug!(target = "chainprobe.runner", client = %config.name, transport = %config.transport, "found client");
		clients.push(config);
	}

	if clients.is_empty() {
		return Err(HarnessError::NoClients {
			path: datadir.to_path_buf(),
		});
	}
	clients.sort_by(|a, b| a.name.cmp(&b.name));
	Ok(clients)
}

/// Picks the clients named in `names`, in that order; all when `names` is empty.
pub fn select(clients: Vec<ClientConfig>, names: &[String]) -> Result<Vec<ClientConfig>> {
	if names.is_empty() {
		return Ok(clients);
	}

	names
		.iter()
		.map(|name| {
			clients.iter().find(|client| &client.name == name).cloned().ok_or_else(|| HarnessError::UnknownClient {
				name: name.clone(),
				available: clients.iter().map(|client| client.name.as_str()).collect::<Vec<_>>().join(", "),
			})
		})
		.collect()
}
