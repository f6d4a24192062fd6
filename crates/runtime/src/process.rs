//! Ownership of a spawned client process and its scratch directory.

use std::path::{Path, PathBuf};
use std::process::Child;
use std::thread;
use std::time::Duration;

use tempfile::TempDir;
use tracing::{debug, warn};

/// A client process plus the temporary directory it runs in.
///
/// Both resources live in `Option`s that [`terminate`](Self::terminate) takes,
/// so the first teardown releases them and any later call, including the
/// `Drop` impl, finds nothing left to act on.
///
/// When the child leads its own process group, signals go to the whole group
/// so anything a launch script started in the foreground stops with it.
#[derive(Debug)]
pub struct OwnedProcess {
	child: Option<Child>,
	temp_dir: Option<TempDir>,
	pid: u32,
	group: bool,
}

impl OwnedProcess {
	pub fn new(child: Child, temp_dir: TempDir) -> Self {
		let pid = child.id();
		Self {
			child: Some(child),
			temp_dir: Some(temp_dir),
			pid,
			group: false,
		}
	}

	/// Wraps a child spawned with `process_group(0)`.
	pub fn group_leader(child: Child, temp_dir: TempDir) -> Self {
		let mut process = Self::new(child, temp_dir);
		process.group = true;
		process
	}

	pub fn pid(&self) -> u32 {
		self.pid
	}

	pub fn temp_dir(&self) -> Option<&Path> {
		self.temp_dir.as_ref().map(TempDir::path)
	}

	/// Whether the process and directory have already been released.
	pub fn is_released(&self) -> bool {
		self.child.is_none() && self.temp_dir.is_none()
	}

	/// Returns the exit status text if the child has already exited.
	pub fn try_exited(&mut self) -> Option<String> {
		let child = self.child.as_mut()?;
		match child.try_wait() {
			Ok(Some(status)) => Some(status.to_string()),
			Ok(None) => None,
			Err(e) => Some(format!("unknown ({e})")),
		}
	}

	/// Asks the client to stop, waits `grace`, then removes its directory.
	///
	/// A client still running after the grace period is killed. Failures are
	/// logged and otherwise ignored.
	pub fn terminate(&mut self, grace: Duration) {
		if let Some(mut child) = self.child.take() {
			self.signal(libc::SIGTERM);
			thread::sleep(grace);

			match child.try_wait() {
				Ok(Some(status)) => {
					debug!(target = "chainprobe.launch", pid = self.pid, %status, "client exited");
					if self.group {
						// Stragglers that outlived the script.
						self.signal(libc::SIGKILL);
					}
				}
				Ok(None) => {
					warn!(target = "chainprobe.launch", pid = self.pid, ?grace, "client ignored terminate; killing");
					self.force_kill(&mut child);
				}
				Err(e) => {
					warn!(target = "chainprobe.launch", pid = self.pid, error = %e, "failed to check client status");
				}
			}
		}

		if let Some(dir) = self.temp_dir.take() {
			remove_dir(dir);
		}
	}

	/// Kills the client without grace and removes its directory.
	pub fn kill(&mut self) {
		if let Some(mut child) = self.child.take() {
			self.force_kill(&mut child);
		}
		if let Some(dir) = self.temp_dir.take() {
			remove_dir(dir);
		}
	}

	fn force_kill(&self, child: &mut Child) {
		if self.group {
			self.signal(libc::SIGKILL);
		} else {
			let _ = child.kill();
		}
		let _ = child.wait();
	}

	/// Sends `signal` to the child, or to its whole group when it leads one.
	fn signal(&self, signal: libc::c_int) {
		let Ok(pid) = libc::pid_t::try_from(self.pid) else {
			return;
		};
		let target = if self.group { -pid } else { pid };
		// SAFETY: the child (and so its group id) has not been reaped yet, or
		// group members still hold the id.
		let rc = unsafe { libc::kill(target, signal) };
		if rc != 0 {
			let err = std::io::Error::last_os_error();
			debug!(target = "chainprobe.launch", pid, group = self.group, signal, error = %err, "signal failed");
		}
	}
}

impl Drop for OwnedProcess {
	fn drop(&mut self) {
		if !self.is_released() {
			debug!(target = "chainprobe.launch", pid = self.pid, "dropping unreleased client; killing");
			self.kill();
		}
	}
}

fn remove_dir(dir: TempDir) {
	let path: PathBuf = dir.path().to_path_buf();
	if let Err(e) = dir.close() {
		warn!(target = "chainprobe.launch", path = %path.display(), error = %e, "failed to remove client directory");
	}
}
