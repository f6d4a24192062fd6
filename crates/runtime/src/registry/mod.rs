//! The session registry: which worker thread talks to which client.
//!
//! The registry is a slot table of [`SessionEntry`] values plus an index from
//! thread id to slot. Both live behind one [`parking_lot::Mutex`]. Scans,
//! inserts and status flips happen under that lock; spawning a client,
//! waiting for its socket and warming it up happen outside it, so a slow
//! launch on one worker never blocks the others.
//!
//! Network sessions are the exception: picking a free address and inserting
//! the entry that binds it happen in a single locked section, so two workers
//! can never end up on the same node.
//!
//! Reassigning an idle entry to another thread only rewrites the index; the
//! entry itself, including its process and temp dir, stays in its slot.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

use chainprobe_protocol::{ConfigId, TransportKind};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::backend::SessionBackend;
use crate::config::ConfigSource;
use crate::entry::{SessionEntry, SessionStatus};
use crate::error::{Error, Result};
use crate::launcher::{BoundAddresses, ClientLauncher, Launch, LaunchSettings};

#[cfg(test)]
mod tests;

/// Position of an entry in the slot table; assigned in creation order.
pub type SlotId = u64;

#[derive(Debug, Clone, Default)]
pub struct PoolSettings {
	/// Number of worker threads, and so the most sessions that may exist.
	pub thread_limit: usize,
	pub launch: LaunchSettings,
}

/// Read-only view of one registry entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSummary {
	pub slot: SlotId,
	pub thread: Option<String>,
	pub client: ConfigId,
	pub status: SessionStatus,
	pub transport: TransportKind,
	pub address: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub pid: Option<u32>,
}

#[derive(Debug, Default)]
struct Slots {
	entries: BTreeMap<SlotId, SessionEntry>,
	index: HashMap<String, SlotId>,
	next_slot: SlotId,
}

impl Slots {
	fn owned(&self, thread_id: &str) -> Option<&SessionEntry> {
		self.index.get(thread_id).and_then(|slot| self.entries.get(slot))
	}

	fn owned_mut(&mut self, thread_id: &str) -> Option<&mut SessionEntry> {
		let slot = self.index.get(thread_id)?;
		self.entries.get_mut(slot)
	}

	/// Unbinds and returns `thread_id`'s entry if it was released as vanished.
	fn evict_vanished(&mut self, thread_id: &str) -> Option<SessionEntry> {
		let slot = *self.index.get(thread_id)?;
		if self.entries.get(&slot)?.status() != SessionStatus::NotExist {
			return None;
		}
		self.index.remove(thread_id);
		self.entries.remove(&slot)
	}

	/// Hands the first idle entry for `client` to `thread_id`.
	fn reassign(&mut self, thread_id: &str, client: &ConfigId) -> Option<Arc<dyn SessionBackend>> {
		let (&slot, entry) = self
			.entries
			.iter_mut()
			.find(|(_, entry)| entry.status() == SessionStatus::Available && entry.config_id() == client)?;

		let previous = entry.set_owner(thread_id);
		entry.set_status(SessionStatus::Working);
		let backend = Arc::clone(entry.backend());

		if let Some(previous) = previous {
			if self.index.get(&previous) == Some(&slot) {
				self.index.remove(&previous);
			}
		}
		self.index.insert(thread_id.to_string(), slot);

		debug!(target = "chainprobe.pool", thread = thread_id, slot, client = %client, "reusing idle session");
		Some(backend)
	}

	fn insert(&mut self, thread_id: &str, mut entry: SessionEntry) -> SlotId {
		let slot = self.next_slot;
		self.next_slot += 1;

		entry.set_owner(thread_id);
		entry.set_status(SessionStatus::Working);
		self.entries.insert(slot, entry);
		self.index.insert(thread_id.to_string(), slot);
		slot
	}

	fn bound_addresses(&self) -> BoundAddresses {
		self.entries.values().map(|entry| entry.backend().address()).collect()
	}
}

/// Thread-safe pool of client sessions shared by all workers of a run.
pub struct SessionRegistry {
	thread_limit: usize,
	configs: Arc<dyn ConfigSource>,
	launcher: Box<dyn Launch>,
	slots: Mutex<Slots>,
	launched: AtomicUsize,
}

impl SessionRegistry {
	/// Registry launching clients with the production [`ClientLauncher`].
	pub fn new(settings: PoolSettings, configs: Arc<dyn ConfigSource>) -> Self {
		Self::with_launcher(settings.thread_limit, configs, ClientLauncher::new(settings.launch))
	}

	pub fn with_launcher(thread_limit: usize, configs: Arc<dyn ConfigSource>, launcher: impl Launch + 'static) -> Self {
		Self {
			thread_limit,
			configs,
			launcher: Box::new(launcher),
			slots: Mutex::new(Slots::default()),
			launched: AtomicUsize::new(0),
		}
	}

	pub fn thread_limit(&self) -> usize {
		self.thread_limit
	}

	/// Returns the session bound to `thread_id`, creating or reusing one.
	///
	/// A thread keeps its entry across calls. A thread without an entry first
	/// takes over an idle entry for the current client and only launches a new
	/// client when none is idle. An entry the thread released as `NotExist` is
	/// torn down first and replaced.
	///
	/// # Errors
	///
	/// Fails with a fatal error when the thread holds a session for another
	/// client, when the pool would exceed the thread limit, when nothing could
	/// be created, or when every network address is already taken. Launch
	/// failures are passed through.
	pub fn acquire(&self, thread_id: &str) -> Result<Arc<dyn SessionBackend>> {
		let config = self.configs.current()?;
		let client = config.id();

		let vanished = self.slots.lock().evict_vanished(thread_id);
		if let Some(entry) = vanished {
			warn!(
				target = "chainprobe.pool",
				thread = thread_id,
				client = %entry.config_id(),
				address = entry.backend().address(),
				"replacing vanished session"
			);
			entry.teardown(self.launcher.teardown_grace());
		}

		let bound = {
			let mut slots = self.slots.lock();

			if let Some(entry) = slots.owned_mut(thread_id) {
				if entry.config_id() != &client {
					return Err(Error::ConfigMismatch {
						thread: thread_id.to_string(),
						held: entry.config_id().clone(),
						current: client,
					});
				}
				entry.set_status(SessionStatus::Working);
				return Ok(Arc::clone(entry.backend()));
			}

			if let Some(backend) = slots.reassign(thread_id, &client) {
				return Ok(backend);
			}

			let bound = slots.bound_addresses();
			if config.transport.is_network() {
				if let Some(entry) = self.launcher.launch(&config, &bound)? {
					self.record_launch(&mut slots, thread_id, entry);
				}
				return self.settle(&slots, thread_id);
			}
			bound
		};

		let launched = self.launcher.launch(&config, &bound)?;

		let mut slots = self.slots.lock();
		if let Some(entry) = launched {
			self.record_launch(&mut slots, thread_id, entry);
		}
		self.settle(&slots, thread_id)
	}

	/// [`acquire`](Self::acquire), leaving the session marked `Working`.
	pub fn start(&self, thread_id: &str) -> Result<Arc<dyn SessionBackend>> {
		let backend = self.acquire(thread_id)?;
		self.release(thread_id, SessionStatus::Working);
		Ok(backend)
	}

	/// Sets the status of the session bound to `thread_id`.
	///
	/// `Available` lets any thread testing the same client take it over.
	pub fn release(&self, thread_id: &str, status: SessionStatus) {
		let mut slots = self.slots.lock();
		match slots.owned_mut(thread_id) {
			Some(entry) => entry.set_status(status),
			None => warn!(target = "chainprobe.pool", thread = thread_id, %status, "release for thread without a session"),
		}
	}

	/// Status of the session bound to `thread_id`, `NotExist` when unbound.
	pub fn status(&self, thread_id: &str) -> SessionStatus {
		self.slots
			.lock()
			.owned(thread_id)
			.map(SessionEntry::status)
			.unwrap_or(SessionStatus::NotExist)
	}

	pub fn len(&self) -> usize {
		self.slots.lock().entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.slots.lock().entries.is_empty()
	}

	/// Total sessions launched since the registry was created.
	pub fn launched(&self) -> usize {
		self.launched.load(Ordering::Relaxed)
	}

	/// Entries in slot order.
	pub fn snapshot(&self) -> Vec<SessionSummary> {
		let slots = self.slots.lock();
		slots
			.entries
			.iter()
			.map(|(&slot, entry)| SessionSummary {
				slot,
				thread: entry
					.owner()
					.filter(|owner| slots.index.get(*owner) == Some(&slot))
					.map(str::to_string),
				client: entry.config_id().clone(),
				status: entry.status(),
				transport: entry.backend().kind(),
				address: entry.backend().address().to_string(),
				pid: entry.process().map(|process| process.pid()),
			})
			.collect()
	}

	/// Tears down every session and empties the registry.
	///
	/// Teardowns run in parallel, so this takes about as long as the slowest
	/// one. The lock is held throughout; no session can be acquired meanwhile.
	pub fn clear(&self) {
		let mut slots = self.slots.lock();
		let entries = std::mem::take(&mut slots.entries);
		slots.index.clear();
		if entries.is_empty() {
			return;
		}

		let grace = self.launcher.teardown_grace();
		info!(target = "chainprobe.pool", sessions = entries.len(), ?grace, "clearing session pool");
		thread::scope(|scope| {
			for (slot, entry) in entries {
				let spawned = thread::Builder::new()
					.name(format!("teardown-{slot}"))
					.spawn_scoped(scope, move || entry.teardown(grace));
				if let Err(e) = spawned {
					warn!(target = "chainprobe.pool", slot, error = %e, "failed to spawn teardown thread");
				}
			}
		});
	}

	fn record_launch(&self, slots: &mut Slots, thread_id: &str, entry: SessionEntry) {
		let client = entry.config_id().clone();
		let address = entry.backend().address().to_string();
		let slot = slots.insert(thread_id, entry);
		self.launched.fetch_add(1, Ordering::Relaxed);
		info!(target = "chainprobe.pool", thread = thread_id, slot, client = %client, %address, "session started");
	}

	/// Checks the pool invariants after a launch and returns the thread's backend.
	fn settle(&self, slots: &Slots, thread_id: &str) -> Result<Arc<dyn SessionBackend>> {
		let live = slots.entries.len();
		if live > self.thread_limit {
			return Err(Error::CapacityExceeded {
				live,
				limit: self.thread_limit,
			});
		}
		if live == 0 {
			return Err(Error::NoSessions);
		}
		slots
			.owned(thread_id)
			.map(|entry| Arc::clone(entry.backend()))
			.ok_or_else(|| Error::AddressesExhausted {
				thread: thread_id.to_string(),
				bound: live,
			})
	}
}

impl std::fmt::Debug for SessionRegistry {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		let slots = self.slots.lock();
		f.debug_struct("SessionRegistry")
			.field("thread_limit", &self.thread_limit)
			.field("sessions", &slots.entries.len())
			.field("threads", &slots.index.len())
			.finish()
	}
}

impl Drop for SessionRegistry {
	fn drop(&mut self) {
		self.clear();
	}
}
