use std::collections::HashSet;
use std::process::{Command, Stdio};
use std::sync::atomic::AtomicUsize;
use std::time::{Duration, Instant};

use chainprobe_protocol::{ClientConfig, RpcRequest, RpcResponse};
use serde_json::Value;
use tempfile::TempDir;

use super::*;
use crate::backend::ToolBackend;
use crate::config::ConfigProvider;
use crate::process::OwnedProcess;

/// Launches in-process sessions named `mock-<n>`; network configs go through
/// the real address selection.
#[derive(Default)]
struct MockLauncher {
	launches: AtomicUsize,
	delay: Duration,
}

impl MockLauncher {
	fn slow(delay: Duration) -> Self {
		Self {
			delay,
			..Self::default()
		}
	}
}

impl Launch for MockLauncher {
	fn launch(&self, config: &ClientConfig, bound: &BoundAddresses) -> Result<Option<SessionEntry>> {
		if config.transport.is_network() {
			return ClientLauncher::default().launch(config, bound);
		}
		let n = self.launches.fetch_add(1, Ordering::SeqCst);
		thread::sleep(self.delay);
		let backend = ToolBackend::new(format!("mock-{n}"), |request: &RpcRequest| -> Result<RpcResponse> {
			Ok(RpcResponse::success(request.id, Value::Null))
		});
		Ok(Some(SessionEntry::new(Arc::new(backend), config.id())))
	}
}

/// Produces nothing, as if the client could not be reached.
struct NothingLauncher;

impl Launch for NothingLauncher {
	fn launch(&self, _config: &ClientConfig, _bound: &BoundAddresses) -> Result<Option<SessionEntry>> {
		Ok(None)
	}
}

/// Each entry owns a real `sleep` process and temp dir.
struct ProcessLauncher {
	grace: Duration,
}

impl Launch for ProcessLauncher {
	fn launch(&self, config: &ClientConfig, _bound: &BoundAddresses) -> Result<Option<SessionEntry>> {
		let dir = TempDir::new()?;
		let child = Command::new("sleep").arg("30").stdout(Stdio::null()).stderr(Stdio::null()).spawn()?;
		let process = OwnedProcess::new(child, dir);
		let backend = ToolBackend::new(format!("proc-{}", process.pid()), |request: &RpcRequest| -> Result<RpcResponse> {
			Ok(RpcResponse::success(request.id, Value::Null))
		});
		Ok(Some(SessionEntry::with_process(Arc::new(backend), process, config.id())))
	}

	fn teardown_grace(&self) -> Duration {
		self.grace
	}
}

fn geth() -> ClientConfig {
	ClientConfig::new("geth", TransportKind::Ipc)
}

fn registry(limit: usize, launcher: impl Launch + 'static) -> SessionRegistry {
	SessionRegistry::with_launcher(limit, Arc::new(ConfigProvider::single(geth())), launcher)
}

fn worker(n: usize) -> String {
	format!("worker-{n}")
}

#[test]
fn concurrent_acquires_get_distinct_sessions() {
	let registry = registry(8, MockLauncher::slow(Duration::from_millis(50)));

	let addresses: Vec<String> = thread::scope(|scope| {
		let handles: Vec<_> = (0..8)
			.map(|n| {
				let registry = &registry;
				scope.spawn(move || registry.acquire(&worker(n)).unwrap().address().to_string())
			})
			.collect();
		handles.into_iter().map(|h| h.join().unwrap()).collect()
	});

	let distinct: HashSet<_> = addresses.iter().collect();
	assert_eq!(distinct.len(), 8);
	assert_eq!(registry.len(), 8);
	assert_eq!(registry.launched(), 8);
	for n in 0..8 {
		assert_eq!(registry.status(&worker(n)), SessionStatus::Working);
	}
}

#[test]
fn idle_session_is_claimed_while_another_launch_is_in_flight() {
	let delay = Duration::from_millis(1500);
	let registry = registry(4, MockLauncher::slow(delay));
	let first = registry.acquire(&worker(0)).unwrap().address().to_string();

	thread::scope(|scope| {
		let registry = &registry;
		let launching = scope.spawn(move || registry.acquire(&worker(1)).unwrap().address().to_string());

		thread::sleep(Duration::from_millis(200));
		assert_eq!(registry.len(), 1, "launch for worker-1 should still be in flight");
		registry.release(&worker(0), SessionStatus::Available);

		let started = Instant::now();
		let reused = registry.acquire(&worker(2)).unwrap();
		let waited = started.elapsed();

		assert_eq!(reused.address(), first);
		assert!(waited < Duration::from_millis(300), "reuse waited on the launch: {waited:?}");

		let launched = launching.join().unwrap();
		assert_ne!(launched, first);
	});

	assert_eq!(registry.len(), 2);
	assert_eq!(registry.launched(), 2);
	assert_eq!(registry.status(&worker(1)), SessionStatus::Working);
	assert_eq!(registry.status(&worker(2)), SessionStatus::Working);
}

#[test]
fn acquire_returns_thread_own_session() {
	let registry = registry(2, MockLauncher::default());

	let first = registry.acquire("worker-0").unwrap();
	let second = registry.acquire("worker-0").unwrap();

	assert_eq!(first.address(), second.address());
	assert_eq!(registry.len(), 1);
	assert_eq!(registry.launched(), 1);
}

#[test]
fn idle_session_is_rekeyed_without_growing() {
	let registry = registry(2, MockLauncher::default());

	let first = registry.acquire("worker-0").unwrap();
	registry.release("worker-0", SessionStatus::Available);
	assert_eq!(registry.status("worker-0"), SessionStatus::Available);

	let reused = registry.acquire("worker-1").unwrap();

	assert_eq!(reused.address(), first.address());
	assert_eq!(registry.len(), 1);
	assert_eq!(registry.launched(), 1);
	assert_eq!(registry.status("worker-0"), SessionStatus::NotExist);
	assert_eq!(registry.status("worker-1"), SessionStatus::Working);

	let snapshot = registry.snapshot();
	assert_eq!(snapshot.len(), 1);
	assert_eq!(snapshot[0].thread.as_deref(), Some("worker-1"));
}

#[test]
fn working_session_is_never_reassigned() {
	let registry = registry(2, MockLauncher::default());

	let first = registry.acquire("worker-0").unwrap();
	let second = registry.acquire("worker-1").unwrap();

	assert_ne!(first.address(), second.address());
	assert_eq!(registry.len(), 2);
	assert_eq!(registry.status("worker-0"), SessionStatus::Working);
}

#[test]
fn idle_sessions_are_claimed_exactly_once() {
	let registry = registry(4, MockLauncher::default());
	for n in 0..4 {
		registry.acquire(&worker(n)).unwrap();
		registry.release(&worker(n), SessionStatus::Available);
	}

	let addresses: Vec<String> = thread::scope(|scope| {
		let handles: Vec<_> = (4..8)
			.map(|n| {
				let registry = &registry;
				scope.spawn(move || registry.acquire(&worker(n)).unwrap().address().to_string())
			})
			.collect();
		handles.into_iter().map(|h| h.join().unwrap()).collect()
	});

	let distinct: HashSet<_> = addresses.iter().collect();
	assert_eq!(distinct.len(), 4);
	assert_eq!(registry.len(), 4);
	assert_eq!(registry.launched(), 4);
	for n in 0..4 {
		assert_eq!(registry.status(&worker(n)), SessionStatus::NotExist);
	}
}

#[test]
fn vanished_session_is_replaced_not_reused() {
	let registry = registry(2, MockLauncher::default());

	let dead = registry.acquire(&worker(0)).unwrap().address().to_string();
	registry.release(&worker(0), SessionStatus::NotExist);

	let other = registry.acquire(&worker(1)).unwrap();
	assert_ne!(other.address(), dead);
	registry.release(&worker(1), SessionStatus::Working);

	let replacement = registry.acquire(&worker(0)).unwrap();
	assert_ne!(replacement.address(), dead);
	assert_eq!(registry.len(), 2);
	assert_eq!(registry.launched(), 3);
	assert!(registry.snapshot().iter().all(|summary| summary.address != dead));
}

#[test]
fn start_marks_session_working() {
	let registry = registry(1, MockLauncher::default());
	registry.acquire("worker-0").unwrap();
	registry.release("worker-0", SessionStatus::Available);

	registry.start("worker-0").unwrap();
	assert_eq!(registry.status("worker-0"), SessionStatus::Working);
}

#[test]
fn config_mismatch_is_fatal() {
	let configs = Arc::new(ConfigProvider::new(vec![geth(), ClientConfig::new("besu", TransportKind::Ipc)]));
	configs.set_current(&ConfigId::new("geth")).unwrap();
	let registry = SessionRegistry::with_launcher(2, configs.clone(), MockLauncher::default());

	registry.acquire("worker-0").unwrap();
	configs.set_current(&ConfigId::new("besu")).unwrap();

	let err = registry.acquire("worker-0").unwrap_err();
	assert!(matches!(err, Error::ConfigMismatch { .. }), "unexpected error: {err:?}");
	assert!(err.is_fatal());

	registry.release("worker-0", SessionStatus::Available);
	let err = registry.acquire("worker-0").unwrap_err();
	assert!(matches!(err, Error::ConfigMismatch { .. }), "idle entry must still be checked: {err:?}");
}

#[test]
fn idle_session_of_other_client_is_not_reused() {
	let configs = Arc::new(ConfigProvider::new(vec![geth(), ClientConfig::new("besu", TransportKind::Ipc)]));
	configs.set_current(&ConfigId::new("geth")).unwrap();
	let registry = SessionRegistry::with_launcher(2, configs.clone(), MockLauncher::default());

	registry.acquire("worker-0").unwrap();
	registry.release("worker-0", SessionStatus::Available);
	configs.set_current(&ConfigId::new("besu")).unwrap();

	registry.acquire("worker-1").unwrap();
	assert_eq!(registry.len(), 2);
	assert_eq!(registry.launched(), 2);
}

#[test]
fn exceeding_thread_limit_is_fatal() {
	let registry = registry(1, MockLauncher::default());
	registry.acquire("worker-0").unwrap();

	let err = registry.acquire("worker-1").unwrap_err();
	assert!(matches!(err, Error::CapacityExceeded { live: 2, limit: 1 }), "unexpected error: {err:?}");
	assert!(err.is_fatal());
}

#[test]
fn launcher_producing_nothing_is_fatal() {
	let registry = registry(1, NothingLauncher);

	let err = registry.acquire("worker-0").unwrap_err();
	assert!(matches!(err, Error::NoSessions), "unexpected error: {err:?}");
	assert!(registry.is_empty());
}

#[test]
fn launch_failure_leaves_registry_empty() {
	let config = ClientConfig::from_json(r#"{"name":"odd","socketType":"smoke-signal"}"#).unwrap();
	let registry = SessionRegistry::with_launcher(1, Arc::new(ConfigProvider::single(config)), ClientLauncher::default());

	let err = registry.acquire("worker-0").unwrap_err();
	assert!(matches!(err, Error::UnknownTransport { .. }));
	assert!(registry.is_empty());
	assert_eq!(registry.status("worker-0"), SessionStatus::NotExist);
}

#[test]
fn no_active_config_is_reported() {
	let configs = Arc::new(ConfigProvider::new(vec![geth()]));
	let registry = SessionRegistry::with_launcher(1, configs, MockLauncher::default());

	assert!(matches!(registry.acquire("worker-0"), Err(Error::NoActiveConfig)));
}

#[test]
fn network_sessions_bind_distinct_addresses() {
	let config = ClientConfig::new("besu", TransportKind::Tcp).with_addresses(["10.0.0.1:8545", "10.0.0.2:8545", "10.0.0.3:8545"]);
	let registry = SessionRegistry::with_launcher(4, Arc::new(ConfigProvider::single(config)), MockLauncher::default());

	let addresses: Vec<String> = thread::scope(|scope| {
		let handles: Vec<_> = (0..3)
			.map(|n| {
				let registry = &registry;
				scope.spawn(move || registry.acquire(&worker(n)).unwrap().address().to_string())
			})
			.collect();
		handles.into_iter().map(|h| h.join().unwrap()).collect()
	});
	let distinct: HashSet<_> = addresses.iter().collect();
	assert_eq!(distinct.len(), 3);

	let err = registry.acquire("worker-3").unwrap_err();
	assert!(matches!(err, Error::AddressesExhausted { .. }), "unexpected error: {err:?}");
	assert!(err.is_fatal());
	assert_eq!(registry.len(), 3);
}

#[test]
fn network_session_takes_the_free_middle_address() {
	let config = ClientConfig::new("besu", TransportKind::Tcp).with_addresses(["A", "B", "C"]);
	let registry = SessionRegistry::with_launcher(3, Arc::new(ConfigProvider::single(config)), MockLauncher::default());

	assert_eq!(registry.acquire("worker-0").unwrap().address(), "A");
	assert_eq!(registry.acquire("worker-1").unwrap().address(), "B");
	assert_eq!(registry.acquire("worker-2").unwrap().address(), "C");
	registry.release("worker-1", SessionStatus::Available);

	// An idle entry is reused before any address is considered.
	assert_eq!(registry.acquire("worker-3").unwrap().address(), "B");
	assert_eq!(registry.len(), 3);
}

#[test]
fn release_of_unknown_thread_is_ignored() {
	let registry = registry(1, MockLauncher::default());
	registry.release("worker-9", SessionStatus::Available);
	assert_eq!(registry.status("worker-9"), SessionStatus::NotExist);
	assert!(registry.is_empty());
}

#[test]
fn clear_tears_down_in_parallel() {
	let grace = Duration::from_millis(300);
	let registry = registry(4, ProcessLauncher { grace });
	for n in 0..4 {
		registry.acquire(&worker(n)).unwrap();
	}
	let pids: Vec<u32> = registry.snapshot().iter().filter_map(|summary| summary.pid).collect();
	assert_eq!(pids.len(), 4);

	let started = Instant::now();
	registry.clear();
	let elapsed = started.elapsed();

	assert!(registry.is_empty());
	assert_eq!(registry.status("worker-0"), SessionStatus::NotExist);
	assert!(elapsed >= grace, "teardown skipped the grace period: {elapsed:?}");
	assert!(elapsed < grace * 3, "teardowns ran sequentially: {elapsed:?}");
	for pid in pids {
		// SAFETY: signal 0 only checks for existence.
		let alive = unsafe { libc::kill(pid as libc::pid_t, 0) } == 0;
		assert!(!alive, "pid {pid} survived clear");
	}
}

#[test]
fn clear_allows_fresh_sessions() {
	let registry = registry(1, MockLauncher::default());
	registry.acquire("worker-0").unwrap();
	registry.clear();
	registry.clear();

	registry.acquire("worker-0").unwrap();
	assert_eq!(registry.len(), 1);
	assert_eq!(registry.launched(), 2);
}

#[test]
fn snapshot_lists_slots_in_creation_order() {
	let registry = registry(3, MockLauncher::default());
	for n in 0..3 {
		registry.acquire(&worker(n)).unwrap();
	}
	registry.release("worker-2", SessionStatus::Available);

	let snapshot = registry.snapshot();
	let slots: Vec<SlotId> = snapshot.iter().map(|summary| summary.slot).collect();
	assert_eq!(slots, vec![0, 1, 2]);
	assert_eq!(snapshot[2].status, SessionStatus::Available);
	assert_eq!(snapshot[0].client, ConfigId::new("geth"));
	assert_eq!(snapshot[0].transport, TransportKind::Tool);
}
