//! Worker pool driving test units through the session registry.
//!
//! Each client is run in turn: its configuration is made current, `threads`
//! blocking workers pull unit numbers from a shared counter, and every unit
//! takes the worker's session, issues the configured calls and hands the session
//! back as idle. The pool is cleared between clients and before returning.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Instant;

use anyhow::Context;
use chainprobe_protocol::ClientConfig;
use chainprobe_runtime::{ConfigProvider, Error as RuntimeError, LaunchSettings, PoolSettings, SessionRegistry, SessionStatus};
use serde::Serialize;
use serde_json::Value;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::error::{HarnessError, Result};

pub const DEFAULT_METHOD: &str = "web3_clientVersion";

#[derive(Debug, Clone)]
pub struct RunOptions {
	pub threads: usize,
	/// Test units per client.
	pub units: usize,
	/// Calls issued in order for every unit.
	pub methods: Vec<String>,
	pub launch: LaunchSettings,
}

impl RunOptions {
	pub fn new(threads: usize) -> Self {
		Self {
			threads,
			units: threads,
			methods: vec![DEFAULT_METHOD.to_string()],
			launch: LaunchSettings::default(),
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnitFailure {
	pub unit: usize,
	pub thread: String,
	pub method: String,
	pub message: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientReport {
	pub client: String,
	pub transport: String,
	pub units: usize,
	pub failed_units: usize,
	pub sessions_launched: usize,
	pub duration_ms: u64,
	#[serde(skip_serializing_if = "Vec::is_empty")]
	pub failures: Vec<UnitFailure>,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
	pub clients: Vec<ClientReport>,
}

impl RunReport {
	pub fn total_units(&self) -> usize {
		self.clients.iter().map(|client| client.units).sum()
	}

	pub fn failed_units(&self) -> usize {
		self.clients.iter().map(|client| client.failed_units).sum()
	}

	pub fn is_success(&self) -> bool {
		self.failed_units() == 0
	}
}

/// What one worker did for one client.
#[derive(Debug, Default)]
struct WorkerOutcome {
	units: usize,
	failed_units: usize,
	failures: Vec<UnitFailure>,
}

/// State shared by the workers of one client run.
struct Shared {
	registry: Arc<SessionRegistry>,
	methods: Vec<String>,
	units: usize,
	next_unit: AtomicUsize,
	cancel: Arc<AtomicBool>,
}

pub struct Runner {
	clients: Vec<ClientConfig>,
	configs: Arc<ConfigProvider>,
	registry: Arc<SessionRegistry>,
	options: RunOptions,
	cancel: Arc<AtomicBool>,
}

impl Runner {
	pub fn new(clients: Vec<ClientConfig>, options: RunOptions) -> Self {
		let configs = Arc::new(ConfigProvider::new(clients.clone()));
		let registry = Arc::new(SessionRegistry::new(
			PoolSettings {
				thread_limit: options.threads,
				launch: options.launch.clone(),
			},
			configs.clone(),
		));

		Self {
			clients,
			configs,
			registry,
			options,
			cancel: Arc::new(AtomicBool::new(false)),
		}
	}

	pub fn registry(&self) -> &Arc<SessionRegistry> {
		&self.registry
	}

	/// Stops handing out new units; workers finish their current one.
	pub fn cancel(&self) {
		self.cancel.store(true, Ordering::SeqCst);
	}

	pub fn is_cancelled(&self) -> bool {
		self.cancel.load(Ordering::SeqCst)
	}

	/// Runs every client in order. The first fatal error ends the run.
	pub async fn run(&self) -> Result<RunReport> {
		let mut report = RunReport::default();
		for client in &self.clients {
			if self.is_cancelled() {
				return Err(HarnessError::Interrupted);
			}
			let outcome = self.run_client(client).await;
			self.clear().await?;
			report.clients.push(outcome?);
		}
		Ok(report)
	}

	async fn run_client(&self, config: &ClientConfig) -> Result<ClientReport> {
		self.configs.set_current(&config.id())?;
		info!(
			target = "chainprobe.runner",
			client = %config.id(),
			transport = %config.transport,
			threads = self.options.threads,
			units = self.options.units,
			"running client"
		);

		let started = Instant::now();
		let launched_before = self.registry.launched();
		let shared = Arc::new(Shared {
			registry: Arc::clone(&self.registry),
			methods: self.options.methods.clone(),
			units: self.options.units,
			next_unit: AtomicUsize::new(0),
			cancel: Arc::clone(&self.cancel),
		});

		let mut workers = JoinSet::new();
		for n in 0..self.options.threads {
			let shared = Arc::clone(&shared);
			workers.spawn_blocking(move || run_worker(&format!("worker-{n}"), &shared));
		}

		let mut report = ClientReport {
			client: config.name.clone(),
			transport: config.transport.to_string(),
			units: 0,
			failed_units: 0,
			sessions_launched: 0,
			duration_ms: 0,
			failures: Vec::new(),
		};
		let mut first_error = None;
		while let Some(joined) = workers.join_next().await {
			match joined.context("worker task failed") {
				Ok(Ok(outcome)) => {
					report.units += outcome.units;
					report.failed_units += outcome.failed_units;
					report.failures.extend(outcome.failures);
				}
				Ok(Err(err)) => {
					shared.cancel.store(true, Ordering::SeqCst);
					first_error = first_error.or(Some(err));
				}
				Err(err) => {
					shared.cancel.store(true, Ordering::SeqCst);
					first_error = first_error.or(Some(err.into()));
				}
			}
		}
		if let Some(err) = first_error {
			return Err(err);
		}
		if self.is_cancelled() {
			return Err(HarnessError::Interrupted);
		}

		report.failures.sort_by_key(|failure| failure.unit);
		report.sessions_launched = self.registry.launched() - launched_before;
		report.duration_ms = started.elapsed().as_millis() as u64;
		info!(
			target = "chainprobe.runner",
			client = %config.id(),
			units = report.units,
			failed = report.failed_units,
			sessions = report.sessions_launched,
			"client finished"
		);
		Ok(report)
	}

	/// Tears the pool down from a blocking thread.
	pub async fn clear(&self) -> Result<()> {
		let registry = Arc::clone(&self.registry);
		tokio::task::spawn_blocking(move || registry.clear())
			.await
			.context("pool teardown task failed")?;
		Ok(())
	}
}

fn run_worker(thread_id: &str, shared: &Shared) -> Result<WorkerOutcome> {
	let mut outcome = WorkerOutcome::default();
	loop {
		if shared.cancel.load(Ordering::SeqCst) {
			break;
		}
		let unit = shared.next_unit.fetch_add(1, Ordering::SeqCst);
		if unit >= shared.units {
			break;
		}

		let backend = shared.registry.start(thread_id)?;
		debug!(target = "chainprobe.runner", thread = thread_id, unit, address = backend.address(), "unit started");

		let mut failed = false;
		let mut vanished = false;
		for method in &shared.methods {
			match backend.call(method, Value::Null) {
				Ok(result) => {
					debug!(target = "chainprobe.runner", thread = thread_id, unit, method, %result, "call ok");
				}
				Err(err) if err.is_fatal() => return Err(err.into()),
				Err(err) => {
					warn!(target = "chainprobe.runner", thread = thread_id, unit, method, error = %err, "call failed");
					failed = true;
					vanished |= matches!(err, RuntimeError::Transport { .. });
					outcome.failures.push(UnitFailure {
						unit,
						thread: thread_id.to_string(),
						method: method.clone(),
						message: err.to_string(),
					});
				}
			}
		}

		let status = if vanished {
			SessionStatus::NotExist
		} else {
			SessionStatus::Available
		};
		shared.registry.release(thread_id, status);
		outcome.units += 1;
		if failed {
			outcome.failed_units += 1;
		}
	}
	Ok(outcome)
}
