use std::collections::VecDeque;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;

use chainprobe_protocol::{RpcRequest, RpcResponse, TransportKind};
use parking_lot::Mutex;
use tracing::debug;

use super::{RequestIds, SessionBackend};
use crate::error::{Error, Result};

/// Executes one request synchronously inside the harness.
pub trait ToolRunner: Send + Sync {
	fn run(&self, request: &RpcRequest) -> Result<RpcResponse>;
}

impl<F> ToolRunner for F
where
	F: Fn(&RpcRequest) -> Result<RpcResponse> + Send + Sync,
{
	fn run(&self, request: &RpcRequest) -> Result<RpcResponse> {
		self(request)
	}
}

/// Runs a tool executable once per request.
///
/// The request is written to the tool's stdin as JSON and the response is
/// read from its stdout. The tool exits after each call. A tool given with an
/// interpreter runs as `<interpreter> <program>` and needs no execute bit.
#[derive(Debug, Clone)]
pub struct CommandTool {
	program: PathBuf,
	interpreter: Option<PathBuf>,
}

impl CommandTool {
	pub fn new(program: impl Into<PathBuf>) -> Self {
		Self {
			program: program.into(),
			interpreter: None,
		}
	}

	pub fn with_interpreter(mut self, interpreter: impl Into<PathBuf>) -> Self {
		self.interpreter = Some(interpreter.into());
		self
	}

	fn command(&self) -> (Command, &Path) {
		match &self.interpreter {
			Some(interpreter) => {
				let mut command = Command::new(interpreter);
				command.arg(&self.program);
				(command, interpreter)
			}
			None => (Command::new(&self.program), &self.program),
		}
	}
}

impl ToolRunner for CommandTool {
	fn run(&self, request: &RpcRequest) -> Result<RpcResponse> {
		let mut payload = serde_json::to_vec(request)?;
		payload.push(b'\n');

		let (mut command, spawned) = self.command();
		let mut child = command
			.stdin(Stdio::piped())
			.stdout(Stdio::piped())
			.stderr(Stdio::piped())
			.spawn()
			.map_err(|source| Error::Spawn {
				program: spawned.to_path_buf(),
				source,
			})?;

		// Feed stdin while stdout drains so neither pipe fills up.
		let stdin = child.stdin.take();
		let (written, output) = thread::scope(|scope| {
			let writer = scope.spawn(move || -> std::io::Result<()> {
				match stdin {
					Some(mut stdin) => stdin.write_all(&payload),
					None => Ok(()),
				}
			});
			let output = child.wait_with_output();
			(writer.join(), output)
		});

		let output = output?;
		match written {
			Ok(Err(e)) if e.kind() != ErrorKind::BrokenPipe => return Err(e.into()),
			Err(_) => return Err(Error::Protocol(format!("stdin writer for {} panicked", self.program.display()))),
			_ => {}
		}

		if !output.status.success() {
			let stderr = String::from_utf8_lossy(&output.stderr);
			return Err(Error::transport(
				&self.program.display().to_string(),
				format!("tool exited with {}: {}", output.status, stderr.trim()),
			));
		}

		debug!(target = "chainprobe.rpc", tool = %self.program.display(), bytes = output.stdout.len(), "tool finished");
		Ok(serde_json::from_slice(&output.stdout)?)
	}
}

/// Backend for the in-process tool transport: no socket, no server process.
pub struct ToolBackend {
	address: String,
	runner: Box<dyn ToolRunner>,
	pending: Mutex<VecDeque<RpcResponse>>,
	ids: RequestIds,
}

impl ToolBackend {
	/// Backend running `program` for every request.
	pub fn command(program: impl Into<String>) -> Self {
		let program = program.into();
		let runner = CommandTool::new(&program);
		Self::new(program, runner)
	}

	/// Backend running `script` through `shell` for every request.
	pub fn script(shell: impl Into<PathBuf>, script: impl AsRef<Path>) -> Self {
		let script = script.as_ref();
		let runner = CommandTool::new(script).with_interpreter(shell);
		Self::new(script.display().to_string(), runner)
	}

	pub fn new(address: impl Into<String>, runner: impl ToolRunner + 'static) -> Self {
		Self {
			address: address.into(),
			runner: Box::new(runner),
			pending: Mutex::new(VecDeque::new()),
			ids: RequestIds::default(),
		}
	}
}

impl SessionBackend for ToolBackend {
	fn kind(&self) -> TransportKind {
		TransportKind::Tool
	}

	fn address(&self) -> &str {
		&self.address
	}

	fn open(&self) -> Result<()> {
		Ok(())
	}

	fn send(&self, request: &RpcRequest) -> Result<()> {
		let response = self.runner.run(request)?;
		self.pending.lock().push_back(response);
		Ok(())
	}

	fn receive(&self) -> Result<RpcResponse> {
		self.pending
			.lock()
			.pop_front()
			.ok_or_else(|| Error::Protocol(format!("no tool output pending for {}", self.address)))
	}

	fn exchange(&self, request: &RpcRequest) -> Result<RpcResponse> {
		self.runner.run(request)
	}

	fn close(&self) {
		self.pending.lock().clear();
	}

	fn next_id(&self) -> u64 {
		self.ids.next()
	}
}

impl std::fmt::Debug for ToolBackend {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("ToolBackend")
			.field("address", &self.address)
			.field("pending", &self.pending.lock().len())
			.finish()
	}
}
