use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};

use chainprobe_protocol::{RpcRequest, RpcResponse, TransportKind};
use parking_lot::Mutex;
use tracing::debug;

use super::{RequestIds, SessionBackend};
use crate::error::{Error, Result};

struct IpcStream {
	reader: BufReader<UnixStream>,
	writer: UnixStream,
}

/// Newline-delimited JSON-RPC over a local socket file.
///
/// Connects lazily: the launcher builds the backend as soon as the socket file
/// exists, and the first `open`/`send` performs the connect.
pub struct IpcBackend {
	kind: TransportKind,
	path: PathBuf,
	address: String,
	stream: Mutex<Option<IpcStream>>,
	ids: RequestIds,
}

impl IpcBackend {
	/// Backend for a socket owned by a client the harness spawned.
	pub fn new(path: impl Into<PathBuf>) -> Self {
		Self::with_kind(TransportKind::Ipc, path)
	}

	/// Backend for a socket of a client someone else started.
	pub fn attached(path: impl Into<PathBuf>) -> Self {
		Self::with_kind(TransportKind::IpcDebug, path)
	}

	fn with_kind(kind: TransportKind, path: impl Into<PathBuf>) -> Self {
		let path = path.into();
		Self {
			kind,
			address: path.display().to_string(),
			path,
			stream: Mutex::new(None),
			ids: RequestIds::default(),
		}
	}

	pub fn path(&self) -> &Path {
		&self.path
	}

	fn connect(&self) -> Result<IpcStream> {
		let writer = UnixStream::connect(&self.path).map_err(|e| Error::transport(&self.address, format!("connect failed: {e}")))?;
		let reader = BufReader::new(writer.try_clone()?);
		debug!(target = "chainprobe.rpc", socket = %self.path.display(), "ipc connected");
		Ok(IpcStream { reader, writer })
	}

	fn write_request(&self, slot: &mut Option<IpcStream>, request: &RpcRequest) -> Result<()> {
		if slot.is_none() {
			*slot = Some(self.connect()?);
		}
		let Some(stream) = slot.as_mut() else {
			return Err(Error::transport(&self.address, "not connected"));
		};

		let mut payload = serde_json::to_vec(request)?;
		payload.push(b'\n');
		let written = stream.writer.write_all(&payload).and_then(|()| stream.writer.flush());
		if let Err(e) = written {
			*slot = None;
			return Err(Error::transport(&self.address, format!("write failed: {e}")));
		}
		Ok(())
	}

	fn read_response(&self, slot: &mut Option<IpcStream>) -> Result<RpcResponse> {
		let Some(stream) = slot.as_mut() else {
			return Err(Error::transport(&self.address, "not connected"));
		};

		let mut line = String::new();
		loop {
			line.clear();
			let read = match stream.reader.read_line(&mut line) {
				Ok(read) => read,
				Err(e) => {
					*slot = None;
					return Err(Error::transport(&self.address, format!("read failed: {e}")));
				}
			};
			if read == 0 {
				*slot = None;
				return Err(Error::transport(&self.address, "connection closed by client"));
			}
			if !line.trim().is_empty() {
				break;
			}
		}

		Ok(serde_json::from_str(line.trim_end())?)
	}
}

impl SessionBackend for IpcBackend {
	fn kind(&self) -> TransportKind {
		self.kind
	}

	fn address(&self) -> &str {
		&self.address
	}

	fn open(&self) -> Result<()> {
		let mut stream = self.stream.lock();
		if stream.is_none() {
			*stream = Some(self.connect()?);
		}
		Ok(())
	}

	fn send(&self, request: &RpcRequest) -> Result<()> {
		let mut guard = self.stream.lock();
		self.write_request(&mut guard, request)
	}

	fn receive(&self) -> Result<RpcResponse> {
		let mut guard = self.stream.lock();
		self.read_response(&mut guard)
	}

	fn exchange(&self, request: &RpcRequest) -> Result<RpcResponse> {
		let mut guard = self.stream.lock();
		self.write_request(&mut guard, request)?;
		self.read_response(&mut guard)
	}

	fn close(&self) {
		if let Some(stream) = self.stream.lock().take() {
			let _ = stream.writer.shutdown(std::net::Shutdown::Both);
		}
	}

	fn next_id(&self) -> u64 {
		self.ids.next()
	}
}

impl std::fmt::Debug for IpcBackend {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("IpcBackend")
			.field("kind", &self.kind)
			.field("path", &self.path)
			.field("connected", &self.stream.lock().is_some())
			.finish()
	}
}
