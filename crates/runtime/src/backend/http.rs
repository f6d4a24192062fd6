use std::collections::VecDeque;
use std::sync::OnceLock;

use chainprobe_protocol::{RpcRequest, RpcResponse, TransportKind};
use parking_lot::Mutex;
use reqwest::blocking::Client;

use super::{RequestIds, SessionBackend};
use crate::error::{Error, Result};

/// JSON-RPC over HTTP POST to an already-running client.
///
/// HTTP answers in the same round trip, so `send` performs the POST and queues
/// the decoded body for the following `receive`.
pub struct HttpBackend {
	address: String,
	url: String,
	client: OnceLock<Client>,
	pending: Mutex<VecDeque<RpcResponse>>,
	ids: RequestIds,
}

impl HttpBackend {
	pub fn new(address: impl Into<String>) -> Self {
		let address = address.into();
		let url = if address.contains("://") {
			address.clone()
		} else {
			format!("http://{address}")
		};
		Self {
			address,
			url,
			client: OnceLock::new(),
			pending: Mutex::new(VecDeque::new()),
			ids: RequestIds::default(),
		}
	}

	pub fn url(&self) -> &str {
		&self.url
	}

	fn client(&self) -> Result<&Client> {
		if let Some(client) = self.client.get() {
			return Ok(client);
		}
		let client = Client::builder().build()?;
		Ok(self.client.get_or_init(|| client))
	}

	fn post(&self, request: &RpcRequest) -> Result<RpcResponse> {
		let response = self
			.client()?
			.post(&self.url)
			.json(request)
			.send()
			.map_err(|e| Error::transport(&self.address, e.to_string()))?;

		let status = response.status();
		if !status.is_success() {
			return Err(Error::transport(&self.address, format!("HTTP status {status}")));
		}
		Ok(response.json::<RpcResponse>()?)
	}
}

impl SessionBackend for HttpBackend {
	fn kind(&self) -> TransportKind {
		TransportKind::Tcp
	}

	fn address(&self) -> &str {
		&self.address
	}

	fn open(&self) -> Result<()> {
		self.client().map(|_| ())
	}

	fn send(&self, request: &RpcRequest) -> Result<()> {
		let response = self.post(request)?;
		self.pending.lock().push_back(response);
		Ok(())
	}

	fn receive(&self) -> Result<RpcResponse> {
		self.pending
			.lock()
			.pop_front()
			.ok_or_else(|| Error::Protocol(format!("no response pending from {}", self.address)))
	}

	fn exchange(&self, request: &RpcRequest) -> Result<RpcResponse> {
		self.post(request)
	}

	fn close(&self) {
		self.pending.lock().clear();
	}

	fn next_id(&self) -> u64 {
		self.ids.next()
	}
}

impl std::fmt::Debug for HttpBackend {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("HttpBackend").field("url", &self.url).finish()
	}
}
