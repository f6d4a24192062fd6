//! Client configuration as read from a client's `config` file.
//!
//! A configuration is immutable once loaded and is identified by its
//! [`ConfigId`]. The session pool only compares ids and reads the transport,
//! launch script and address fields; everything else belongs to the loader.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Deserializer, Serialize};

/// Stable identifier distinguishing one client configuration from another.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConfigId(String);

impl ConfigId {
	pub fn new(id: impl Into<String>) -> Self {
		Self(id.into())
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}
}

impl fmt::Display for ConfigId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

/// Mechanism carrying the protocol between the harness and one client.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransportKind {
	/// Client spawned by the harness, reached over a local socket file.
	Ipc,
	/// Already-running client reached over a network address.
	Tcp,
	/// Already-running client reached over a socket file given in the config.
	IpcDebug,
	/// Tool executed per request, no long-lived server.
	#[serde(alias = "t8ntool", alias = "transition-tool")]
	Tool,
	/// Any transport name the harness does not know.
	#[serde(other)]
	Unsupported,
}

impl TransportKind {
	/// Whether sessions of this kind are bound to a network address that must
	/// not be handed to two sessions at once.
	pub fn is_network(self) -> bool {
		matches!(self, TransportKind::Tcp)
	}
}

impl fmt::Display for TransportKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			TransportKind::Ipc => write!(f, "ipc"),
			TransportKind::Tcp => write!(f, "tcp"),
			TransportKind::IpcDebug => write!(f, "ipc-debug"),
			TransportKind::Tool => write!(f, "tool"),
			TransportKind::Unsupported => write!(f, "unsupported"),
		}
	}
}

/// One client configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientConfig {
	/// Client name, also used as the configuration id.
	pub name: String,
	/// Transport used to reach the client.
	#[serde(rename = "socketType")]
	pub transport: TransportKind,
	/// Candidate addresses (socket path, `host:port`, or tool command).
	#[serde(rename = "socketAddress", default, deserialize_with = "one_or_many")]
	pub addresses: Vec<String>,
	/// Warm-up grace in seconds after the client's socket appears.
	#[serde(default, deserialize_with = "seconds", skip_serializing_if = "Option::is_none")]
	pub initialize_time: Option<u64>,
	/// Script spawning the client; discovered next to the config file.
	#[serde(skip)]
	pub launch_script: Option<PathBuf>,
}

impl ClientConfig {
	/// Builds a configuration in code, mostly for tests and overrides.
	pub fn new(name: impl Into<String>, transport: TransportKind) -> Self {
		Self {
			name: name.into(),
			transport,
			addresses: Vec::new(),
			initialize_time: None,
			launch_script: None,
		}
	}

	pub fn with_addresses<I, S>(mut self, addresses: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.addresses = addresses.into_iter().map(Into::into).collect();
		self
	}

	pub fn with_launch_script(mut self, script: impl Into<PathBuf>) -> Self {
		self.launch_script = Some(script.into());
		self
	}

	pub fn with_initialize_time(mut self, seconds: u64) -> Self {
		self.initialize_time = Some(seconds);
		self
	}

	/// Parses a `config` file body.
	pub fn from_json(json: &str) -> serde_json::Result<Self> {
		serde_json::from_str(json)
	}

	pub fn id(&self) -> ConfigId {
		ConfigId::new(self.name.clone())
	}

	/// First configured address, or an empty string when none is set.
	pub fn address(&self) -> &str {
		self.addresses.first().map(String::as_str).unwrap_or_default()
	}

	pub fn addresses(&self) -> &[String] {
		&self.addresses
	}

	pub fn launch_script(&self) -> Option<&Path> {
		self.launch_script.as_deref()
	}
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
	One(String),
	Many(Vec<String>),
}

fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
	D: Deserializer<'de>,
{
	Ok(match OneOrMany::deserialize(deserializer)? {
		OneOrMany::One(addr) => vec![addr],
		OneOrMany::Many(addrs) => addrs,
	})
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrString {
	Number(u64),
	Text(String),
}

fn seconds<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
	D: Deserializer<'de>,
{
	match Option::<NumberOrString>::deserialize(deserializer)? {
		None => Ok(None),
		Some(NumberOrString::Number(n)) => Ok(Some(n)),
		Some(NumberOrString::Text(s)) => s.trim().parse().map(Some).map_err(serde::de::Error::custom),
	}
}
