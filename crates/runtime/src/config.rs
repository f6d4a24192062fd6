//! Client configurations of a run and which one is under test.

use std::sync::Arc;

use chainprobe_protocol::{ClientConfig, ConfigId};
use parking_lot::RwLock;

use crate::error::{Error, Result};

/// Supplies the configuration currently in effect.
pub trait ConfigSource: Send + Sync {
	fn current(&self) -> Result<Arc<ClientConfig>>;
}

/// Holds every loaded client configuration and the current selection.
///
/// The runner switches clients with [`set_current`](Self::set_current)
/// between test batches; the session registry only reads the current one.
#[derive(Debug, Default)]
pub struct ConfigProvider {
	configs: Vec<Arc<ClientConfig>>,
	current: RwLock<Option<Arc<ClientConfig>>>,
}

impl ConfigProvider {
	pub fn new(configs: Vec<ClientConfig>) -> Self {
		Self {
			configs: configs.into_iter().map(Arc::new).collect(),
			current: RwLock::new(None),
		}
	}

	/// Provider with a single configuration that is already current.
	pub fn single(config: ClientConfig) -> Self {
		let provider = Self::new(vec![config]);
		let first = provider.configs.first().cloned();
		*provider.current.write() = first;
		provider
	}

	pub fn configs(&self) -> &[Arc<ClientConfig>] {
		&self.configs
	}

	pub fn get(&self, id: &ConfigId) -> Option<Arc<ClientConfig>> {
		self.configs.iter().find(|config| &config.id() == id).cloned()
	}

	/// Makes the configuration with `id` current.
	pub fn set_current(&self, id: &ConfigId) -> Result<Arc<ClientConfig>> {
		let config = self.get(id).ok_or_else(|| Error::InvalidConfig {
			client: id.clone(),
			reason: "not among the loaded client configurations".to_string(),
		})?;
		*self.current.write() = Some(Arc::clone(&config));
		Ok(config)
	}
}

impl ConfigSource for ConfigProvider {
	fn current(&self) -> Result<Arc<ClientConfig>> {
		self.current.read().clone().ok_or(Error::NoActiveConfig)
	}
}
