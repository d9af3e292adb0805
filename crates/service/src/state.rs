use std::sync::Arc;

use common::operation::Defaults;
use common::prelude::MemoryNodeStore;

use super::config::{Config, ConfigError};

/// Main service state shared by every request handler
#[derive(Clone)]
pub struct State {
    store: MemoryNodeStore,
    config: Arc<Config>,
    defaults: Arc<Defaults>,
}

impl State {
    pub fn from_config(config: Config) -> Result<Self, StateSetupError> {
        let store = config.build_store()?;
        tracing::info!(nodes = config.nodes.len(), "node directory loaded");
        Ok(Self::with_store(config, store))
    }

    pub fn with_store(config: Config, store: MemoryNodeStore) -> Self {
        let defaults = Arc::new(config.defaults());
        Self {
            store,
            config: Arc::new(config),
            defaults,
        }
    }

    pub fn store(&self) -> &MemoryNodeStore {
        &self.store
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn defaults(&self) -> &Defaults {
        &self.defaults
    }

    /// A caller is allowed when no access keys are configured or the key it
    /// presented is one of them
    pub fn access_allowed(&self, access_key: &str) -> bool {
        self.config.access_keys.is_empty()
            || self.config.access_keys.iter().any(|k| k == access_key)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StateSetupError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_access_allowed() {
        let open = State::with_store(Config::default(), MemoryNodeStore::new());
        assert!(open.access_allowed(""));

        let config = Config {
            access_keys: vec!["k1".to_string(), "k2".to_string()],
            ..Config::default()
        };
        let closed = State::with_store(config, MemoryNodeStore::new());
        assert!(closed.access_allowed("k2"));
        assert!(!closed.access_allowed(""));
        assert!(!closed.access_allowed("k3"));
    }
}
