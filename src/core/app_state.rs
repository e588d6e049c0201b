//! Application State Management
//!
//! `AppState` is shared by every request handler. It owns the database
//! registry and the configuration the server was started with.

use crate::core::config::Config;
use crate::core::error::Result;
use crate::storage::{create_registry, DatabaseRegistry, MemoryDatabase, StorageImpl};
use std::sync::Arc;

/// Central application state holding all services and components
pub struct AppState<S: StorageImpl> {
    /// Named databases
    pub registry: Arc<DatabaseRegistry<S>>,

    /// Application configuration
    pub config: Config,
}

impl<S: StorageImpl> AppState<S> {
    /// Create a new AppState around an existing registry
    pub fn new(registry: Arc<DatabaseRegistry<S>>, config: Config) -> Self {
        Self { registry, config }
    }
}

impl AppState<MemoryDatabase> {
    /// Build the registry described by `config.storage`
    pub fn from_config(config: Config) -> Result<Self> {
        let registry = create_registry(&config.storage)?;
        Ok(Self::new(Arc::new(registry), config))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_config_creates_databases() {
        let mut config = Config::default();
        config.storage.databases = vec!["inbox".to_string()];

        let state = AppState::from_config(config).unwrap();
        assert_eq!(state.registry.names(), vec!["inbox"]);
    }
}
