//! Storage factory for creating database registries based on configuration

use crate::core::config::{StorageConfig, StorageType};
use crate::core::error::Error;
use crate::storage::registry::MemoryRegistry;

/// Storage factory error
#[derive(Debug)]
pub enum StorageFactoryError {
    /// Unsupported storage type
    UnsupportedStorageType(StorageType),
    /// A configured database could not be created
    InitializationFailed(String),
}

impl std::fmt::Display for StorageFactoryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageFactoryError::UnsupportedStorageType(storage_type) => {
                write!(f, "Unsupported storage type: {:?}", storage_type)
            }
            StorageFactoryError::InitializationFailed(msg) => {
                write!(f, "Storage initialization failed: {}", msg)
            }
        }
    }
}

impl std::error::Error for StorageFactoryError {}

impl From<StorageFactoryError> for Error {
    fn from(err: StorageFactoryError) -> Self {
        Error::config(err.to_string())
    }
}

/// Create a registry and the databases listed in the configuration
pub fn create_registry(config: &StorageConfig) -> Result<MemoryRegistry, StorageFactoryError> {
    match config.storage_type {
        StorageType::Memory => {
            let registry = MemoryRegistry::in_memory();
            for name in &config.databases {
                registry
                    .create(name)
                    .map_err(|e| StorageFactoryError::InitializationFailed(e.to_string()))?;
            }
            Ok(registry)
        }
        StorageType::Disk => Err(StorageFactoryError::UnsupportedStorageType(StorageType::Disk)),
    }
}
