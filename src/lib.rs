//! Replica Target - the receiving side of CouchDB replication
//!
//! An in-memory document store that a stock CouchDB replicator can push
//! into. Documents carry `<generation>-<fingerprint>` revisions, writes are
//! checked optimistically against the current head, and every committed
//! mutation is appended to a per-database change log.
#![warn(missing_docs)]

// Core foundational modules
pub mod core;
pub mod types;

// Main functional modules
pub mod storage;
pub mod multipart;
pub mod api;
pub mod system;

// Re-export commonly used items for convenience
pub use core::{Config, Error, Result};

/// Crate version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
/// Crate name
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// Initialize tracing and the metrics registry
pub fn init(config: &Config) -> Result<()> {
    core::logging::init_logging(&config.logging)?;
    tracing::info!("Initializing {} v{}", NAME, VERSION);

    system::metrics::init_registry();

    Ok(())
}
