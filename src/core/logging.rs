//! Tracing subscriber setup
//!
//! `RUST_LOG` takes precedence over the configured level so operators can
//! turn on per-module debugging without editing the config file.

use crate::core::config::LoggingConfig;
use crate::core::error::{Error, Result};
use tracing_subscriber::EnvFilter;

/// Install the global subscriber described by `config`
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .map_err(|e| Error::config(format!("Invalid log filter: {}", e)))?;

    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    let installed = match config.format.as_str() {
        "json" => builder.json().try_init(),
        "compact" => builder.compact().try_init(),
        _ => builder.pretty().try_init(),
    };

    installed.map_err(|e| Error::config(format!("Failed to install tracing subscriber: {}", e)))
}
