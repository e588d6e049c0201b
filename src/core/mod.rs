//! Core system types and foundations
//!
//! Error handling, configuration, logging and the shared application state
//! used by the HTTP layer.

pub mod app_state;
pub mod config;
pub mod error;
pub mod logging;
pub mod utils;

// Re-export commonly used items
pub use app_state::AppState;
pub use config::Config;
pub use error::{Error, Result};
