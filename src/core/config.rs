//! Configuration management for the replication target
//!
//! Settings are layered: defaults, then a TOML file, then `REPLICA_*`
//! environment variables. The binary applies CLI flags last.

use crate::core::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

/// Config file looked up in the working directory when none is given
pub const DEFAULT_CONFIG_FILE: &str = "replica-target.toml";

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Server configuration
    pub server: ServerConfig,

    /// Storage configuration
    pub storage: StorageConfig,

    /// Metrics and monitoring
    pub metrics: MetricsConfig,

    /// Logging configuration
    pub logging: LoggingConfig,

    /// Performance tuning
    pub performance: PerformanceConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// HTTP server bind address
    pub http_addr: SocketAddr,

    /// Largest accepted request body (bytes)
    pub max_request_size: usize,

    /// Request timeout
    #[serde(with = "duration_str")]
    pub request_timeout: Duration,

    /// Attach a permissive CORS layer
    pub enable_cors: bool,
}

/// Available storage backend types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageType {
    /// Process-lifetime in-memory stores
    Memory,
    /// Durable stores (not available in this build)
    Disk,
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Storage backend type
    pub storage_type: StorageType,

    /// Databases created at start-up
    pub databases: Vec<String>,
}

/// Metrics configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Enable Prometheus metrics
    pub enable_prometheus: bool,

    /// Path the text exposition is served on
    pub endpoint: String,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (pretty, compact, json)
    pub format: String,
}

/// Performance tuning configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PerformanceConfig {
    /// Number of worker threads (0 = auto-detect)
    pub worker_threads: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: SocketAddr::from(([0, 0, 0, 0], 5984)),
            max_request_size: 64 * 1024 * 1024, // 64MB
            request_timeout: Duration::from_secs(30),
            enable_cors: true,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            storage_type: StorageType::Memory,
            databases: Vec::new(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enable_prometheus: true,
            endpoint: "/_metrics".to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables and config file
    pub fn load() -> Result<Self> {
        let mut config = if Path::new(DEFAULT_CONFIG_FILE).exists() {
            Self::from_file(DEFAULT_CONFIG_FILE)?
        } else {
            Config::default()
        };

        config.apply_env_overrides()?;
        config.validate()?;

        Ok(config)
    }

    /// Load configuration from a TOML file, then apply environment overrides
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let mut config = Self::from_file(path)?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| Error::config(format!("Failed to read config file: {}", e)))?;

        toml::from_str(&contents)
            .map_err(|e| Error::config(format!("Failed to parse config file: {}", e)))
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) -> Result<()> {
        use std::env;

        if let Ok(addr) = env::var("REPLICA_HTTP_ADDR") {
            self.server.http_addr = addr
                .parse()
                .map_err(|e| Error::config(format!("Invalid HTTP address: {}", e)))?;
        }

        if let Ok(size) = env::var("REPLICA_MAX_REQUEST_SIZE") {
            self.server.max_request_size = size
                .parse()
                .map_err(|e| Error::config(format!("Invalid max request size: {}", e)))?;
        }

        if let Ok(workers) = env::var("REPLICA_WORKER_THREADS") {
            self.performance.worker_threads = workers
                .parse()
                .map_err(|e| Error::config(format!("Invalid worker threads: {}", e)))?;
        }

        if let Ok(level) = env::var("REPLICA_LOG_LEVEL") {
            self.logging.level = level;
        }

        if let Ok(format) = env::var("REPLICA_LOG_FORMAT") {
            self.logging.format = format;
        }

        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.server.max_request_size < 1024 {
            return Err(Error::config("Max request size too small (minimum 1KB)"));
        }

        if self.server.request_timeout.is_zero() {
            return Err(Error::config("Request timeout must be positive"));
        }

        if self.performance.worker_threads > 1024 {
            return Err(Error::config("Too many worker threads (maximum 1024)"));
        }

        if !self.metrics.endpoint.starts_with("/_") {
            return Err(Error::config(
                "Metrics endpoint must start with '/_' so it cannot shadow a database",
            ));
        }

        match self.logging.level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => return Err(Error::config("Invalid log level")),
        }

        match self.logging.format.as_str() {
            "pretty" | "compact" | "json" => {}
            _ => return Err(Error::config("Invalid log format")),
        }

        Ok(())
    }

    /// Get optimal number of worker threads
    pub fn optimal_worker_threads(&self) -> usize {
        if self.performance.worker_threads == 0 {
            num_cpus::get().max(1)
        } else {
            self.performance.worker_threads
        }
    }
}

/// Durations written as `"250ms"`, `"30s"`, `"5m"`, `"1h"` or bare seconds
mod duration_str {
    use serde::de::{self, Deserializer, Visitor};
    use serde::Serializer;
    use std::fmt;
    use std::time::Duration;

    pub fn serialize<S>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if value.subsec_millis() != 0 {
            serializer.serialize_str(&format!("{}ms", value.as_millis()))
        } else {
            serializer.serialize_str(&format!("{}s", value.as_secs()))
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct DurationVisitor;

        impl<'de> Visitor<'de> for DurationVisitor {
            type Value = Duration;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a duration string like '30s' or '5m'")
            }

            fn visit_str<E>(self, value: &str) -> Result<Duration, E>
            where
                E: de::Error,
            {
                super::parse_duration(value).map_err(E::custom)
            }

            fn visit_i64<E>(self, value: i64) -> Result<Duration, E>
            where
                E: de::Error,
            {
                u64::try_from(value)
                    .map(Duration::from_secs)
                    .map_err(|_| E::custom("duration must not be negative"))
            }
        }

        deserializer.deserialize_any(DurationVisitor)
    }
}

// Simple duration parser for common formats
fn parse_duration(s: &str) -> std::result::Result<Duration, String> {
    let s = s.trim();
    if let Some(ms) = s.strip_suffix("ms") {
        let ms: u64 = ms.parse().map_err(|_| "Invalid milliseconds")?;
        Ok(Duration::from_millis(ms))
    } else if let Some(secs) = s.strip_suffix('s') {
        let secs: u64 = secs.parse().map_err(|_| "Invalid seconds")?;
        Ok(Duration::from_secs(secs))
    } else if let Some(mins) = s.strip_suffix('m') {
        let mins: u64 = mins.parse().map_err(|_| "Invalid minutes")?;
        Ok(Duration::from_secs(mins * 60))
    } else if let Some(hours) = s.strip_suffix('h') {
        let hours: u64 = hours.parse().map_err(|_| "Invalid hours")?;
        Ok(Duration::from_secs(hours * 3600))
    } else {
        let secs: u64 = s.parse().map_err(|_| "Invalid duration format")?;
        Ok(Duration::from_secs(secs))
    }
}
