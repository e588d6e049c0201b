//! Replica Target Server
//!
//! Serves the CouchDB replication endpoints over HTTP until interrupted.

use clap::{Arg, ArgAction, Command};
use replica_target::api::start_server;
use replica_target::core::config::StorageType;
use replica_target::core::{AppState, Config};
use replica_target::{Error, Result};
use std::sync::Arc;
use tokio::signal;
use tracing::{info, warn};

fn main() -> Result<()> {
    let matches = Command::new("replica-target")
        .version(replica_target::VERSION)
        .about("In-memory CouchDB replication target.")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file path")
        )
        .arg(
            Arg::new("http-addr")
                .long("http-addr")
                .value_name("ADDR")
                .help("HTTP server bind address")
        )
        .arg(
            Arg::new("workers")
                .long("workers")
                .value_name("N")
                .help("Number of worker threads")
        )
        .arg(
            Arg::new("log-level")
                .long("log-level")
                .value_name("LEVEL")
                .help("Log level (trace, debug, info, warn, error)")
        )
        .arg(
            Arg::new("log-format")
                .long("log-format")
                .value_name("FORMAT")
                .help("Log format (pretty, compact, json)")
        )
        .arg(
            Arg::new("storage-type")
                .long("storage-type")
                .value_name("TYPE")
                .help("Storage backend type (memory, disk)")
        )
        .arg(
            Arg::new("database")
                .short('d')
                .long("database")
                .value_name("NAME")
                .action(ArgAction::Append)
                .help("Database to create at start-up (repeatable)")
        )
        .get_matches();

    let mut config = match matches.get_one::<String>("config") {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    apply_cli_overrides(&mut config, &matches)?;
    config.validate()?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.optimal_worker_threads())
        .enable_all()
        .build()?;

    runtime.block_on(run(config))
}

async fn run(config: Config) -> Result<()> {
    replica_target::init(&config)?;
    info!(
        "Starting Replica Target v{} with {} worker threads",
        replica_target::VERSION,
        config.optimal_worker_threads()
    );

    let app_state = Arc::new(AppState::from_config(config)?);
    info!("Storage initialized: {:?}", app_state.config.storage.storage_type);

    start_server(app_state, shutdown_signal()).await?;

    info!("Shutdown complete");
    Ok(())
}

/// Apply command line argument overrides to configuration
fn apply_cli_overrides(config: &mut Config, matches: &clap::ArgMatches) -> Result<()> {
    if let Some(addr) = matches.get_one::<String>("http-addr") {
        config.server.http_addr = addr
            .parse()
            .map_err(|e| Error::config(format!("Invalid HTTP address: {}", e)))?;
    }

    if let Some(workers) = matches.get_one::<String>("workers") {
        config.performance.worker_threads = workers
            .parse()
            .map_err(|e| Error::config(format!("Invalid worker count: {}", e)))?;
    }

    if let Some(level) = matches.get_one::<String>("log-level") {
        config.logging.level = level.clone();
    }

    if let Some(format) = matches.get_one::<String>("log-format") {
        config.logging.format = format.clone();
    }

    if let Some(storage_type) = matches.get_one::<String>("storage-type") {
        config.storage.storage_type = match storage_type.as_str() {
            "memory" => StorageType::Memory,
            "disk" => StorageType::Disk,
            _ => {
                return Err(Error::config(format!(
                    "Invalid storage type: {}. Valid options: memory, disk",
                    storage_type
                )))
            }
        };
    }

    if let Some(names) = matches.get_many::<String>("database") {
        config.storage.databases.extend(names.cloned());
    }

    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received terminate signal");
        },
    }
    warn!("Received shutdown signal, initiating graceful shutdown...");
}
