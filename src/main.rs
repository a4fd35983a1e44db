//! agent-confirm server.
//!
//! ```text
//!   client ──POST .../confirm──▶ http ──▶ ConfirmationCoordinator ──▶ EntityStore
//!                                              │
//!                                              ├──▶ retry ──▶ RpcReader ──▶ chain
//!                                              │               (NetworkRegistry)
//!                                              └──▶ LogInterpreter
//! ```
//!
//! Configuration comes from `$AGENT_CONFIRM_CONFIG`, else `config.toml` when
//! present, else built-in defaults.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;

use agent_confirm::blockchain::{AlloyRpcReader, FileNetworks, NetworkRegistry};
use agent_confirm::config::watcher::ConfigWatcher;
use agent_confirm::config::{load_config, ServiceConfig};
use agent_confirm::confirmation::{ConfirmationCoordinator, CoordinatorSettings, MemoryEntityStore};
use agent_confirm::http::HttpServer;
use agent_confirm::observability::{logging, metrics};

const CONFIG_ENV: &str = "AGENT_CONFIRM_CONFIG";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config_path = std::env::var_os(CONFIG_ENV)
        .map(PathBuf::from)
        .or_else(|| Some(PathBuf::from("config.toml")).filter(|p| p.exists()));

    let config = match &config_path {
        Some(path) => load_config(path)?,
        None => ServiceConfig::default(),
    };

    logging::init_logging(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "agent-confirm starting");
    tracing::info!(
        config = ?config_path,
        bind_address = %config.listener.bind_address,
        networks = config.networks.len(),
        confirmations = config.confirmation.confirmations,
        deadline_secs = config.confirmation.deadline_secs,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let store = match &config.store.snapshot_path {
        Some(path) => MemoryEntityStore::load_from_file(path)?,
        None => {
            tracing::warn!("No store snapshot configured, confirmations are kept in memory only");
            MemoryEntityStore::new(None)
        }
    };

    // Networks follow the config file when there is one, so a reload can
    // change endpoints without a restart. The table is filled up front so
    // the first request does not read the file.
    let networks = Arc::new(match &config_path {
        Some(path) => NetworkRegistry::new(FileNetworks::new(path.clone())),
        None => NetworkRegistry::from_configs(config.networks.clone()),
    });
    networks.refresh(&config.networks)?;

    let reader = AlloyRpcReader::new(
        networks.clone(),
        Duration::from_secs(config.confirmation.rpc_timeout_secs),
    );

    let coordinator = Arc::new(ConfirmationCoordinator::new(
        Arc::new(store.clone()),
        Arc::new(reader),
        networks.clone(),
        CoordinatorSettings::from(&config),
    ));

    let _watcher = match &config_path {
        Some(path) => {
            let (watcher, mut updates) = ConfigWatcher::new(path);
            let registry = networks.clone();
            tokio::spawn(async move {
                while let Some(updated) = updates.recv().await {
                    tracing::info!(networks = updated.networks.len(), "Applying network changes");
                    if let Err(e) = registry.refresh(&updated.networks) {
                        tracing::error!(error = %e, "Rejected network changes, keeping previous table");
                    }
                }
            });
            match watcher.run() {
                Ok(handle) => Some(handle),
                Err(e) => {
                    tracing::error!(error = %e, "Config watcher unavailable, hot reload disabled");
                    None
                }
            }
        }
        None => None,
    };

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    HttpServer::new(&config, coordinator).run(listener).await?;

    if let Err(e) = store.save_to_file() {
        tracing::error!(error = %e, "Failed to save store snapshot");
    }
    tracing::info!("Shutdown complete");
    Ok(())
}
