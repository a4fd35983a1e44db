//! Chain id → endpoint resolution.
//!
//! The registry loads its table on first use and keeps it until
//! [`NetworkRegistry::invalidate`] is called. A caller that already holds the
//! new config (the reload watcher) uses [`NetworkRegistry::refresh`] instead,
//! so lookups never wait on the source. The table is an immutable snapshot
//! swapped atomically, so lookups never block each other.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use alloy::primitives::Address;
use arc_swap::ArcSwapOption;

use crate::blockchain::types::{BlockchainError, BlockchainResult, ChainId};
use crate::config::loader::load_config;
use crate::config::schema::NetworkConfig;

/// Resolved settings for one chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Network {
    pub chain_id: ChainId,
    pub rpc_url: url::Url,
    pub failover_urls: Vec<url::Url>,
    pub registry_address: Option<Address>,
}

impl TryFrom<&NetworkConfig> for Network {
    type Error = BlockchainError;

    fn try_from(config: &NetworkConfig) -> Result<Self, Self::Error> {
        let parse_url = |raw: &str| {
            raw.parse::<url::Url>().map_err(|e| {
                BlockchainError::Configuration(format!("Invalid RPC URL '{}': {}", raw, e))
            })
        };

        let registry_address = config
            .registry_address
            .as_deref()
            .map(|raw| {
                raw.parse::<Address>().map_err(|e| {
                    BlockchainError::Configuration(format!(
                        "Invalid registry address '{}': {}",
                        raw, e
                    ))
                })
            })
            .transpose()?;

        Ok(Self {
            chain_id: ChainId(config.chain_id),
            rpc_url: parse_url(&config.rpc_url)?,
            failover_urls: config
                .failover_urls
                .iter()
                .map(|u| parse_url(u))
                .collect::<Result<_, _>>()?,
            registry_address,
        })
    }
}

/// Where the registry reads its network table from.
pub trait NetworkSource: Send + Sync {
    fn load(&self) -> BlockchainResult<Vec<NetworkConfig>>;
}

/// A fixed, in-memory network table.
#[derive(Debug, Clone, Default)]
pub struct StaticNetworks(pub Vec<NetworkConfig>);

impl NetworkSource for StaticNetworks {
    fn load(&self) -> BlockchainResult<Vec<NetworkConfig>> {
        Ok(self.0.clone())
    }
}

/// The `[[networks]]` table of a config file, re-read on every reload.
#[derive(Debug, Clone)]
pub struct FileNetworks {
    path: PathBuf,
}

impl FileNetworks {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl NetworkSource for FileNetworks {
    fn load(&self) -> BlockchainResult<Vec<NetworkConfig>> {
        load_config(&self.path)
            .map(|config| config.networks)
            .map_err(|e| BlockchainError::Configuration(e.to_string()))
    }
}

type NetworkTable = HashMap<ChainId, Network>;

/// Lazily-initialized, invalidatable cache of network settings.
pub struct NetworkRegistry {
    source: Box<dyn NetworkSource>,
    table: ArcSwapOption<NetworkTable>,
}

impl NetworkRegistry {
    pub fn new(source: impl NetworkSource + 'static) -> Self {
        Self {
            source: Box::new(source),
            table: ArcSwapOption::empty(),
        }
    }

    /// Registry over a fixed list of networks.
    pub fn from_configs(networks: Vec<NetworkConfig>) -> Self {
        Self::new(StaticNetworks(networks))
    }

    /// Look up a chain. Unknown chains are a configuration error, not a
    /// transient one.
    pub fn get(&self, chain_id: ChainId) -> BlockchainResult<Network> {
        let table = self.table()?;
        table
            .get(&chain_id)
            .cloned()
            .ok_or(BlockchainError::UnsupportedChain(chain_id))
    }

    /// Drop the cached table; the next lookup reloads from the source.
    pub fn invalidate(&self) {
        self.table.store(None);
        tracing::info!("Network registry invalidated");
    }

    /// Replace the cached table with `networks` without touching the source.
    /// On error the previous table stays in place.
    pub fn refresh(&self, networks: &[NetworkConfig]) -> BlockchainResult<usize> {
        let table = build_table(networks)?;
        let count = table.len();
        self.table.store(Some(Arc::new(table)));
        tracing::info!(networks = count, "Network registry refreshed");
        Ok(count)
    }

    /// Whether a table is currently cached.
    pub fn is_loaded(&self) -> bool {
        self.table.load().is_some()
    }

    fn table(&self) -> BlockchainResult<Arc<NetworkTable>> {
        if let Some(table) = self.table.load_full() {
            return Ok(table);
        }

        let table = build_table(&self.source.load()?)?;
        tracing::debug!(networks = table.len(), "Network registry loaded");

        // Concurrent first lookups may each build a table; they are
        // identical, so the last store wins harmlessly.
        let table = Arc::new(table);
        self.table.store(Some(table.clone()));
        Ok(table)
    }
}

fn build_table(networks: &[NetworkConfig]) -> BlockchainResult<NetworkTable> {
    let mut table = NetworkTable::new();
    for config in networks {
        let network = Network::try_from(config)?;
        table.insert(network.chain_id, network);
    }
    Ok(table)
}

impl std::fmt::Debug for NetworkRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetworkRegistry")
            .field("loaded", &self.is_loaded())
            .finish()
    }
}
