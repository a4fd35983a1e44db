//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the
//! confirmation service and its client. All types derive Serde traits for
//! deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the confirmation service.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ServiceConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// HTTP-level timeouts.
    pub timeouts: TimeoutConfig,

    /// Chain confirmation settings used by the coordinator.
    pub confirmation: ConfirmationConfig,

    /// Retry policy around chain reads.
    pub retries: RetryConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Entity store persistence.
    pub store: StoreConfig,

    /// Client-side pending-operation ledger.
    pub ledger: LedgerConfig,

    /// Client settings used by `confirm-cli`.
    pub client: ClientConfig,

    /// Known chains and their RPC endpoints.
    pub networks: Vec<NetworkConfig>,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Timeout configuration for the HTTP layer.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Request timeout (total time for request/response) in seconds.
    ///
    /// Must exceed `confirmation.deadline_secs`, otherwise the HTTP layer
    /// cuts confirmations off before the coordinator reports.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { request_secs: 120 }
    }
}

/// Chain confirmation settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ConfirmationConfig {
    /// Number of confirmations a receipt needs before it is accepted.
    pub confirmations: u32,

    /// Per-call receipt wait in seconds (one retry attempt).
    pub rpc_timeout_secs: u64,

    /// Overall deadline for the chain confirmation step in seconds, the
    /// fallback transaction lookup included.
    ///
    /// This caps the retry policy rather than fitting it. Against a node that
    /// answers at once, the default 5 attempts need 3+6+12+24 = 45 s of
    /// backoff and fit easily. Against a node that waits the full
    /// `rpc_timeout_secs` on every attempt, they would need about 195 s, so
    /// the 90 s default stops after roughly 3 attempts and the client's
    /// ledger retries later. Raise this (and `timeouts.request_secs`) to run
    /// the whole policy on slow nodes.
    pub deadline_secs: u64,
}

impl Default for ConfirmationConfig {
    fn default() -> Self {
        Self {
            confirmations: 1,
            rpc_timeout_secs: 30,
            deadline_secs: 90,
        }
    }
}

/// Retry configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum number of attempts (including the first one).
    pub max_attempts: u32,

    /// Base delay for exponential backoff in milliseconds.
    pub base_delay_ms: u64,

    /// Maximum delay for exponential backoff in milliseconds.
    pub max_delay_ms: u64,

    /// Random jitter added on top of each delay, as a fraction of it.
    pub jitter_ratio: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_ms: 3_000,
            max_delay_ms: 60_000,
            jitter_ratio: 0.0,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Entity store configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct StoreConfig {
    /// JSON snapshot file; the store is memory-only when unset.
    pub snapshot_path: Option<String>,
}

/// Pending-operation ledger configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Ledger file path.
    pub path: String,

    /// Records older than this are treated as abandoned.
    pub retention_secs: u64,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            path: "pending-operations.json".to_string(),
            retention_secs: 24 * 3600,
        }
    }
}

/// Client configuration for the CLI.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Base URL of the confirmation service.
    pub server_url: String,

    /// Wallet address presented to the service as the caller.
    pub wallet_address: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: "http://localhost:8080".to_string(),
            wallet_address: None,
        }
    }
}

/// A chain the service can confirm transactions on.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct NetworkConfig {
    /// Chain ID (e.g., 1 for Ethereum mainnet, 31337 for local Anvil).
    pub chain_id: u64,

    /// JSON-RPC endpoint URL.
    pub rpc_url: String,

    /// Failover JSON-RPC endpoint URLs.
    #[serde(default)]
    pub failover_urls: Vec<String>,

    /// Identity registry contract; logs from other emitters are ignored.
    #[serde(default)]
    pub registry_address: Option<String>,
}
