//! Blockchain read subsystem.
//!
//! # Data Flow
//! ```text
//! chain id
//!     → networks.rs (lazy, invalidatable endpoint table)
//!     → client.rs (receipt / transaction reads with failover)
//!     → types.rs (Receipt, LogEntry handed to the log interpreter)
//! ```
//!
//! # Constraints
//! - Read-only: this service never signs or broadcasts
//! - All RPC calls have configurable timeouts
//! - Unknown chains are configuration errors, never retried

pub mod client;
pub mod networks;
pub mod types;

pub use client::{AlloyRpcReader, RpcReader};
pub use networks::{FileNetworks, Network, NetworkRegistry, NetworkSource, StaticNetworks};
pub use types::{BlockchainError, BlockchainResult, ChainId, ChainTransaction, LogEntry, Receipt};
