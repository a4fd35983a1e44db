//! Chain-specific types and error definitions.

use alloy::primitives::{Address, Bytes, TxHash, B256};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Chain ID type for strong typing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChainId(pub u64);

impl From<u64> for ChainId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl From<ChainId> for u64 {
    fn from(id: ChainId) -> Self {
        id.0
    }
}

impl std::fmt::Display for ChainId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Errors that can occur during blockchain reads.
#[derive(Debug, Error)]
pub enum BlockchainError {
    /// RPC connection or request failed.
    #[error("RPC error: {0}")]
    Rpc(String),

    /// Receipt did not appear (or did not reach the requested depth) in time.
    #[error("RPC timeout after {0} seconds")]
    Timeout(u64),

    /// The node does not know the transaction.
    #[error("Transaction {0} not found")]
    NotFound(TxHash),

    /// No network is configured for the chain.
    #[error("Chain {0} is not configured")]
    UnsupportedChain(ChainId),

    /// The network configuration could not be loaded.
    #[error("Network configuration error: {0}")]
    Configuration(String),
}

/// Result type for blockchain operations.
pub type BlockchainResult<T> = Result<T, BlockchainError>;

/// One event log emitted by a transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    /// Emitting contract.
    pub address: Address,
    /// Indexed topics; `topics[0]` is the event signature for non-anonymous events.
    pub topics: Vec<B256>,
    /// ABI-encoded non-indexed fields.
    pub data: Bytes,
}

impl From<&alloy::rpc::types::Log> for LogEntry {
    fn from(log: &alloy::rpc::types::Log) -> Self {
        Self {
            address: log.address(),
            topics: log.topics().to_vec(),
            data: log.data().data.clone(),
        }
    }
}

/// The parts of a mined transaction receipt the pipeline cares about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt {
    pub tx_hash: TxHash,
    pub block_number: Option<u64>,
    /// `false` when the transaction was mined but reverted.
    pub success: bool,
    pub logs: Vec<LogEntry>,
}

impl From<&alloy::rpc::types::TransactionReceipt> for Receipt {
    fn from(receipt: &alloy::rpc::types::TransactionReceipt) -> Self {
        Self {
            tx_hash: receipt.transaction_hash,
            block_number: receipt.block_number,
            success: receipt.status(),
            logs: receipt.inner.logs().iter().map(LogEntry::from).collect(),
        }
    }
}

/// A transaction known to the node, possibly still pending.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainTransaction {
    pub tx_hash: TxHash,
    /// `None` while the transaction sits in the mempool.
    pub block_number: Option<u64>,
}
