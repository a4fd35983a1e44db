//! Shared fixtures for the integration tests.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use alloy::primitives::{address, Address, Bytes, TxHash, B256, U256};
use alloy::sol_types::{SolEvent, SolValue};
use async_trait::async_trait;
use tokio::time::Instant;

use agent_confirm::blockchain::{
    BlockchainError, BlockchainResult, ChainId, ChainTransaction, LogEntry, NetworkRegistry,
    Receipt, RpcReader,
};
use agent_confirm::config::NetworkConfig;
use agent_confirm::confirmation::{
    ConfirmationCoordinator, CoordinatorSettings, EntityId, MemoryEntityStore,
};
use agent_confirm::logs::events::{Registered, Transfer};
use agent_confirm::resilience::RetryPolicy;

pub const REGISTRY: Address = address!("8004a169fb4a3325136eb29fa0ceb6d2e539a432");
pub const OWNER: Address = address!("f39fd6e51aad88f6f4ce6ab8827279cfffb92266");
pub const STRANGER: Address = address!("70997970c51812dc3a010c7d01b50e0d17dc79c8");
pub const FOREIGN_CONTRACT: Address = address!("7777777777777777777777777777777777777777");
pub const CHAIN: ChainId = ChainId(84532);

pub fn tx(byte: u8) -> TxHash {
    TxHash::repeat_byte(byte)
}

pub fn entity(id: &str) -> EntityId {
    EntityId::new(id)
}

// ---------------------------------------------------------------------------
// Log builders
// ---------------------------------------------------------------------------

fn id_topic(id: u64) -> B256 {
    B256::from(U256::from(id))
}

/// A well-formed `Registered(agentId, tokenURI, owner)` log.
pub fn registered_log(id: u64) -> LogEntry {
    LogEntry {
        address: REGISTRY,
        topics: vec![Registered::SIGNATURE_HASH, id_topic(id), OWNER.into_word()],
        data: Bytes::from(("ipfs://agent-card".to_string(),).abi_encode_params()),
    }
}

/// An ERC-721 mint of `id` to the owner.
pub fn mint_log(id: u64) -> LogEntry {
    LogEntry {
        address: REGISTRY,
        topics: vec![
            Transfer::SIGNATURE_HASH,
            Address::ZERO.into_word(),
            OWNER.into_word(),
            id_topic(id),
        ],
        data: Bytes::new(),
    }
}

/// The same mint, emitted by a contract that is not the registry.
pub fn foreign_mint_log(id: u64) -> LogEntry {
    LogEntry {
        address: FOREIGN_CONTRACT,
        ..mint_log(id)
    }
}

/// A `Registered` log the ABI decoder rejects but whose id topic is intact.
pub fn raw_registered_log(topic: B256) -> LogEntry {
    LogEntry {
        address: REGISTRY,
        topics: vec![Registered::SIGNATURE_HASH, topic],
        data: Bytes::new(),
    }
}

pub fn raw_registered_id(id: u64) -> LogEntry {
    raw_registered_log(id_topic(id))
}

/// A log no strategy understands.
pub fn unrelated_log() -> LogEntry {
    LogEntry {
        address: REGISTRY,
        topics: vec![B256::repeat_byte(0x11), id_topic(7)],
        data: Bytes::new(),
    }
}

pub fn receipt(tx_hash: TxHash, logs: Vec<LogEntry>) -> Receipt {
    Receipt {
        tx_hash,
        block_number: Some(100),
        success: true,
        logs,
    }
}

pub fn reverted(tx_hash: TxHash) -> Receipt {
    Receipt {
        tx_hash,
        block_number: Some(100),
        success: false,
        logs: Vec::new(),
    }
}

// ---------------------------------------------------------------------------
// Scripted RPC reader
// ---------------------------------------------------------------------------

/// What the mock answers to one `get_receipt` call.
#[derive(Debug, Clone)]
pub enum ReceiptStep {
    Ready(Receipt),
    /// Transport failure.
    Unavailable,
    /// Never answers; the caller's deadline has to fire.
    Hang,
}

/// `RpcReader` that replays a script. The last step repeats forever.
pub struct MockReader {
    steps: Mutex<VecDeque<ReceiptStep>>,
    transaction: Option<ChainTransaction>,
    transaction_hangs: bool,
    receipt_calls: Mutex<Vec<(TxHash, Instant)>>,
    transaction_calls: Mutex<Vec<TxHash>>,
}

impl MockReader {
    pub fn new(steps: Vec<ReceiptStep>) -> Self {
        Self {
            steps: Mutex::new(steps.into()),
            transaction: None,
            transaction_hangs: false,
            receipt_calls: Mutex::new(Vec::new()),
            transaction_calls: Mutex::new(Vec::new()),
        }
    }

    pub fn ready(receipt: Receipt) -> Self {
        Self::new(vec![ReceiptStep::Ready(receipt)])
    }

    /// Fail `failures` times, then return `receipt`.
    pub fn flaky(failures: usize, receipt: Receipt) -> Self {
        let mut steps = vec![ReceiptStep::Unavailable; failures];
        steps.push(ReceiptStep::Ready(receipt));
        Self::new(steps)
    }

    /// Make `get_transaction` find the transaction.
    pub fn with_transaction(mut self, tx_hash: TxHash) -> Self {
        self.transaction = Some(ChainTransaction {
            tx_hash,
            block_number: None,
        });
        self
    }

    /// Make `get_transaction` never answer.
    pub fn with_hanging_transaction(mut self) -> Self {
        self.transaction_hangs = true;
        self
    }

    pub fn receipt_calls(&self) -> usize {
        self.receipt_calls.lock().unwrap().len()
    }

    pub fn receipt_hashes(&self) -> Vec<TxHash> {
        self.receipt_calls.lock().unwrap().iter().map(|(h, _)| *h).collect()
    }

    pub fn call_times(&self) -> Vec<Instant> {
        self.receipt_calls.lock().unwrap().iter().map(|(_, t)| *t).collect()
    }

    pub fn transaction_calls(&self) -> usize {
        self.transaction_calls.lock().unwrap().len()
    }

    fn next_step(&self) -> ReceiptStep {
        let mut steps = self.steps.lock().unwrap();
        if steps.len() > 1 {
            steps.pop_front().unwrap()
        } else {
            steps.front().cloned().unwrap_or(ReceiptStep::Unavailable)
        }
    }
}

#[async_trait]
impl RpcReader for MockReader {
    async fn get_receipt(
        &self,
        tx_hash: TxHash,
        _chain_id: ChainId,
        _confirmations: u32,
        _wait: Duration,
    ) -> BlockchainResult<Receipt> {
        self.receipt_calls.lock().unwrap().push((tx_hash, Instant::now()));
        match self.next_step() {
            ReceiptStep::Ready(receipt) => Ok(receipt),
            ReceiptStep::Unavailable => Err(BlockchainError::Rpc("connection refused".into())),
            ReceiptStep::Hang => std::future::pending().await,
        }
    }

    async fn get_transaction(
        &self,
        tx_hash: TxHash,
        _chain_id: ChainId,
    ) -> BlockchainResult<ChainTransaction> {
        self.transaction_calls.lock().unwrap().push(tx_hash);
        if self.transaction_hangs {
            return std::future::pending().await;
        }
        self.transaction
            .clone()
            .filter(|tx| tx.tx_hash == tx_hash)
            .ok_or(BlockchainError::NotFound(tx_hash))
    }
}

// ---------------------------------------------------------------------------
// Service fixtures
// ---------------------------------------------------------------------------

pub fn networks() -> Arc<NetworkRegistry> {
    Arc::new(NetworkRegistry::from_configs(vec![NetworkConfig {
        chain_id: CHAIN.0,
        rpc_url: "http://127.0.0.1:8545".to_string(),
        failover_urls: vec![],
        registry_address: Some(REGISTRY.to_string()),
    }]))
}

/// Defaults with short, exact delays for tests that run in real time.
pub fn fast_settings() -> CoordinatorSettings {
    CoordinatorSettings {
        confirmations: 1,
        rpc_timeout: Duration::from_secs(1),
        deadline: Duration::from_secs(5),
        retry: RetryPolicy::new(3, Duration::from_millis(10)),
    }
}

/// A store holding `ids`, all owned by [`OWNER`].
pub fn store_with(ids: &[&str]) -> MemoryEntityStore {
    let store = MemoryEntityStore::new(None);
    for id in ids {
        store.insert_entity(entity(id), OWNER);
    }
    store
}

pub fn coordinator(
    store: &MemoryEntityStore,
    reader: Arc<MockReader>,
    settings: CoordinatorSettings,
) -> Arc<ConfirmationCoordinator> {
    Arc::new(ConfirmationCoordinator::new(
        Arc::new(store.clone()),
        reader,
        networks(),
        settings,
    ))
}
