//! Receipt log → registry identifier.
//!
//! Contract versions and client libraries do not all emit the same log
//! shapes, so extraction runs an ordered list of strategies. Each strategy
//! scans every log before the next one starts, and a decode failure only
//! skips that log for that strategy.

use alloy::primitives::{Address, B256, U256};
use alloy::sol_types::SolEvent;
use thiserror::Error;

use crate::blockchain::types::LogEntry;
use crate::logs::events::{Registered, Transfer, REGISTERED_ID_TOPIC, TRANSFER_ID_TOPIC};

/// Raw topic reads must land strictly between 0 and this bound.
pub const MAX_RAW_ID: u64 = 1_000_000_000;

/// One way of reading an identifier out of a log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// ABI-decode the registry's `Registered` event.
    RegisteredEvent,
    /// ABI-decode an ERC-721 `Transfer` from the zero address.
    MintTransfer,
    /// Read a fixed topic of a log whose signature matches either event.
    RawTopics,
}

impl Strategy {
    /// Strategies in the order they are tried.
    pub const ORDER: [Strategy; 3] = [
        Strategy::RegisteredEvent,
        Strategy::MintTransfer,
        Strategy::RawTopics,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Strategy::RegisteredEvent => "registered_event",
            Strategy::MintTransfer => "mint_transfer",
            Strategy::RawTopics => "raw_topics",
        }
    }

    fn extract(self, log: &LogEntry) -> Result<Option<u64>, DecodeError> {
        match self {
            Strategy::RegisteredEvent => decode_registered(log),
            Strategy::MintTransfer => decode_mint(log),
            Strategy::RawTopics => decode_raw_topics(log),
        }
    }
}

/// Why a strategy could not use a log.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("ABI decode failed: {0}")]
    Abi(String),

    #[error("identifier {0} does not fit in 64 bits")]
    Overflow(U256),

    #[error("identifier {0} outside (0, {max})", max = MAX_RAW_ID)]
    OutOfBounds(U256),
}

/// An identifier and the strategy that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interpretation {
    pub id: u64,
    pub strategy: Strategy,
}

/// Extracts the registry identifier from a receipt's logs.
#[derive(Debug, Clone, Default)]
pub struct LogInterpreter {
    registry: Option<Address>,
}

impl LogInterpreter {
    /// `registry`: when set, logs from any other emitter are ignored.
    pub fn new(registry: Option<Address>) -> Self {
        Self { registry }
    }

    /// First identifier found by the first strategy that finds one.
    pub fn interpret(&self, logs: &[LogEntry]) -> Option<Interpretation> {
        let candidates: Vec<&LogEntry> = logs
            .iter()
            .filter(|log| self.registry.is_none_or(|registry| log.address == registry))
            .collect();

        for strategy in Strategy::ORDER {
            for (index, log) in candidates.iter().enumerate() {
                match strategy.extract(log) {
                    Ok(Some(id)) => {
                        tracing::debug!(strategy = strategy.as_str(), id, "Identifier extracted");
                        return Some(Interpretation { id, strategy });
                    }
                    Ok(None) => {}
                    Err(e) => {
                        tracing::debug!(
                            strategy = strategy.as_str(),
                            log_index = index,
                            error = %e,
                            "Strategy could not use log"
                        );
                    }
                }
            }
        }

        tracing::debug!(logs = logs.len(), considered = candidates.len(), "No identifier in logs");
        None
    }
}

fn signature(log: &LogEntry) -> Option<B256> {
    log.topics.first().copied()
}

fn to_u64(value: U256) -> Result<u64, DecodeError> {
    u64::try_from(value).map_err(|_| DecodeError::Overflow(value))
}

fn decode_registered(log: &LogEntry) -> Result<Option<u64>, DecodeError> {
    if signature(log) != Some(Registered::SIGNATURE_HASH) {
        return Ok(None);
    }
    let event = Registered::decode_raw_log(log.topics.iter().copied(), &log.data)
        .map_err(|e| DecodeError::Abi(e.to_string()))?;
    to_u64(event.agentId).map(Some)
}

fn decode_mint(log: &LogEntry) -> Result<Option<u64>, DecodeError> {
    if signature(log) != Some(Transfer::SIGNATURE_HASH) {
        return Ok(None);
    }
    let event = Transfer::decode_raw_log(log.topics.iter().copied(), &log.data)
        .map_err(|e| DecodeError::Abi(e.to_string()))?;
    if event.from != Address::ZERO {
        return Ok(None);
    }
    to_u64(event.tokenId).map(Some)
}

fn decode_raw_topics(log: &LogEntry) -> Result<Option<u64>, DecodeError> {
    let position = match signature(log) {
        Some(sig) if sig == Registered::SIGNATURE_HASH => REGISTERED_ID_TOPIC,
        Some(sig) if sig == Transfer::SIGNATURE_HASH => TRANSFER_ID_TOPIC,
        _ => return Ok(None),
    };
    let Some(topic) = log.topics.get(position) else {
        return Ok(None);
    };

    let value = U256::from_be_bytes(topic.0);
    if value.is_zero() || value >= U256::from(MAX_RAW_ID) {
        return Err(DecodeError::OutOfBounds(value));
    }
    to_u64(value).map(Some)
}
