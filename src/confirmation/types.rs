//! Confirmation domain types.

use std::fmt;
use std::str::FromStr;

use alloy::primitives::TxHash;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::blockchain::types::{BlockchainError, ChainId};

/// The on-chain actions whose confirmation is tracked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationType {
    /// Register the agent's identity in the registry.
    Publish,
    /// Authorize a reviewer-signing delegate.
    EnableReviews,
    /// Submit a review on-chain.
    SubmitReview,
}

impl OperationType {
    pub const ALL: [OperationType; 3] = [
        OperationType::Publish,
        OperationType::EnableReviews,
        OperationType::SubmitReview,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            OperationType::Publish => "publish",
            OperationType::EnableReviews => "enable_reviews",
            OperationType::SubmitReview => "submit_review",
        }
    }
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("unknown operation '{0}' (expected publish, enable_reviews or submit_review)")]
pub struct ParseOperationError(String);

impl FromStr for OperationType {
    type Err = ParseOperationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OperationType::ALL
            .into_iter()
            .find(|op| op.as_str() == s)
            .ok_or_else(|| ParseOperationError(s.to_string()))
    }
}

/// Identifier of the owning entity (an agent listing).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(pub String);

impl EntityId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Where a confirmed result id came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultSource {
    /// Decoded from the receipt's logs.
    Logs,
    /// Reused from the entity's confirmed publish record.
    PublishedRecord,
    /// Supplied by the client; the transaction was only checked to exist.
    ClientSupplied,
}

/// A committed confirmation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmationRecord {
    pub tx_hash: TxHash,
    pub chain_id: ChainId,
    pub result_id: u64,
    /// Unix seconds.
    pub confirmed_at: u64,
    pub source: ResultSource,
}

/// Server-side state of one (entity, operation) pair.
///
/// `Unconfirmed → Confirmed` is the only transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ConfirmationState {
    Unconfirmed,
    Confirmed(ConfirmationRecord),
}

/// A client's claim that `tx_hash` performed `operation` for `entity_id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmRequest {
    pub entity_id: EntityId,
    pub operation: OperationType,
    pub tx_hash: TxHash,
    pub chain_id: ChainId,
    /// Identifier the client read from its own view of the receipt.
    pub client_result_id: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfirmStatus {
    /// This request committed the confirmation.
    Success,
    /// The same hash was already confirmed; nothing changed.
    Idempotent,
}

impl ConfirmStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ConfirmStatus::Success => "success",
            ConfirmStatus::Idempotent => "idempotent",
        }
    }
}

/// Successful answer to a [`ConfirmRequest`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmOutcome {
    pub status: ConfirmStatus,
    pub tx_hash: TxHash,
    pub chain_id: ChainId,
    pub result_id: u64,
}

impl ConfirmOutcome {
    pub fn from_record(status: ConfirmStatus, record: &ConfirmationRecord) -> Self {
        Self {
            status,
            tx_hash: record.tx_hash,
            chain_id: record.chain_id,
            result_id: record.result_id,
        }
    }
}

/// Why a confirmation was refused.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfirmError {
    #[error("caller is not authenticated")]
    Unauthorized,

    #[error("entity {0} not found")]
    NotFound(EntityId),

    #[error("already confirmed with transaction {existing}")]
    Conflict { existing: TxHash },

    #[error("transaction {0} failed on-chain")]
    TransactionFailed(TxHash),

    #[error("chain unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("no identifier found in transaction {0}")]
    IdentifierNotFound(TxHash),

    #[error("chain {0} is not supported")]
    UnsupportedChain(ChainId),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ConfirmError {
    /// Stable wire name.
    pub fn kind(&self) -> &'static str {
        match self {
            ConfirmError::Unauthorized => "unauthorized",
            ConfirmError::NotFound(_) => "not_found",
            ConfirmError::Conflict { .. } => "conflict",
            ConfirmError::TransactionFailed(_) => "transaction_failed",
            ConfirmError::ServiceUnavailable(_) => "service_unavailable",
            ConfirmError::IdentifierNotFound(_) => "identifier_not_found",
            ConfirmError::UnsupportedChain(_) => "unsupported_chain",
            ConfirmError::Internal(_) => "internal",
        }
    }

    /// Only a chain that has not caught up yet is worth asking again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ConfirmError::ServiceUnavailable(_))
    }

    /// Text for the client's status display.
    pub fn user_message(&self) -> String {
        match self {
            ConfirmError::Unauthorized => "Sign in with your wallet to continue.".to_string(),
            ConfirmError::NotFound(_) => "This agent was not found in your account.".to_string(),
            ConfirmError::Conflict { .. } => {
                "This action was already confirmed with a different transaction.".to_string()
            }
            ConfirmError::TransactionFailed(_) => {
                "The transaction failed on-chain. No changes were made.".to_string()
            }
            ConfirmError::ServiceUnavailable(_) => {
                "The network has not indexed your transaction yet. Try again shortly.".to_string()
            }
            ConfirmError::IdentifierNotFound(_) => {
                "The transaction did not contain the expected registry event.".to_string()
            }
            ConfirmError::UnsupportedChain(chain) => format!("Chain {} is not supported.", chain),
            ConfirmError::Internal(_) => "Something went wrong on our side.".to_string(),
        }
    }
}

impl From<BlockchainError> for ConfirmError {
    fn from(err: BlockchainError) -> Self {
        match err {
            BlockchainError::UnsupportedChain(chain) => ConfirmError::UnsupportedChain(chain),
            BlockchainError::Configuration(msg) => ConfirmError::Internal(msg),
            other => ConfirmError::ServiceUnavailable(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_names_round_trip() {
        for op in OperationType::ALL {
            assert_eq!(op.as_str().parse::<OperationType>().unwrap(), op);
            assert_eq!(serde_json::to_string(&op).unwrap(), format!("\"{}\"", op.as_str()));
        }
        assert!("delete".parse::<OperationType>().is_err());
    }

    #[test]
    fn test_state_wire_format() {
        let state = ConfirmationState::Confirmed(ConfirmationRecord {
            tx_hash: TxHash::repeat_byte(0xaa),
            chain_id: ChainId(8453),
            result_id: 42,
            confirmed_at: 1_700_000_000,
            source: ResultSource::Logs,
        });
        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["state"], "confirmed");
        assert_eq!(json["resultId"], 42);
        assert_eq!(json["chainId"], 8453);
        assert_eq!(json["source"], "logs");

        let json = serde_json::to_value(ConfirmationState::Unconfirmed).unwrap();
        assert_eq!(json["state"], "unconfirmed");
    }

    #[test]
    fn test_only_service_unavailable_is_retryable() {
        assert!(ConfirmError::ServiceUnavailable("x".into()).is_retryable());
        assert!(!ConfirmError::Conflict { existing: TxHash::ZERO }.is_retryable());
        assert!(!ConfirmError::IdentifierNotFound(TxHash::ZERO).is_retryable());
        assert!(!ConfirmError::Internal("db".into()).is_retryable());
    }

    #[test]
    fn test_blockchain_error_mapping() {
        assert_eq!(
            ConfirmError::from(BlockchainError::UnsupportedChain(ChainId(9))),
            ConfirmError::UnsupportedChain(ChainId(9))
        );
        assert!(ConfirmError::from(BlockchainError::Timeout(30)).is_retryable());
        assert_eq!(ConfirmError::from(BlockchainError::Configuration("x".into())).kind(), "internal");
    }
}
