//! Server-side confirmation state machine.
//!
//! # Flow
//! ```text
//! ConfirmRequest + caller
//!     → authorize (caller owns entity)
//!     → idempotency check (same hash: replay, other hash: conflict)
//!     → receipt via retry(RpcReader::get_receipt)
//!         ├─ reverted        → TransactionFailed
//!         ├─ unavailable     → client id + tx exists? accept : ServiceUnavailable
//!         └─ success         → LogInterpreter → published id → client id
//!     → commit_if_unconfirmed (lost race: replay or conflict)
//! ```
//!
//! One deadline bounds the chain step. When the client supplied an id, part
//! of it (at most `rpc_timeout`) is held back for the transaction lookup so
//! the fallback still fits inside the deadline.
//!
//! No lock is held across the chain read. Two concurrent requests for the
//! same pair can both pass the idempotency check; the store's conditional
//! commit decides which one wins.

use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use alloy::primitives::Address;
use tokio::time::{timeout, timeout_at};

use crate::blockchain::client::RpcReader;
use crate::blockchain::networks::NetworkRegistry;
use crate::blockchain::types::{BlockchainError, BlockchainResult, Receipt};
use crate::config::schema::ServiceConfig;
use crate::confirmation::store::{AgentRecord, CommitResult, EntityStore, StoreError};
use crate::confirmation::types::{
    ConfirmError, ConfirmOutcome, ConfirmRequest, ConfirmStatus, ConfirmationRecord,
    ConfirmationState, EntityId, OperationType, ResultSource,
};
use crate::logs::LogInterpreter;
use crate::observability::metrics;
use crate::resilience::{retry, RetryPolicy};

/// Tunables for the chain confirmation step.
#[derive(Debug, Clone, PartialEq)]
pub struct CoordinatorSettings {
    /// Confirmation depth requested from the reader.
    pub confirmations: u32,
    /// Wait per receipt attempt.
    pub rpc_timeout: Duration,
    /// Bound on the whole chain step, fallback lookup included.
    pub deadline: Duration,
    pub retry: RetryPolicy,
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        Self::from(&ServiceConfig::default())
    }
}

impl From<&ServiceConfig> for CoordinatorSettings {
    fn from(config: &ServiceConfig) -> Self {
        Self {
            confirmations: config.confirmation.confirmations,
            rpc_timeout: Duration::from_secs(config.confirmation.rpc_timeout_secs),
            deadline: Duration::from_secs(config.confirmation.deadline_secs),
            retry: RetryPolicy::from(&config.retries),
        }
    }
}

/// Decides whether a claimed transaction confirms an operation.
pub struct ConfirmationCoordinator {
    store: Arc<dyn EntityStore>,
    reader: Arc<dyn RpcReader>,
    networks: Arc<NetworkRegistry>,
    settings: CoordinatorSettings,
}

impl ConfirmationCoordinator {
    pub fn new(
        store: Arc<dyn EntityStore>,
        reader: Arc<dyn RpcReader>,
        networks: Arc<NetworkRegistry>,
        settings: CoordinatorSettings,
    ) -> Self {
        Self {
            store,
            reader,
            networks,
            settings,
        }
    }

    /// Confirm `request` on behalf of `caller` (the authenticated wallet).
    pub async fn confirm(
        &self,
        caller: Option<Address>,
        request: &ConfirmRequest,
    ) -> Result<ConfirmOutcome, ConfirmError> {
        let start = Instant::now();
        let result = self.run(caller, request).await;

        let outcome = match &result {
            Ok(outcome) => outcome.status.as_str(),
            Err(e) => e.kind(),
        };
        metrics::record_confirmation(request.operation.as_str(), outcome, start);

        match &result {
            Err(ConfirmError::Internal(msg)) => tracing::error!(
                entity = %request.entity_id,
                operation = %request.operation,
                tx_hash = %request.tx_hash,
                error = %msg,
                "Confirmation failed internally"
            ),
            Err(e) => tracing::info!(
                entity = %request.entity_id,
                operation = %request.operation,
                tx_hash = %request.tx_hash,
                kind = e.kind(),
                error = %e,
                "Confirmation refused"
            ),
            Ok(_) => {}
        }
        result
    }

    /// Current state of one (entity, operation) pair.
    pub async fn state(
        &self,
        entity_id: &EntityId,
        operation: OperationType,
    ) -> Result<ConfirmationState, ConfirmError> {
        let entity = self
            .store
            .get_entity(entity_id)
            .await
            .map_err(internal)?
            .ok_or_else(|| ConfirmError::NotFound(entity_id.clone()))?;
        Ok(entity.state(operation))
    }

    async fn run(
        &self,
        caller: Option<Address>,
        request: &ConfirmRequest,
    ) -> Result<ConfirmOutcome, ConfirmError> {
        let caller = caller.ok_or(ConfirmError::Unauthorized)?;

        let entity = match self.store.get_entity(&request.entity_id).await.map_err(internal)? {
            Some(entity) if entity.owner == caller => entity,
            // Someone else's entity is reported exactly like a missing one.
            _ => return Err(ConfirmError::NotFound(request.entity_id.clone())),
        };

        if let Some(existing) = entity.confirmation(request.operation) {
            return replay_or_conflict(request, existing);
        }

        let network = self.networks.get(request.chain_id)?;
        let interpreter = LogInterpreter::new(network.registry_address);

        let deadline = tokio::time::Instant::now() + self.settings.deadline;
        let (result_id, source) = match self.fetch_receipt(request, deadline).await {
            Ok(receipt) if !receipt.success => {
                return Err(ConfirmError::TransactionFailed(request.tx_hash));
            }
            Ok(receipt) => resolve_identifier(&entity, request, &interpreter, &receipt)?,
            Err(e) => self.verify_client_claim(request, e, deadline).await?,
        };

        let record = ConfirmationRecord {
            tx_hash: request.tx_hash,
            chain_id: request.chain_id,
            result_id,
            confirmed_at: now_secs(),
            source,
        };

        match self
            .store
            .commit_if_unconfirmed(&request.entity_id, request.operation, record.clone())
            .await
            .map_err(internal)?
        {
            CommitResult::Committed => {
                tracing::info!(
                    entity = %request.entity_id,
                    operation = %request.operation,
                    tx_hash = %record.tx_hash,
                    result_id = record.result_id,
                    source = ?record.source,
                    "Operation confirmed"
                );
                Ok(ConfirmOutcome::from_record(ConfirmStatus::Success, &record))
            }
            CommitResult::AlreadyConfirmed(existing) => {
                tracing::info!(
                    entity = %request.entity_id,
                    operation = %request.operation,
                    "Concurrent confirmation committed first"
                );
                replay_or_conflict(request, &existing)
            }
        }
    }

    async fn fetch_receipt(
        &self,
        request: &ConfirmRequest,
        deadline: tokio::time::Instant,
    ) -> BlockchainResult<Receipt> {
        let settings = &self.settings;
        let reserve = if request.client_result_id.is_some() {
            settings.rpc_timeout.min(settings.deadline / 2)
        } else {
            Duration::ZERO
        };
        let receipt_budget = settings.deadline - reserve;

        let attempts = retry(&settings.retry, |_| {
            self.reader.get_receipt(
                request.tx_hash,
                request.chain_id,
                settings.confirmations,
                settings.rpc_timeout,
            )
        });

        match timeout_at(deadline - reserve, attempts).await {
            Ok(result) => result,
            Err(_) => Err(BlockchainError::Timeout(receipt_budget.as_secs())),
        }
    }

    /// Receipt unavailable: accept the client's id only if the node at least
    /// knows the transaction. The lookup never runs past `deadline`.
    async fn verify_client_claim(
        &self,
        request: &ConfirmRequest,
        receipt_error: BlockchainError,
        deadline: tokio::time::Instant,
    ) -> Result<(u64, ResultSource), ConfirmError> {
        let Some(claimed) = request.client_result_id else {
            return Err(ConfirmError::ServiceUnavailable(receipt_error.to_string()));
        };

        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        if remaining.is_zero() {
            return Err(ConfirmError::ServiceUnavailable(format!(
                "{}; no time left for transaction lookup",
                receipt_error
            )));
        }

        let lookup = timeout(
            self.settings.rpc_timeout.min(remaining),
            self.reader.get_transaction(request.tx_hash, request.chain_id),
        )
        .await;

        match lookup {
            Ok(Ok(tx)) => {
                tracing::warn!(
                    entity = %request.entity_id,
                    operation = %request.operation,
                    tx_hash = %request.tx_hash,
                    block_number = ?tx.block_number,
                    result_id = claimed,
                    receipt_error = %receipt_error,
                    "Accepting client-supplied identifier without receipt"
                );
                metrics::record_fallback_acceptance(request.operation.as_str());
                Ok((claimed, ResultSource::ClientSupplied))
            }
            Ok(Err(e)) => Err(ConfirmError::ServiceUnavailable(format!(
                "{}; transaction lookup: {}",
                receipt_error, e
            ))),
            Err(_) => Err(ConfirmError::ServiceUnavailable(format!(
                "{}; transaction lookup timed out",
                receipt_error
            ))),
        }
    }
}

impl std::fmt::Debug for ConfirmationCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfirmationCoordinator")
            .field("settings", &self.settings)
            .finish()
    }
}

fn replay_or_conflict(
    request: &ConfirmRequest,
    existing: &ConfirmationRecord,
) -> Result<ConfirmOutcome, ConfirmError> {
    if existing.tx_hash == request.tx_hash {
        tracing::debug!(
            entity = %request.entity_id,
            operation = %request.operation,
            "Idempotent replay"
        );
        Ok(ConfirmOutcome::from_record(ConfirmStatus::Idempotent, existing))
    } else {
        Err(ConfirmError::Conflict {
            existing: existing.tx_hash,
        })
    }
}

/// Logs first, then what the server already knows, then the client's word.
fn resolve_identifier(
    entity: &AgentRecord,
    request: &ConfirmRequest,
    interpreter: &LogInterpreter,
    receipt: &Receipt,
) -> Result<(u64, ResultSource), ConfirmError> {
    if let Some(found) = interpreter.interpret(&receipt.logs) {
        if let Some(claimed) = request.client_result_id.filter(|claimed| *claimed != found.id) {
            tracing::warn!(
                entity = %request.entity_id,
                tx_hash = %request.tx_hash,
                claimed,
                decoded = found.id,
                "Client-supplied identifier disagrees with logs, using logs"
            );
        }
        return Ok((found.id, ResultSource::Logs));
    }

    if request.operation != OperationType::Publish {
        if let Some(published) = entity.confirmation(OperationType::Publish) {
            return Ok((published.result_id, ResultSource::PublishedRecord));
        }
    }

    if let Some(claimed) = request.client_result_id {
        tracing::warn!(
            entity = %request.entity_id,
            operation = %request.operation,
            tx_hash = %request.tx_hash,
            result_id = claimed,
            "No identifier in logs, accepting client-supplied identifier"
        );
        metrics::record_fallback_acceptance(request.operation.as_str());
        return Ok((claimed, ResultSource::ClientSupplied));
    }

    Err(ConfirmError::IdentifierNotFound(request.tx_hash))
}

fn internal(err: StoreError) -> ConfirmError {
    ConfirmError::Internal(err.to_string())
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
