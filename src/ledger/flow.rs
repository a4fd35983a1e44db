//! Client-side "wait for receipt, then confirm" task.
//!
//! The pending record is written before any waiting starts. Whatever happens
//! to the task afterwards (dropped, crashed, errored), the ledger still knows
//! about the transaction and [`recover_pending`](super::recovery::recover_pending)
//! can drive it again.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::timeout;

use crate::blockchain::client::RpcReader;
use crate::blockchain::networks::NetworkRegistry;
use crate::blockchain::types::{BlockchainError, Receipt};
use crate::confirmation::coordinator::CoordinatorSettings;
use crate::confirmation::types::{ConfirmError, ConfirmOutcome, OperationType};
use crate::ledger::pending::{LedgerError, PendingLedger, PendingRecord};
use crate::ledger::transport::ConfirmTransport;
use crate::logs::LogInterpreter;
use crate::resilience::retry;

/// Observable state of a confirmation task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "message", rename_all = "snake_case")]
pub enum TaskStatus {
    Idle,
    Processing,
    Success,
    Error(String),
}

/// What happened to the ledger record once a run settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordAction {
    Cleared,
    Retained,
}

impl RecordAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordAction::Cleared => "cleared",
            RecordAction::Retained => "retained",
        }
    }
}

/// Handle on a spawned confirmation task.
#[derive(Debug)]
pub struct ConfirmationTask {
    pub operation: OperationType,
    status: watch::Receiver<TaskStatus>,
    handle: JoinHandle<Result<ConfirmOutcome, ConfirmError>>,
}

impl ConfirmationTask {
    pub fn status(&self) -> TaskStatus {
        self.status.borrow().clone()
    }

    /// A receiver that sees every later status change.
    pub fn subscribe(&self) -> watch::Receiver<TaskStatus> {
        self.status.clone()
    }

    /// Abandon the task. The pending record stays for a later resume.
    pub fn abort(&self) {
        self.handle.abort();
    }

    pub async fn join(self) -> Result<ConfirmOutcome, ConfirmError> {
        match self.handle.await {
            Ok(result) => result,
            Err(e) => Err(ConfirmError::Internal(format!("confirmation task: {}", e))),
        }
    }
}

/// Drives pending records to a server confirmation.
pub struct ConfirmationFlow {
    ledger: Arc<PendingLedger>,
    transport: Arc<dyn ConfirmTransport>,
    chain: Option<LocalChain>,
    settings: CoordinatorSettings,
}

/// The client's own view of the chain.
struct LocalChain {
    reader: Arc<dyn RpcReader>,
    networks: Arc<NetworkRegistry>,
}

impl ConfirmationFlow {
    /// Without a reader the flow skips the local receipt wait and lets the
    /// server wait instead.
    pub fn new(
        ledger: Arc<PendingLedger>,
        transport: Arc<dyn ConfirmTransport>,
        settings: CoordinatorSettings,
    ) -> Self {
        Self {
            ledger,
            transport,
            chain: None,
            settings,
        }
    }

    /// Wait for the receipt locally before calling the server. `networks`
    /// supplies the registry address the receipt's logs are filtered by.
    pub fn with_reader(mut self, reader: Arc<dyn RpcReader>, networks: Arc<NetworkRegistry>) -> Self {
        self.chain = Some(LocalChain { reader, networks });
        self
    }

    pub fn ledger(&self) -> &Arc<PendingLedger> {
        &self.ledger
    }

    /// Record a freshly broadcast transaction, then confirm it in the
    /// background.
    pub fn submitted(self: &Arc<Self>, record: PendingRecord) -> Result<ConfirmationTask, LedgerError> {
        self.ledger.set_pending(record.clone())?;
        tracing::info!(
            operation = %record.operation,
            entity = %record.entity_id,
            tx_hash = %record.tx_hash,
            "Pending operation recorded"
        );

        let (tx, rx) = watch::channel(TaskStatus::Idle);
        let operation = record.operation;
        let flow = Arc::clone(self);
        let handle = tokio::spawn(async move { flow.run(record, &tx).await.0 });

        Ok(ConfirmationTask {
            operation,
            status: rx,
            handle,
        })
    }

    /// Drive one record to completion in the current task and settle the
    /// ledger.
    pub async fn resume(&self, record: PendingRecord) -> (Result<ConfirmOutcome, ConfirmError>, RecordAction) {
        let (tx, _rx) = watch::channel(TaskStatus::Idle);
        self.run(record, &tx).await
    }

    async fn run(
        &self,
        record: PendingRecord,
        status: &watch::Sender<TaskStatus>,
    ) -> (Result<ConfirmOutcome, ConfirmError>, RecordAction) {
        status.send_replace(TaskStatus::Processing);
        let result = self.drive(record.clone()).await;
        let action = self.settle(&record, &result);

        status.send_replace(match &result {
            Ok(_) => TaskStatus::Success,
            Err(e) => TaskStatus::Error(e.user_message()),
        });
        (result, action)
    }

    async fn drive(&self, mut record: PendingRecord) -> Result<ConfirmOutcome, ConfirmError> {
        if let Some(chain) = &self.chain {
            let receipt = self.wait_for_receipt(chain.reader.as_ref(), &record).await?;
            if !receipt.success {
                return Err(ConfirmError::TransactionFailed(record.tx_hash));
            }

            // Only a publish mints an id; follow-ups reuse the published one
            // on the server.
            if record.operation == OperationType::Publish && record.claimed_result_id.is_none() {
                let network = chain.networks.get(record.chain_id)?;
                let interpreter = LogInterpreter::new(network.registry_address);
                if let Some(found) = interpreter.interpret(&receipt.logs) {
                    tracing::debug!(
                        operation = %record.operation,
                        result_id = found.id,
                        strategy = found.strategy.as_str(),
                        "Identifier read from receipt"
                    );
                    record.claimed_result_id = Some(found.id);
                    // Still ours to update; a newer submission wins otherwise.
                    if self.ledger.get_pending(record.operation).ok().flatten().map(|r| r.tx_hash)
                        == Some(record.tx_hash)
                    {
                        if let Err(e) = self.ledger.set_pending(record.clone()) {
                            tracing::warn!(error = %e, "Failed to store claimed identifier");
                        }
                    }
                }
            }
        }

        self.transport.confirm(&record.to_request()).await
    }

    async fn wait_for_receipt(
        &self,
        reader: &dyn RpcReader,
        record: &PendingRecord,
    ) -> Result<Receipt, ConfirmError> {
        let settings = &self.settings;
        let attempts = retry(&settings.retry, |_| {
            reader.get_receipt(
                record.tx_hash,
                record.chain_id,
                settings.confirmations,
                settings.rpc_timeout,
            )
        });

        match timeout(settings.deadline, attempts).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(BlockchainError::Timeout(settings.deadline.as_secs()).into()),
        }
    }

    /// Success, replay and conflict are final; everything else waits for the
    /// next resume.
    fn settle(&self, record: &PendingRecord, result: &Result<ConfirmOutcome, ConfirmError>) -> RecordAction {
        let terminal = matches!(result, Ok(_) | Err(ConfirmError::Conflict { .. }));
        if !terminal {
            if let Err(e) = result {
                tracing::warn!(
                    operation = %record.operation,
                    tx_hash = %record.tx_hash,
                    kind = e.kind(),
                    retryable = e.is_retryable(),
                    "Confirmation not completed, keeping pending record"
                );
            }
            return RecordAction::Retained;
        }

        match self.ledger.clear_if_matches(record.operation, record.tx_hash) {
            Ok(_) => {
                if let Err(ConfirmError::Conflict { existing }) = result {
                    tracing::warn!(
                        operation = %record.operation,
                        tx_hash = %record.tx_hash,
                        confirmed = %existing,
                        "Operation already confirmed with another transaction"
                    );
                }
                RecordAction::Cleared
            }
            Err(e) => {
                tracing::error!(operation = %record.operation, error = %e, "Failed to clear pending record");
                RecordAction::Retained
            }
        }
    }
}

impl std::fmt::Debug for ConfirmationFlow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfirmationFlow")
            .field("ledger", &self.ledger)
            .field("waits_for_receipt", &self.chain.is_some())
            .field("settings", &self.settings)
            .finish()
    }
}
