//! Startup recovery over the pending ledger.

use futures_util::future::join_all;
use serde::Serialize;

use crate::confirmation::types::{ConfirmError, ConfirmOutcome};
use crate::ledger::flow::{ConfirmationFlow, RecordAction};
use crate::ledger::pending::{LedgerError, PendingRecord};
use crate::observability::metrics;

/// Result of resuming one pending record.
#[derive(Debug, Clone, Serialize)]
pub struct RecoveryReport {
    pub record: PendingRecord,
    #[serde(serialize_with = "serialize_result")]
    pub result: Result<ConfirmOutcome, ConfirmError>,
    pub action: RecordAction,
}

/// Re-drive every live pending record. Expired records are purged by the
/// ledger read and never resumed.
pub async fn recover_pending(flow: &ConfirmationFlow) -> Result<Vec<RecoveryReport>, LedgerError> {
    let records = flow.ledger().get_all_pending()?;
    if records.is_empty() {
        tracing::debug!("No pending operations to resume");
        return Ok(Vec::new());
    }
    tracing::info!(count = records.len(), "Resuming pending operations");

    let runs = records.into_iter().map(|record| async move {
        let (result, action) = flow.resume(record.clone()).await;
        metrics::record_ledger_action(action.as_str());
        tracing::info!(
            operation = %record.operation,
            tx_hash = %record.tx_hash,
            action = action.as_str(),
            outcome = match &result {
                Ok(outcome) => outcome.status.as_str(),
                Err(e) => e.kind(),
            },
            "Pending operation resumed"
        );
        RecoveryReport {
            record,
            result,
            action,
        }
    });

    Ok(join_all(runs).await)
}

fn serialize_result<S>(result: &Result<ConfirmOutcome, ConfirmError>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    use serde::ser::SerializeMap;

    let mut map = serializer.serialize_map(Some(2))?;
    match result {
        Ok(outcome) => {
            map.serialize_entry("status", outcome.status.as_str())?;
            map.serialize_entry("resultId", &outcome.result_id)?;
        }
        Err(e) => {
            map.serialize_entry("status", "error")?;
            map.serialize_entry("errorKind", e.kind())?;
        }
    }
    map.end()
}
