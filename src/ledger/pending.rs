//! Durable record of submitted-but-unconfirmed transactions.
//!
//! A small JSON key-value file keyed by operation type:
//!
//! ```json
//! { "version": 1, "records": { "publish": { "txHash": "0x..", ... } } }
//! ```
//!
//! Every mutation rewrites the file (temp file + rename) before returning,
//! so a record set here survives the process dying on the next line.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use alloy::primitives::TxHash;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::blockchain::types::ChainId;
use crate::confirmation::types::{ConfirmRequest, EntityId, OperationType};

/// Current on-disk schema version.
pub const SCHEMA_VERSION: u32 = 1;

/// Default retention: attempts older than a day are presumed abandoned.
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(24 * 3600);

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("ledger I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("ledger format error: {0}")]
    Format(#[from] serde_json::Error),

    #[error("unsupported ledger schema version {0}")]
    UnsupportedVersion(u32),
}

/// A transaction the wallet broadcast that the server has not confirmed yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingRecord {
    pub operation: OperationType,
    pub tx_hash: TxHash,
    pub chain_id: ChainId,
    pub entity_id: EntityId,
    /// Unix seconds.
    pub created_at: u64,
    /// Identifier the client expects the transaction to produce.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claimed_result_id: Option<u64>,
}

impl PendingRecord {
    /// A record stamped with the current time.
    pub fn new(
        operation: OperationType,
        entity_id: EntityId,
        tx_hash: TxHash,
        chain_id: ChainId,
    ) -> Self {
        Self {
            operation,
            tx_hash,
            chain_id,
            entity_id,
            created_at: now_secs(),
            claimed_result_id: None,
        }
    }

    pub fn with_claimed_result_id(mut self, result_id: Option<u64>) -> Self {
        self.claimed_result_id = result_id;
        self
    }

    /// Whether the record is older than `retention` at `now` (unix seconds).
    pub fn is_expired(&self, now: u64, retention: Duration) -> bool {
        now.saturating_sub(self.created_at) > retention.as_secs()
    }

    /// The confirmation request this record stands for.
    pub fn to_request(&self) -> ConfirmRequest {
        ConfirmRequest {
            entity_id: self.entity_id.clone(),
            operation: self.operation,
            tx_hash: self.tx_hash,
            chain_id: self.chain_id,
            client_result_id: self.claimed_result_id,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct LedgerFile {
    version: u32,
    #[serde(default)]
    records: BTreeMap<OperationType, PendingRecord>,
}

/// File-backed pending-operation ledger. One record per operation type.
#[derive(Debug)]
pub struct PendingLedger {
    path: PathBuf,
    retention: Duration,
    records: Mutex<BTreeMap<OperationType, PendingRecord>>,
}

impl PendingLedger {
    /// Open (or start) the ledger at `path`.
    pub fn open(path: impl AsRef<Path>, retention: Duration) -> Result<Self, LedgerError> {
        let path = path.as_ref().to_path_buf();
        let records = if path.exists() {
            let file: LedgerFile = serde_json::from_reader(BufReader::new(File::open(&path)?))?;
            if file.version != SCHEMA_VERSION {
                return Err(LedgerError::UnsupportedVersion(file.version));
            }
            file.records
        } else {
            BTreeMap::new()
        };

        tracing::debug!(path = ?path, records = records.len(), "Pending ledger opened");
        Ok(Self {
            path,
            retention,
            records: Mutex::new(records),
        })
    }

    pub fn retention(&self) -> Duration {
        self.retention
    }

    /// Store `record` under its operation type, replacing any earlier one.
    pub fn set_pending(&self, record: PendingRecord) -> Result<(), LedgerError> {
        let mut records = self.lock();
        if let Some(previous) = records.get(&record.operation) {
            if previous.tx_hash != record.tx_hash {
                tracing::warn!(
                    operation = %record.operation,
                    previous = %previous.tx_hash,
                    replacement = %record.tx_hash,
                    "Replacing pending transaction"
                );
            }
        }
        records.insert(record.operation, record);
        self.persist(&records)
    }

    /// The live record for `operation`; an expired one is purged.
    pub fn get_pending(&self, operation: OperationType) -> Result<Option<PendingRecord>, LedgerError> {
        let mut records = self.lock();
        let now = now_secs();
        match records.get(&operation) {
            Some(record) if record.is_expired(now, self.retention) => {
                tracing::info!(operation = %operation, tx_hash = %record.tx_hash, "Discarding expired pending record");
                records.remove(&operation);
                self.persist(&records)?;
                Ok(None)
            }
            Some(record) => Ok(Some(record.clone())),
            None => Ok(None),
        }
    }

    /// Every live record; expired ones are purged.
    pub fn get_all_pending(&self) -> Result<Vec<PendingRecord>, LedgerError> {
        let mut records = self.lock();
        let now = now_secs();
        let before = records.len();
        records.retain(|operation, record| {
            let keep = !record.is_expired(now, self.retention);
            if !keep {
                tracing::info!(operation = %operation, tx_hash = %record.tx_hash, "Discarding expired pending record");
            }
            keep
        });
        if records.len() != before {
            self.persist(&records)?;
        }
        Ok(records.values().cloned().collect())
    }

    pub fn clear_pending(&self, operation: OperationType) -> Result<(), LedgerError> {
        let mut records = self.lock();
        if records.remove(&operation).is_some() {
            self.persist(&records)?;
        }
        Ok(())
    }

    /// Clear `operation` only if it still tracks `tx_hash`, so a newer
    /// submission that overwrote the record is not lost. Returns whether a
    /// record was removed.
    pub fn clear_if_matches(&self, operation: OperationType, tx_hash: TxHash) -> Result<bool, LedgerError> {
        let mut records = self.lock();
        match records.get(&operation) {
            Some(record) if record.tx_hash == tx_hash => {
                records.remove(&operation);
                self.persist(&records)?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<OperationType, PendingRecord>> {
        self.records.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn persist(&self, records: &BTreeMap<OperationType, PendingRecord>) -> Result<(), LedgerError> {
        let file = LedgerFile {
            version: SCHEMA_VERSION,
            records: records.clone(),
        };
        let tmp = self.path.with_extension("json.tmp");
        {
            let mut writer = BufWriter::new(File::create(&tmp)?);
            serde_json::to_writer_pretty(&mut writer, &file)?;
            writer.flush()?;
            writer.get_ref().sync_all()?;
        }
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

pub(crate) fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOUR: u64 = 3600;

    fn record(operation: OperationType, byte: u8, age_secs: u64) -> PendingRecord {
        let mut record = PendingRecord::new(
            operation,
            EntityId::new("agent-1"),
            TxHash::repeat_byte(byte),
            ChainId(84532),
        );
        record.created_at -= age_secs;
        record
    }

    fn ledger(dir: &tempfile::TempDir) -> PendingLedger {
        PendingLedger::open(dir.path().join("pending.json"), DEFAULT_RETENTION).unwrap()
    }

    #[test]
    fn test_set_get_clear() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = ledger(&dir);
        assert!(ledger.get_pending(OperationType::Publish).unwrap().is_none());

        let rec = record(OperationType::Publish, 0xaa, 0);
        ledger.set_pending(rec.clone()).unwrap();
        assert_eq!(ledger.get_pending(OperationType::Publish).unwrap(), Some(rec));
        assert!(ledger.get_pending(OperationType::EnableReviews).unwrap().is_none());

        ledger.clear_pending(OperationType::Publish).unwrap();
        assert!(ledger.get_pending(OperationType::Publish).unwrap().is_none());
    }

    #[test]
    fn test_set_overwrites_same_operation() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = ledger(&dir);
        ledger.set_pending(record(OperationType::Publish, 0xaa, 0)).unwrap();
        ledger.set_pending(record(OperationType::Publish, 0xbb, 0)).unwrap();

        let all = ledger.get_all_pending().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].tx_hash, TxHash::repeat_byte(0xbb));
    }

    #[test]
    fn test_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let rec = record(OperationType::EnableReviews, 0xcc, 0).with_claimed_result_id(Some(42));
        ledger(&dir).set_pending(rec.clone()).unwrap();

        let reopened = ledger(&dir);
        assert_eq!(reopened.get_pending(OperationType::EnableReviews).unwrap(), Some(rec));
    }

    #[test]
    fn test_expiry_purges() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = ledger(&dir);
        ledger.set_pending(record(OperationType::Publish, 0xaa, 25 * HOUR)).unwrap();
        ledger.set_pending(record(OperationType::EnableReviews, 0xbb, HOUR)).unwrap();

        let live = ledger.get_all_pending().unwrap();
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].operation, OperationType::EnableReviews);

        // The purge reached the file.
        let reopened = PendingLedger::open(dir.path().join("pending.json"), DEFAULT_RETENTION).unwrap();
        assert!(reopened.get_pending(OperationType::Publish).unwrap().is_none());
    }

    #[test]
    fn test_get_pending_purges_expired() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = ledger(&dir);
        ledger.set_pending(record(OperationType::SubmitReview, 0xaa, 24 * HOUR + 1)).unwrap();
        assert!(ledger.get_pending(OperationType::SubmitReview).unwrap().is_none());
        assert!(ledger.get_all_pending().unwrap().is_empty());
    }

    #[test]
    fn test_clear_if_matches_keeps_newer_submission() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = ledger(&dir);
        ledger.set_pending(record(OperationType::Publish, 0xbb, 0)).unwrap();

        assert!(!ledger
            .clear_if_matches(OperationType::Publish, TxHash::repeat_byte(0xaa))
            .unwrap());
        assert!(ledger.get_pending(OperationType::Publish).unwrap().is_some());

        assert!(ledger
            .clear_if_matches(OperationType::Publish, TxHash::repeat_byte(0xbb))
            .unwrap());
        assert!(ledger.get_pending(OperationType::Publish).unwrap().is_none());
    }

    #[test]
    fn test_rejects_unknown_schema_version() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pending.json");
        fs::write(&path, r#"{"version": 99, "records": {}}"#).unwrap();
        let err = PendingLedger::open(&path, DEFAULT_RETENTION).unwrap_err();
        assert!(matches!(err, LedgerError::UnsupportedVersion(99)));
    }
}
