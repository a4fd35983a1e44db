//! Entity store: agent ownership and confirmation state.
//!
//! The store is an external collaborator; [`EntityStore`] is the seam. The
//! bundled [`MemoryEntityStore`] keeps records in a concurrent map and can
//! persist a JSON snapshot.
//!
//! # Commit guarantee
//! [`EntityStore::commit_if_unconfirmed`] is a compare-and-swap: it writes only
//! when the (entity, operation) pair is still unconfirmed and otherwise hands
//! back the record that won. A SQL implementation expresses the same thing as
//! `UPDATE ... WHERE confirmation_state = 'unconfirmed'`.

use std::collections::{BTreeMap, HashMap};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use alloy::primitives::Address;
use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::confirmation::types::{
    ConfirmationRecord, ConfirmationState, EntityId, OperationType,
};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("entity {0} not found")]
    EntityNotFound(EntityId),

    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("snapshot format error: {0}")]
    Format(#[from] serde_json::Error),
}

/// An agent as far as confirmation is concerned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentRecord {
    pub id: EntityId,
    /// Wallet allowed to confirm operations for this agent.
    pub owner: Address,
    #[serde(default)]
    pub confirmations: BTreeMap<OperationType, ConfirmationRecord>,
}

impl AgentRecord {
    pub fn new(id: EntityId, owner: Address) -> Self {
        Self {
            id,
            owner,
            confirmations: BTreeMap::new(),
        }
    }

    pub fn confirmation(&self, operation: OperationType) -> Option<&ConfirmationRecord> {
        self.confirmations.get(&operation)
    }

    pub fn state(&self, operation: OperationType) -> ConfirmationState {
        match self.confirmation(operation) {
            Some(record) => ConfirmationState::Confirmed(record.clone()),
            None => ConfirmationState::Unconfirmed,
        }
    }
}

/// Result of a conditional commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitResult {
    /// The record was written.
    Committed,
    /// Another confirmation got there first; nothing was written.
    AlreadyConfirmed(ConfirmationRecord),
}

#[async_trait]
pub trait EntityStore: Send + Sync {
    async fn get_entity(&self, id: &EntityId) -> Result<Option<AgentRecord>, StoreError>;

    /// Write `record` only if `operation` is still unconfirmed for `id`.
    async fn commit_if_unconfirmed(
        &self,
        id: &EntityId,
        operation: OperationType,
        record: ConfirmationRecord,
    ) -> Result<CommitResult, StoreError>;
}

/// Concurrent in-memory store with optional JSON snapshot.
#[derive(Clone, Default)]
pub struct MemoryEntityStore {
    inner: Arc<DashMap<EntityId, AgentRecord>>,
    persistence_path: Option<PathBuf>,
    save_lock: Arc<Mutex<()>>,
}

impl MemoryEntityStore {
    /// Create a new empty store; commits are persisted when a path is given.
    pub fn new(persistence_path: Option<PathBuf>) -> Self {
        Self {
            inner: Arc::new(DashMap::new()),
            persistence_path,
            save_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Load from a snapshot if it exists; later commits are written back to it.
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let store = Self::new(Some(path.to_path_buf()));
        if path.exists() {
            let reader = BufReader::new(File::open(path)?);
            let records: HashMap<EntityId, AgentRecord> = serde_json::from_reader(reader)?;
            for (id, record) in records {
                store.inner.insert(id, record);
            }
            tracing::info!(entities = store.inner.len(), path = ?path, "Loaded entity snapshot");
        }
        Ok(store)
    }

    /// Write the snapshot (write to a temp file, then rename).
    pub fn save_to_file(&self) -> Result<(), StoreError> {
        let Some(path) = &self.persistence_path else {
            return Ok(());
        };
        let _guard = self.save_lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        let records: HashMap<EntityId, AgentRecord> = self
            .inner
            .iter()
            .map(|r| (r.key().clone(), r.value().clone()))
            .collect();

        let tmp = path.with_extension("json.tmp");
        {
            let mut writer = BufWriter::new(File::create(&tmp)?);
            serde_json::to_writer_pretty(&mut writer, &records)?;
            writer.flush()?;
        }
        fs::rename(&tmp, path)?;
        tracing::debug!(entities = records.len(), "Saved entity snapshot");
        Ok(())
    }

    /// Add or replace an entity (used by whatever owns the listing CRUD).
    pub fn upsert_entity(&self, record: AgentRecord) {
        self.inner.insert(record.id.clone(), record);
    }

    /// Register a fresh, unconfirmed entity.
    pub fn insert_entity(&self, id: EntityId, owner: Address) {
        self.upsert_entity(AgentRecord::new(id, owner));
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

#[async_trait]
impl EntityStore for MemoryEntityStore {
    async fn get_entity(&self, id: &EntityId) -> Result<Option<AgentRecord>, StoreError> {
        Ok(self.inner.get(id).map(|r| r.value().clone()))
    }

    async fn commit_if_unconfirmed(
        &self,
        id: &EntityId,
        operation: OperationType,
        record: ConfirmationRecord,
    ) -> Result<CommitResult, StoreError> {
        {
            // The shard write lock makes check-and-insert atomic.
            let mut entity = self
                .inner
                .get_mut(id)
                .ok_or_else(|| StoreError::EntityNotFound(id.clone()))?;
            if let Some(existing) = entity.confirmations.get(&operation) {
                return Ok(CommitResult::AlreadyConfirmed(existing.clone()));
            }
            entity.confirmations.insert(operation, record);
        }

        // The confirmation stands in memory; a failed snapshot is logged and
        // retried by the next commit or shutdown save.
        if self.persistence_path.is_some() {
            let store = self.clone();
            match tokio::task::spawn_blocking(move || store.save_to_file()).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::error!(entity = %id, error = %e, "Failed to save entity snapshot"),
                Err(e) => tracing::error!(entity = %id, error = %e, "Snapshot task failed"),
            }
        }
        Ok(CommitResult::Committed)
    }
}

impl std::fmt::Debug for MemoryEntityStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryEntityStore")
            .field("entities", &self.inner.len())
            .field("persistence_path", &self.persistence_path)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::types::ChainId;
    use crate::confirmation::types::ResultSource;
    use alloy::primitives::TxHash;

    fn record(byte: u8, result_id: u64) -> ConfirmationRecord {
        ConfirmationRecord {
            tx_hash: TxHash::repeat_byte(byte),
            chain_id: ChainId(31337),
            result_id,
            confirmed_at: 1_700_000_000,
            source: ResultSource::Logs,
        }
    }

    #[tokio::test]
    async fn test_commit_survives_failed_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let store = MemoryEntityStore::new(Some(dir.path().join("missing").join("entities.json")));
        let id = EntityId::new("agent-1");
        store.insert_entity(id.clone(), Address::ZERO);

        let result = store
            .commit_if_unconfirmed(&id, OperationType::Publish, record(0xaa, 42))
            .await
            .unwrap();
        assert_eq!(result, CommitResult::Committed);

        let entity = store.get_entity(&id).await.unwrap().unwrap();
        assert_eq!(entity.confirmation(OperationType::Publish).unwrap().result_id, 42);
        assert!(store.save_to_file().is_err());
    }

    #[tokio::test]
    async fn test_commit_is_compare_and_swap() {
        let store = MemoryEntityStore::new(None);
        let id = EntityId::new("agent-1");
        store.insert_entity(id.clone(), Address::ZERO);

        let first = store
            .commit_if_unconfirmed(&id, OperationType::Publish, record(0xaa, 42))
            .await
            .unwrap();
        assert_eq!(first, CommitResult::Committed);

        let second = store
            .commit_if_unconfirmed(&id, OperationType::Publish, record(0xbb, 43))
            .await
            .unwrap();
        assert_eq!(second, CommitResult::AlreadyConfirmed(record(0xaa, 42)));

        // Other operations are independent.
        let other = store
            .commit_if_unconfirmed(&id, OperationType::EnableReviews, record(0xcc, 42))
            .await
            .unwrap();
        assert_eq!(other, CommitResult::Committed);
    }

    #[tokio::test]
    async fn test_concurrent_commits_have_one_winner() {
        let store = MemoryEntityStore::new(None);
        let id = EntityId::new("agent-race");
        store.insert_entity(id.clone(), Address::ZERO);

        let mut handles = Vec::new();
        for byte in 1..=16u8 {
            let store = store.clone();
            let id = id.clone();
            handles.push(tokio::spawn(async move {
                store
                    .commit_if_unconfirmed(&id, OperationType::Publish, record(byte, byte as u64))
                    .await
                    .unwrap()
            }));
        }

        let mut committed = 0;
        for handle in handles {
            if handle.await.unwrap() == CommitResult::Committed {
                committed += 1;
            }
        }
        assert_eq!(committed, 1);
    }

    #[tokio::test]
    async fn test_commit_unknown_entity() {
        let store = MemoryEntityStore::new(None);
        let err = store
            .commit_if_unconfirmed(&EntityId::new("ghost"), OperationType::Publish, record(1, 1))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::EntityNotFound(_)));
    }

    #[tokio::test]
    async fn test_snapshot_persistence() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("entities.json");
        let id = EntityId::new("agent-7");

        let store = MemoryEntityStore::load_from_file(&path).unwrap();
        assert!(store.is_empty());
        store.insert_entity(id.clone(), Address::repeat_byte(0x11));
        store
            .commit_if_unconfirmed(&id, OperationType::Publish, record(0xaa, 7))
            .await
            .unwrap();

        let reloaded = MemoryEntityStore::load_from_file(&path).unwrap();
        let entity = reloaded.get_entity(&id).await.unwrap().unwrap();
        assert_eq!(entity.owner, Address::repeat_byte(0x11));
        assert_eq!(
            entity.state(OperationType::Publish),
            ConfirmationState::Confirmed(record(0xaa, 7))
        );
        assert_eq!(entity.state(OperationType::SubmitReview), ConfirmationState::Unconfirmed);
    }
}
