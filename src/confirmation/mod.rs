//! Server-side confirmation of on-chain operations.
//!
//! # Data Flow
//! ```text
//! POST .../confirm
//!     → coordinator.rs (authorize, idempotency, chain read, extraction)
//!     → store.rs (conditional commit per entity + operation)
//!     → ConfirmOutcome { success | idempotent } or ConfirmError
//! ```
//!
//! # Design Decisions
//! - One confirmed hash per (entity, operation), forever
//! - Replays of the confirmed hash succeed without side effects
//! - Transient chain trouble is reported, not retried indefinitely; the
//!   client's pending-operation ledger comes back later

pub mod coordinator;
pub mod store;
pub mod types;

pub use coordinator::{ConfirmationCoordinator, CoordinatorSettings};
pub use store::{AgentRecord, CommitResult, EntityStore, MemoryEntityStore, StoreError};
pub use types::{
    ConfirmError, ConfirmOutcome, ConfirmRequest, ConfirmStatus, ConfirmationRecord,
    ConfirmationState, EntityId, OperationType, ResultSource,
};
