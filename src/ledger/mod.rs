//! Client-side pending-operation ledger and recovery.
//!
//! # Data Flow
//! ```text
//! wallet broadcast → set_pending (durable)
//!     → ConfirmationFlow: wait for receipt → ConfirmTransport::confirm
//!         ├─ success / idempotent / conflict → clear
//!         └─ anything else                   → keep for the next resume
//! process start → recover_pending → same flow for every live record
//! ```

pub mod flow;
pub mod pending;
pub mod recovery;
pub mod transport;

pub use flow::{ConfirmationFlow, ConfirmationTask, RecordAction, TaskStatus};
pub use pending::{LedgerError, PendingLedger, PendingRecord, DEFAULT_RETENTION, SCHEMA_VERSION};
pub use recovery::{recover_pending, RecoveryReport};
pub use transport::{ConfirmTransport, HttpTransport, LocalTransport};
