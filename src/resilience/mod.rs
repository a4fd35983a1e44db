//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Chain read (receipt fetch):
//!     → retries.rs (bounded attempts, caller-owned deadline)
//!     → backoff.rs (base * 2^attempt, capped, optional jitter)
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every chain wait has a deadline
//! - Server-side retries cover only the single chain read of a request;
//!   longer-term retry belongs to the client's pending-operation ledger

pub mod backoff;
pub mod retries;

pub use retries::{retry, RetryPolicy};
