//! Event log interpretation.
//!
//! # Data Flow
//! ```text
//! Receipt.logs
//!     → interpreter.rs (filter by registry address)
//!         1. Registered event  → agentId
//!         2. Transfer mint     → tokenId
//!         3. raw topic read    → bounded integer
//!     → Option<Interpretation>
//! ```

pub mod events;
pub mod interpreter;

pub use interpreter::{DecodeError, Interpretation, LogInterpreter, Strategy, MAX_RAW_ID};
