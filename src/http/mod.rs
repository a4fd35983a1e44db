//! HTTP surface of the confirmation service.
//!
//! # Data Flow
//! ```text
//! request
//!     → server.rs (timeout, request ID, tracing)
//!     → middleware/caller.rs (wallet from the auth header)
//!     → confirm.rs (handler → coordinator)
//!     → JSON outcome or wire::ErrorBody
//! ```

pub mod confirm;
pub mod middleware;
pub mod server;
pub mod wire;

pub use server::{build_router, AppState, HttpServer};
pub use wire::{ConfirmBody, ErrorBody, CALLER_HEADER};
