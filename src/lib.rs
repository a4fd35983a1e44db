//! On-chain transaction confirmation and recovery.
//!
//! The server side decides whether a claimed transaction really performed an
//! operation (`confirmation`), reading the chain through `blockchain` and
//! `logs`. The client side keeps a durable record of what it broadcast
//! (`ledger`) so an interrupted confirmation can be resumed.

pub mod blockchain;
pub mod config;
pub mod confirmation;
pub mod http;
pub mod ledger;
pub mod logs;
pub mod observability;
pub mod resilience;

pub use config::schema::ServiceConfig;
pub use confirmation::ConfirmationCoordinator;
pub use http::HttpServer;
