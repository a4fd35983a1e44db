//! Configuration validation.
//!
//! Serde handles syntax; this module checks value ranges and cross-field
//! consistency. Every problem is reported, not just the first one.

use std::collections::HashSet;
use std::fmt;
use std::net::SocketAddr;

use alloy::primitives::Address;

use crate::config::schema::ServiceConfig;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field.
    pub field: String,
    /// What is wrong with it.
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validate a parsed configuration.
pub fn validate_config(config: &ServiceConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("'{}' is not a socket address", config.listener.bind_address),
        ));
    }

    if config.retries.max_attempts == 0 {
        errors.push(ValidationError::new("retries.max_attempts", "must be at least 1"));
    }
    if config.retries.base_delay_ms == 0 {
        errors.push(ValidationError::new("retries.base_delay_ms", "must be positive"));
    }
    if config.retries.max_delay_ms < config.retries.base_delay_ms {
        errors.push(ValidationError::new(
            "retries.max_delay_ms",
            "must not be smaller than base_delay_ms",
        ));
    }
    if !(0.0..=1.0).contains(&config.retries.jitter_ratio) {
        errors.push(ValidationError::new("retries.jitter_ratio", "must be within [0, 1]"));
    }

    if config.confirmation.rpc_timeout_secs == 0 {
        errors.push(ValidationError::new("confirmation.rpc_timeout_secs", "must be positive"));
    }
    if config.confirmation.deadline_secs == 0 {
        errors.push(ValidationError::new("confirmation.deadline_secs", "must be positive"));
    }
    // The HTTP timeout has to leave the coordinator room to answer.
    if config.timeouts.request_secs <= config.confirmation.deadline_secs {
        errors.push(ValidationError::new(
            "timeouts.request_secs",
            "must be greater than confirmation.deadline_secs",
        ));
    }

    if config.ledger.retention_secs == 0 {
        errors.push(ValidationError::new("ledger.retention_secs", "must be positive"));
    }

    let mut seen = HashSet::new();
    for (i, network) in config.networks.iter().enumerate() {
        let prefix = format!("networks[{}]", i);
        if !seen.insert(network.chain_id) {
            errors.push(ValidationError::new(
                format!("{}.chain_id", prefix),
                format!("chain {} is configured more than once", network.chain_id),
            ));
        }
        for url in std::iter::once(&network.rpc_url).chain(network.failover_urls.iter()) {
            if url.parse::<url::Url>().is_err() {
                errors.push(ValidationError::new(
                    format!("{}.rpc_url", prefix),
                    format!("'{}' is not a valid URL", url),
                ));
            }
        }
        if let Some(registry) = &network.registry_address {
            if registry.parse::<Address>().is_err() {
                errors.push(ValidationError::new(
                    format!("{}.registry_address", prefix),
                    format!("'{}' is not an address", registry),
                ));
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
