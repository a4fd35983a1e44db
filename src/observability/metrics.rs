//! Metrics collection and exposition.
//!
//! # Metrics
//! - `confirm_requests_total` (counter): confirmations by operation, outcome
//! - `confirm_duration_seconds` (histogram): coordinator latency by operation
//! - `confirm_fallback_acceptances_total` (counter): client-supplied ids accepted
//! - `rpc_calls_total` (counter): JSON-RPC calls by method, result
//! - `retry_attempts_total` (counter): retries scheduled by the executor
//! - `ledger_records_resumed_total` (counter): recovery actions by kind
//!
//! Recording is a no-op until [`init_metrics`] installs the exporter, so
//! tests and the CLI never need to set anything up.

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter listening on `addr`.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_confirmation(operation: &'static str, outcome: &'static str, start: Instant) {
    metrics::counter!("confirm_requests_total", "operation" => operation, "outcome" => outcome)
        .increment(1);
    metrics::histogram!("confirm_duration_seconds", "operation" => operation)
        .record(start.elapsed().as_secs_f64());
}

pub fn record_fallback_acceptance(operation: &'static str) {
    metrics::counter!("confirm_fallback_acceptances_total", "operation" => operation).increment(1);
}

pub fn record_rpc_call(method: &'static str, result: &'static str) {
    metrics::counter!("rpc_calls_total", "method" => method, "result" => result).increment(1);
}

pub fn record_retry() {
    metrics::counter!("retry_attempts_total").increment(1);
}

pub fn record_ledger_action(action: &'static str) {
    metrics::counter!("ledger_records_resumed_total", "action" => action).increment(1);
}
