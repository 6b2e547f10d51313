//! Metrics collection and exposition.
//!
//! # Metrics
//! - `capsule_queries_total` (counter): contract queries by kind and outcome
//! - `capsule_fetches_total` (counter): fetch cycles by outcome
//! - `capsule_fetch_duration_seconds` (histogram): full fetch latency
//! - `capsule_visible` (gauge): capsules retained by the last published fetch
//! - `capsule_transactions_total` (counter): transactions by action and status
//! - `chain_block_height` (gauge): latest published head
//! - `chain_rpc_health` (gauge): 1=reachable, 0=unreachable
//!
//! Without an installed recorder every call is a no-op.

use std::net::SocketAddr;
use std::time::Duration;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter with its own HTTP listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

/// Record one contract query.
pub fn record_query(kind: &'static str, ok: bool) {
    let outcome = if ok { "ok" } else { "error" };
    metrics::counter!("capsule_queries_total", "kind" => kind, "outcome" => outcome).increment(1);
}

/// Record the end of a fetch cycle.
pub fn record_fetch(outcome: &'static str, elapsed: Duration) {
    metrics::counter!("capsule_fetches_total", "outcome" => outcome).increment(1);
    metrics::histogram!("capsule_fetch_duration_seconds").record(elapsed.as_secs_f64());
}

/// Record how many capsules the published list holds.
pub fn record_visible(count: usize) {
    metrics::gauge!("capsule_visible").set(count as f64);
}

/// Record a transaction status transition.
pub fn record_transaction(action: &'static str, status: &'static str) {
    metrics::counter!("capsule_transactions_total", "action" => action, "status" => status)
        .increment(1);
}

/// Record a newly published block height.
pub fn record_block_height(height: u64) {
    metrics::gauge!("chain_block_height").set(height as f64);
}

/// Record node reachability.
pub fn record_rpc_health(healthy: bool) {
    metrics::gauge!("chain_rpc_health").set(if healthy { 1.0 } else { 0.0 });
}
