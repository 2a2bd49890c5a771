//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define relay metrics (reservations, splits, broadcasts, operations)
//! - Expose Prometheus-compatible metrics endpoint
//!
//! # Metrics
//! - `ft_reservations_total` (counter): fee reservations by outcome
//! - `ft_pool_size` (gauge): fee outputs in each wallet's pool
//! - `ft_splits_total` (counter): auto-split attempts by outcome
//! - `ft_broadcasts_total` (counter): broadcasts by tx kind and outcome
//! - `ft_operation_duration_seconds` (histogram): token operation latency
//! - `ft_chain_backoffs_total` (counter): outputs backed off after chain-depth rejections

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::time::Instant;

/// Start the Prometheus scrape listener. Must run inside the tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_reservation(outcome: &'static str) {
    counter!("ft_reservations_total", "outcome" => outcome).increment(1);
}

pub fn record_pool_size(address: &str, size: usize) {
    gauge!("ft_pool_size", "address" => address.to_string()).set(size as f64);
}

pub fn record_split(outcome: &'static str) {
    counter!("ft_splits_total", "outcome" => outcome).increment(1);
}

pub fn record_broadcast(kind: &'static str, outcome: &'static str) {
    counter!("ft_broadcasts_total", "kind" => kind, "outcome" => outcome).increment(1);
}

pub fn record_operation(op: &'static str, outcome: &'static str, start: Instant) {
    histogram!("ft_operation_duration_seconds", "op" => op, "outcome" => outcome)
        .record(start.elapsed().as_secs_f64());
}

pub fn record_chain_backoff(outputs: usize) {
    counter!("ft_chain_backoffs_total").increment(outputs as u64);
}
