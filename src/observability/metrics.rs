//! Metrics collection and exposition.
//!
//! # Metrics
//! - `faucet_requests_total` (counter): funding requests by outcome
//! - `faucet_rate_limited_total` (counter): denials by layer (`ip`, `address`)
//! - `faucet_alerts_total` (counter): operator alerts by kind and result
//! - `faucet_reconnects_total` (counter): node reconnects by result
//! - `faucet_finalization_seconds` (histogram): broadcast to finality latency

use metrics::{counter, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::time::Duration;

/// Install the Prometheus recorder and its HTTP listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_fund_outcome(outcome: &'static str) {
    counter!("faucet_requests_total", "outcome" => outcome).increment(1);
}

pub fn record_rate_limited(layer: &'static str) {
    counter!("faucet_rate_limited_total", "layer" => layer).increment(1);
}

pub fn record_alert(kind: &'static str, result: &'static str) {
    counter!("faucet_alerts_total", "kind" => kind, "result" => result).increment(1);
}

pub fn record_reconnect(result: &'static str) {
    counter!("faucet_reconnects_total", "result" => result).increment(1);
}

pub fn record_finalization(elapsed: Duration) {
    histogram!("faucet_finalization_seconds").record(elapsed.as_secs_f64());
}
