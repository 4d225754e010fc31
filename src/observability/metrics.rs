//! Metrics collection and exposition.
//!
//! # Metrics
//! - `templater_renders_total` (counter): renders by outcome
//! - `templater_render_duration_seconds` (histogram): render latency
//! - `templater_evicted_retries_total` (counter): renders re-run after a blob eviction
//! - `templater_reloads_total` (counter): rebuilds by kind (config, folder) and outcome
//! - `templater_roots` (gauge): compiled roots currently installed

use std::net::SocketAddr;
use std::time::Instant;
use metrics::{counter, gauge, histogram};
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

pub fn record_render(outcome: &'static str, start: Instant) {
    counter!("templater_renders_total", "outcome" => outcome).increment(1);
    histogram!("templater_render_duration_seconds").record(start.elapsed().as_secs_f64());
}

pub fn record_evicted_retry() {
    counter!("templater_evicted_retries_total").increment(1);
}

pub fn record_reload(kind: &'static str, outcome: &'static str) {
    counter!("templater_reloads_total", "kind" => kind, "outcome" => outcome).increment(1);
}

pub fn record_roots(count: usize) {
    gauge!("templater_roots").set(count as f64);
}
