//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gateway_requests_total` (counter): requests by method, status
//! - `gateway_request_duration_seconds` (histogram): end-to-end latency
//! - `gateway_filter_executions_total` (counter): by phase, filter, outcome
//! - `gateway_filter_duration_seconds` (histogram): by phase, filter
//! - `gateway_ingestion_rejections_total` (counter): by reason
//! - `gateway_filter_reloads_total` (counter): by result

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusBuilder;

use crate::filter::FilterPhase;

/// Install the Prometheus recorder and its scrape listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(method: &str, status: u16, started: Instant) {
    metrics::counter!(
        "gateway_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    metrics::histogram!("gateway_request_duration_seconds").record(started.elapsed().as_secs_f64());
}

pub fn record_filter(phase: FilterPhase, filter: &str, outcome: &'static str, started: Instant) {
    metrics::counter!(
        "gateway_filter_executions_total",
        "phase" => phase.as_str(),
        "filter" => filter.to_string(),
        "outcome" => outcome
    )
    .increment(1);
    metrics::histogram!(
        "gateway_filter_duration_seconds",
        "phase" => phase.as_str(),
        "filter" => filter.to_string()
    )
    .record(started.elapsed().as_secs_f64());
}

pub fn record_ingestion_rejection(reason: &'static str) {
    metrics::counter!("gateway_ingestion_rejections_total", "reason" => reason).increment(1);
}

pub fn record_filter_reload(success: bool) {
    let result = if success { "success" } else { "failure" };
    metrics::counter!("gateway_filter_reloads_total", "result" => result).increment(1);
}
