//! Metrics collection and exposition.
//!
//! # Metrics
//! - `ows_requests_total` (counter): requests by service and outcome
//! - `ows_request_duration_seconds` (histogram): latency by service
//! - `ows_exceptions_total` (counter): encoded faults by code and shape
//! - `ows_registry_reloads_total` (counter): registry rebuilds by result

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Start the Prometheus scrape endpoint. Must run inside a tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

/// Outcome label of a finished request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Exception,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Exception => "exception",
        }
    }
}

pub fn record_request(service: &str, outcome: Outcome, start: Instant) {
    let service = if service.is_empty() { "unknown" } else { service }.to_string();
    metrics::counter!(
        "ows_requests_total",
        "service" => service.clone(),
        "outcome" => outcome.as_str()
    )
    .increment(1);
    metrics::histogram!("ows_request_duration_seconds", "service" => service)
        .record(start.elapsed().as_secs_f64());
}

pub fn record_reload(success: bool) {
    let result = if success { "success" } else { "failure" };
    metrics::counter!("ows_registry_reloads_total", "result" => result).increment(1);
}
