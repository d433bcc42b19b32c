//! Metrics collection and exposition.
//!
//! # Metrics
//! - `yadro_requests_total` (counter): requests by method, status, route
//! - `yadro_request_duration_seconds` (histogram): kernel latency
//! - `yadro_route_resolutions_total` (counter): by outcome (static, dynamic, error route)
//! - `yadro_pipeline_short_circuits_total` (counter): security refusals by reason
//! - `yadro_closure_fallbacks_total` (counter): responses replaced by the closing stage
//!
//! # Design Decisions
//! - Labels are low-cardinality: route patterns, never raw paths

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter with its own HTTP listener.
/// Must be called from inside a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(method: &str, status: u16, route: &str, start: Instant) {
    counter!(
        "yadro_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string(),
        "route" => route.to_string()
    )
    .increment(1);
    histogram!("yadro_request_duration_seconds").record(start.elapsed().as_secs_f64());
}

pub fn record_route_resolution(outcome: &'static str) {
    counter!("yadro_route_resolutions_total", "outcome" => outcome).increment(1);
}

pub fn record_short_circuit(reason: &'static str) {
    counter!("yadro_pipeline_short_circuits_total", "reason" => reason).increment(1);
}

pub fn record_closure_fallback() {
    counter!("yadro_closure_fallbacks_total").increment(1);
}
