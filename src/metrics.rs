// Metrics and observability module
// This file handles collection and reporting of performance metrics
// for venue calls and pipeline stages.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, Encoder, HistogramVec, TextEncoder,
};

pub static VENUE_LATENCY: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "aggr_venue_latency_seconds",
        "latency for per-venue quote calls",
        &["venue", "outcome"]
    )
    .unwrap()
});

pub static VENUE_ERRORS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "aggr_venue_errors_total",
        "per-venue quote failures by kind",
        &["venue", "kind"]
    )
    .unwrap()
});

pub static ROUTE_REQUESTS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "aggr_route_requests_total",
        "routing requests by endpoint and outcome",
        &["endpoint", "outcome"]
    )
    .unwrap()
});

pub static ADMISSION_THROTTLED: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "aggr_admission_throttled_total",
        "admissions delayed by the rate window or the inflight cap",
        &["reason"]
    )
    .unwrap()
});

/// Render the default registry in the Prometheus text format.
pub fn render() -> String {
    let metric_families = prometheus::gather();
    let mut buf = Vec::new();
    let encoder = TextEncoder::new();
    if encoder.encode(&metric_families, &mut buf).is_err() {
        return String::new();
    }
    String::from_utf8(buf).unwrap_or_default()
}
