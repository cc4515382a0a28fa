//! Prometheus metrics for hookfault-proxy.
//!
//! Tracks simulated faults, applied delays, forwarding and control changes.
use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_histogram, register_histogram_vec, register_int_gauge,
    CounterVec, Encoder, Histogram, HistogramVec, IntGauge, TextEncoder,
};

lazy_static! {
    /// Total number of requests processed
    pub static ref REQUESTS_TOTAL: CounterVec = register_counter_vec!(
        "hookfault_requests_total",
        "Total number of requests processed by the proxy",
        &["method", "status"]
    )
    .unwrap();

    /// Simulated error responses
    pub static ref FAULTS_INJECTED_TOTAL: CounterVec = register_counter_vec!(
        "hookfault_faults_injected_total",
        "Total number of simulated error responses",
        &["rule_id", "status"]
    )
    .unwrap();

    /// Artificial delay applied before handling, in milliseconds
    pub static ref DELAY_APPLIED_MS: Histogram = register_histogram!(
        "hookfault_delay_applied_ms",
        "Histogram of artificial delay applied to requests in milliseconds",
        vec![10.0, 100.0, 500.0, 1000.0, 5000.0, 10000.0, 30000.0, 60000.0, 600000.0]
    )
    .unwrap();

    /// Failed forwards (network error, timeout, non-JSON response)
    pub static ref FORWARD_FAILURES_TOTAL: CounterVec = register_counter_vec!(
        "hookfault_forward_failures_total",
        "Total number of requests that could not be forwarded",
        &["backend"]
    )
    .unwrap();

    /// Backend request duration (without delay)
    pub static ref UPSTREAM_REQUEST_DURATION_MS: HistogramVec = register_histogram_vec!(
        "hookfault_upstream_request_duration_ms",
        "Duration of backend requests (excluding artificial delay)",
        &["backend", "status"],
        vec![5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0, 10000.0]
    )
    .unwrap();

    /// Proxy request duration
    pub static ref PROXY_REQUEST_DURATION_MS: HistogramVec = register_histogram_vec!(
        "hookfault_proxy_request_duration_ms",
        "Total request duration including delay and forwarding",
        &["method", "outcome"],  // outcome: faulted|forwarded|forward_failed|rejected|control
        vec![1.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0, 60000.0]
    )
    .unwrap();

    /// Currently configured simulated status
    pub static ref SIMULATED_STATUS: IntGauge = register_int_gauge!(
        "hookfault_simulated_status",
        "Currently configured simulated status code"
    )
    .unwrap();

    /// Currently configured simulated delay
    pub static ref SIMULATED_DELAY_MS: IntGauge = register_int_gauge!(
        "hookfault_simulated_delay_ms",
        "Currently configured simulated delay in milliseconds"
    )
    .unwrap();
}

/// Collect and return all metrics in Prometheus text format
pub fn collect_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", e);
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

pub fn record_request(method: &str, status: u16) {
    REQUESTS_TOTAL
        .with_label_values(&[method, &status.to_string()])
        .inc();
}

pub fn record_fault_injection(rule_id: &str, status: u16) {
    FAULTS_INJECTED_TOTAL
        .with_label_values(&[rule_id, &status.to_string()])
        .inc();
}

pub fn record_delay(delay_ms: u64) {
    DELAY_APPLIED_MS.observe(delay_ms as f64);
}

pub fn record_forward_failure(backend: &str) {
    FORWARD_FAILURES_TOTAL.with_label_values(&[backend]).inc();
}

pub fn record_upstream_duration(backend: &str, status: u16, duration_ms: f64) {
    UPSTREAM_REQUEST_DURATION_MS
        .with_label_values(&[backend, &status.to_string()])
        .observe(duration_ms);
}

pub fn record_proxy_duration(method: &str, outcome: &str, duration_ms: f64) {
    PROXY_REQUEST_DURATION_MS
        .with_label_values(&[method, outcome])
        .observe(duration_ms);
}

pub fn set_fault_state(status: u16, delay_ms: u64) {
    SIMULATED_STATUS.set(i64::from(status));
    SIMULATED_DELAY_MS.set(delay_ms as i64);
}
