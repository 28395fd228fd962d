/// Metrics and telemetry for the resource vault
///
/// Provides Prometheus-compatible metrics for monitoring:
/// - Storage operations by outcome
/// - Image transformation latency
/// - Stored byte totals
/// - Derived-state hook failures

use lazy_static::lazy_static;
use prometheus::{
    register_histogram_vec, register_int_counter, register_int_counter_vec, register_int_gauge,
    Encoder, HistogramVec, IntCounter, IntCounterVec, IntGauge, TextEncoder,
};

lazy_static! {
    // ========== Storage Metrics ==========

    /// Storage engine operations by operation and status
    pub static ref RESOURCE_OPERATIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "resource_operations_total",
        "Total number of resource storage operations",
        &["operation", "status"]
    )
    .unwrap();

    /// Payload bytes written by successful saves
    pub static ref RESOURCE_BYTES_WRITTEN_TOTAL: IntCounter = register_int_counter!(
        "resource_bytes_written_total",
        "Total payload bytes committed to the blob collection"
    )
    .unwrap();

    /// Size of the most recently saved payload, for quick sanity checks
    pub static ref RESOURCE_LAST_PAYLOAD_BYTES: IntGauge = register_int_gauge!(
        "resource_last_payload_bytes",
        "Size in bytes of the most recently committed payload"
    )
    .unwrap();

    // ========== Pipeline Metrics ==========

    /// Image transformation duration in seconds
    pub static ref TRANSFORM_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "resource_transform_duration_seconds",
        "Image transformation latencies in seconds",
        &["recompressed"],
        vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]
    )
    .unwrap();

    // ========== Hook Metrics ==========

    /// Derived-state hook invocations that returned an error
    pub static ref HOOK_FAILURES_TOTAL: IntCounter = register_int_counter!(
        "resource_hook_failures_total",
        "Total number of failed derived-state hook invocations"
    )
    .unwrap();
}

/// Record the outcome of a storage operation
pub fn record_operation<T, E>(operation: &str, result: &Result<T, E>) {
    let status = if result.is_ok() { "ok" } else { "error" };
    RESOURCE_OPERATIONS_TOTAL
        .with_label_values(&[operation, status])
        .inc();
}

/// Gather all metrics in Prometheus text format
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", e);
        return String::new();
    }

    String::from_utf8(buffer).unwrap_or_default()
}
