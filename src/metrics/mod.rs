//! Metrics module
//!
//! Prometheus counters and histograms for uploads, parts, retries and aborts.

use lazy_static::lazy_static;
use prometheus::{
    register_counter, register_counter_vec, register_histogram, register_histogram_vec, Counter,
    CounterVec, Encoder, Histogram, HistogramVec, TextEncoder,
};

lazy_static! {
    // Upload metrics
    pub static ref UPLOADS_TOTAL: CounterVec = register_counter_vec!(
        "kata_uploads_total",
        "Total number of uploads by outcome",
        &["status"]  // "success", "failure" or "cancelled"
    ).unwrap();

    pub static ref UPLOADS_RESUMED: Counter = register_counter!(
        "kata_uploads_resumed_total",
        "Uploads that skipped parts using a resume snapshot"
    ).unwrap();

    pub static ref UPLOAD_BYTES_TOTAL: Counter = register_counter!(
        "kata_upload_bytes_total",
        "Total part bytes accepted by storage"
    ).unwrap();

    pub static ref UPLOAD_PARTS: Histogram = register_histogram!(
        "kata_upload_parts",
        "Number of parts per upload",
        vec![1.0, 5.0, 10.0, 50.0, 100.0, 500.0, 1000.0, 10000.0]
    ).unwrap();

    // Part metrics
    pub static ref PARTS_TOTAL: CounterVec = register_counter_vec!(
        "kata_parts_total",
        "Part transfer attempts by outcome",
        &["status"]  // "success", "retry", "failure" or "cancelled"
    ).unwrap();

    pub static ref PART_DURATION: HistogramVec = register_histogram_vec!(
        "kata_part_duration_seconds",
        "Part transfer duration in seconds",
        &["status"],
        vec![0.05, 0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0]
    ).unwrap();

    // Abort metrics
    pub static ref ABORTS_TOTAL: CounterVec = register_counter_vec!(
        "kata_aborts_total",
        "Abort calls by outcome",
        &["status"]
    ).unwrap();
}

/// Record a finished upload
pub fn record_upload_success(part_count: u32) {
    UPLOADS_TOTAL.with_label_values(&["success"]).inc();
    UPLOAD_PARTS.observe(f64::from(part_count));
}

/// Record a failed upload
pub fn record_upload_failure(cancelled: bool) {
    let status = if cancelled { "cancelled" } else { "failure" };
    UPLOADS_TOTAL.with_label_values(&[status]).inc();
}

/// Record an upload that reused a resume snapshot
pub fn record_upload_resumed() {
    UPLOADS_RESUMED.inc();
}

/// Record one settled part attempt
///
/// # Arguments
/// * `status` - `"success"`, `"retry"`, `"failure"` or `"cancelled"`
/// * `bytes` - Part size, counted only on success
/// * `duration_secs` - Attempt duration in seconds
pub fn record_part(status: &str, bytes: u64, duration_secs: f64) {
    PARTS_TOTAL.with_label_values(&[status]).inc();
    PART_DURATION.with_label_values(&[status]).observe(duration_secs);
    if status == "success" {
        UPLOAD_BYTES_TOTAL.inc_by(bytes as f64);
    }
}

/// Record an abort call
pub fn record_abort(success: bool) {
    let status = if success { "success" } else { "failure" };
    ABORTS_TOTAL.with_label_values(&[status]).inc();
}

/// Render the default registry in the Prometheus text format
pub fn gather_text() -> String {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&prometheus::gather(), &mut buffer) {
        tracing::warn!(error = %e, "Failed to encode metrics");
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}
