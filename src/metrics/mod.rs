//! Metrics module
//!
//! Prometheus counters for signing requests, object uploads and task
//! failures, registered in the default registry.

use lazy_static::lazy_static;
use prometheus::{
    register_counter, register_counter_vec, register_histogram_vec, Counter, CounterVec,
    Encoder, HistogramVec, TextEncoder,
};

lazy_static! {
    // Upload metrics
    pub static ref UPLOADS_TOTAL: CounterVec = register_counter_vec!(
        "signed_uploadr_uploads_total",
        "Total number of file uploads",
        &["status"]
    ).unwrap();

    pub static ref UPLOAD_BYTES_TOTAL: Counter = register_counter!(
        "signed_uploadr_upload_bytes_total",
        "Total bytes uploaded"
    ).unwrap();

    // Signing metrics
    pub static ref SIGN_REQUESTS_TOTAL: CounterVec = register_counter_vec!(
        "signed_uploadr_sign_requests_total",
        "Signed-URL batch requests",
        &["status"]
    ).unwrap();

    pub static ref OPERATION_DURATION: HistogramVec = register_histogram_vec!(
        "signed_uploadr_operation_duration_seconds",
        "Network operation duration in seconds",
        &["operation"],
        vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0, 60.0]
    ).unwrap();

    // Error metrics
    pub static ref ERRORS_TOTAL: CounterVec = register_counter_vec!(
        "signed_uploadr_errors_total",
        "Total task errors by code",
        &["code"]
    ).unwrap();
}

/// Record a successful file upload
pub fn record_upload_success(bytes: u64) {
    UPLOADS_TOTAL.with_label_values(&["success"]).inc();
    UPLOAD_BYTES_TOTAL.inc_by(bytes as f64);
}

/// Record a failed file upload, labelled by its error code
pub fn record_upload_failure(code: &str) {
    UPLOADS_TOTAL.with_label_values(&[code]).inc();
}

/// Record the outcome of a signing request
pub fn record_sign_request(status: &str) {
    SIGN_REQUESTS_TOTAL.with_label_values(&[status]).inc();
}

/// Record a network operation duration
pub fn record_operation_duration(operation: &str, duration_secs: f64) {
    OPERATION_DURATION
        .with_label_values(&[operation])
        .observe(duration_secs);
}

/// Record a task-level error
pub fn record_error(code: &str) {
    ERRORS_TOTAL.with_label_values(&[code]).inc();
}

/// Render all registered metrics in the Prometheus text format
pub fn gather_text() -> String {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&prometheus::gather(), &mut buffer) {
        tracing::warn!(error = %e, "Failed to encode metrics");
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}
