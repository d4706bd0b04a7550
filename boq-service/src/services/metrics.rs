//! Prometheus metrics for boq-service.
//!
//! Service counters live in the `prometheus` default registry. Counters
//! emitted through the `metrics` facade (HTTP middleware, transient retries)
//! go to a Prometheus recorder; `/metrics` renders both.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, Encoder, HistogramVec, TextEncoder,
};
use std::sync::OnceLock;

/// Handle to the `metrics` facade recorder; `None` if another recorder won.
static RECORDER: OnceLock<Option<PrometheusHandle>> = OnceLock::new();

/// Histogram for database query duration.
pub static DB_QUERY_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "boq_db_query_duration_seconds",
        "Database query duration in seconds",
        &["operation"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5]
    )
    .expect("Failed to register DB_QUERY_DURATION")
});

/// Ingestion runs by kind (`rate_card`, `document`) and status.
pub static INGESTIONS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "boq_ingestions_total",
        "Total number of workbook ingestions",
        &["kind", "vendor", "status"]
    )
    .expect("Failed to register INGESTIONS")
});

/// Data rows by outcome (`kept`, `skipped`).
pub static INGESTED_ROWS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "boq_ingested_rows_total",
        "Data rows read from uploaded workbooks",
        &["vendor", "outcome"]
    )
    .expect("Failed to register INGESTED_ROWS")
});

/// Invoice create/delete outcomes.
pub static INVOICE_OPERATIONS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "boq_invoice_operations_total",
        "Total number of invoice operations",
        &["operation", "status"]
    )
    .expect("Failed to register INVOICE_OPERATIONS")
});

pub static OVER_BILLING_REJECTIONS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "boq_over_billing_rejections_total",
        "Invoice creations rejected because a line item would exceed its limit",
        &["vendor"]
    )
    .expect("Failed to register OVER_BILLING_REJECTIONS")
});

/// Counter for errors.
pub static ERRORS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!("boq_errors_total", "Total number of errors", &["error_type"])
        .expect("Failed to register ERRORS")
});

/// Initialize all metrics (forces lazy initialization) and install the
/// `metrics` recorder. Safe to call more than once.
pub fn init_metrics() {
    RECORDER.get_or_init(|| match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => Some(handle),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to install metrics recorder");
            None
        }
    });
    Lazy::force(&DB_QUERY_DURATION);
    Lazy::force(&INGESTIONS);
    Lazy::force(&INGESTED_ROWS);
    Lazy::force(&INVOICE_OPERATIONS);
    Lazy::force(&OVER_BILLING_REJECTIONS);
    Lazy::force(&ERRORS);
}

/// Get all metrics as Prometheus text format.
pub fn get_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(error = %e, "Failed to encode metrics");
    }
    let mut output = String::from_utf8(buffer).unwrap_or_default();

    if let Some(handle) = RECORDER.get().and_then(Option::as_ref) {
        output.push_str(&handle.render());
    }
    output
}

pub fn record_ingestion(kind: &str, vendor: &str, status: &str) {
    INGESTIONS.with_label_values(&[kind, vendor, status]).inc();
}

pub fn record_ingested_rows(vendor: &str, kept: usize, skipped: usize) {
    INGESTED_ROWS
        .with_label_values(&[vendor, "kept"])
        .inc_by(kept as f64);
    INGESTED_ROWS
        .with_label_values(&[vendor, "skipped"])
        .inc_by(skipped as f64);
}

pub fn record_invoice_operation(operation: &str, status: &str) {
    INVOICE_OPERATIONS
        .with_label_values(&[operation, status])
        .inc();
}

pub fn record_over_billing(vendor: &str) {
    OVER_BILLING_REJECTIONS.with_label_values(&[vendor]).inc();
}

/// Record an error.
pub fn record_error(error_type: &str) {
    ERRORS.with_label_values(&[error_type]).inc();
}
