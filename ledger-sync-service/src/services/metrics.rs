//! Prometheus metrics for ledger-sync-service.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, Encoder, HistogramVec, TextEncoder,
};

/// Counter for completed sync runs by outcome.
pub static SYNC_RUNS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "ledger_sync_runs_total",
        "Total number of invoice sync runs",
        &["outcome"]
    )
    .expect("Failed to register SYNC_RUNS")
});

/// Counter for invoice mirror upserts.
pub static INVOICES_SYNCED: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "ledger_sync_invoices_synced_total",
        "Total number of invoices upserted from the ledger",
        &["linked"]
    )
    .expect("Failed to register INVOICES_SYNCED")
});

/// Counter for customer resolution outcomes.
pub static CUSTOMER_MATCHES: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "ledger_sync_customer_matches_total",
        "Customer resolution outcomes during sync",
        &["outcome"]
    )
    .expect("Failed to register CUSTOMER_MATCHES")
});

/// Histogram for database query duration.
pub static DB_QUERY_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "ledger_sync_db_query_duration_seconds",
        "Database query duration in seconds",
        &["operation"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5]
    )
    .expect("Failed to register DB_QUERY_DURATION")
});

/// Histogram for upstream page fetch duration.
pub static LEDGER_PAGE_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "ledger_sync_page_fetch_duration_seconds",
        "Ledger API page fetch duration in seconds",
        &["status"],
        vec![0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]
    )
    .expect("Failed to register LEDGER_PAGE_DURATION")
});

/// Counter for errors by type.
pub static ERRORS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "ledger_sync_errors_total",
        "Total number of errors",
        &["error_type"]
    )
    .expect("Failed to register ERRORS")
});

/// Initialize all metrics (forces lazy initialization).
pub fn init_metrics() {
    Lazy::force(&SYNC_RUNS);
    Lazy::force(&INVOICES_SYNCED);
    Lazy::force(&CUSTOMER_MATCHES);
    Lazy::force(&DB_QUERY_DURATION);
    Lazy::force(&LEDGER_PAGE_DURATION);
    Lazy::force(&ERRORS);
}

/// Get all metrics as Prometheus text format.
pub fn get_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer).unwrap();
    String::from_utf8(buffer).unwrap()
}

/// Record a completed sync run.
pub fn record_sync_run(outcome: &str) {
    SYNC_RUNS.with_label_values(&[outcome]).inc();
}

/// Record an upserted invoice.
pub fn record_invoice_synced(linked: bool) {
    let label = if linked { "yes" } else { "no" };
    INVOICES_SYNCED.with_label_values(&[label]).inc();
}

/// Record a customer resolution outcome.
pub fn record_customer_match(outcome: &str) {
    CUSTOMER_MATCHES.with_label_values(&[outcome]).inc();
}

/// Record an error.
pub fn record_error(error_type: &str) {
    ERRORS.with_label_values(&[error_type]).inc();
}
