//! Metrics collection and Prometheus export.

use crate::models::{ReportStatus, ReportType};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;
use std::time::Instant;

/// Global handle to the Prometheus recorder.
pub static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the Prometheus recorder. Later calls are no-ops, so test
/// harnesses can build the application more than once per process.
pub fn init_metrics() {
    if METRICS_HANDLE.get().is_some() {
        return;
    }

    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => {
            let _ = METRICS_HANDLE.set(handle);
        }
        Err(e) => {
            tracing::warn!(error = %e, "Prometheus recorder not installed");
        }
    }
}

/// Get the current metrics in Prometheus text format.
pub fn get_metrics() -> String {
    METRICS_HANDLE
        .get()
        .map(|handle| handle.render())
        .unwrap_or_else(|| "# Metrics recorder not initialized".to_string())
}

pub fn record_db_query(operation: &'static str, started: Instant) {
    metrics::histogram!("report_db_query_duration_seconds", "operation" => operation)
        .record(started.elapsed().as_secs_f64());
}

pub fn record_build(report_type: ReportType, status: ReportStatus, started: Instant) {
    metrics::counter!(
        "report_builds_total",
        "type" => report_type.as_str(),
        "status" => status.as_str()
    )
    .increment(1);
    metrics::histogram!("report_build_duration_seconds", "type" => report_type.as_str())
        .record(started.elapsed().as_secs_f64());
}

pub fn record_transactions_processed(count: usize) {
    metrics::counter!("report_transactions_processed_total").increment(count as u64);
}

pub fn record_queue_rejection() {
    metrics::counter!("report_queue_rejections_total").increment(1);
}

pub fn record_sweep(removed: usize, errors: usize) {
    metrics::counter!("reports_swept_total").increment(removed as u64);
    metrics::counter!("report_sweep_errors_total").increment(errors as u64);
}
