// src/metrics.rs
use axum::{routing::get, Router};
use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the Prometheus recorder and describe every series this crate emits.
    pub fn init() -> anyhow::Result<Self> {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .map_err(|e| anyhow::anyhow!("prometheus: install recorder: {e}"))?;
        ensure_metrics_described();
        Ok(Self { handle })
    }

    /// Returns a router exposing `/metrics` with the Prometheus exposition format.
    pub fn router(&self) -> Router {
        let handle = self.handle.clone();
        Router::new().route(
            "/metrics",
            get(move || {
                let h = handle.clone();
                async move { h.render() }
            }),
        )
    }
}

/// One-time metrics registration (so series show up on /metrics).
pub fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!(
            "detect_requests_total",
            "Articles classified, by final label."
        );
        describe_counter!(
            "detect_errors_total",
            "Detection requests that failed, by error kind."
        );
        describe_counter!(
            "feedback_records_total",
            "Feedback rows appended to the log."
        );
        describe_counter!("retrain_runs_total", "Successful retrain commits.");
        describe_counter!(
            "retrain_failures_total",
            "Retrain attempts that left the previous pair in place, by error kind."
        );
        describe_counter!(
            "retrain_feedback_excluded_total",
            "Feedback rows skipped during retraining (label outside Valid/Hoaks)."
        );
        describe_gauge!("artifact_generation", "Generation of the active artifact pair.");
        describe_histogram!("retrain_duration_ms", "Retrain wall time in milliseconds.");
    });
}
