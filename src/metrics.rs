//! Prometheus metrics for the background job engine.

use anyhow::{Context, Result};
use axum::{http::StatusCode, response::IntoResponse, routing::get, Router};
use lazy_static::lazy_static;
use prometheus::{
    CounterVec, Encoder, GaugeVec, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder,
};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Metric name prefix for all gallery metrics
const PREFIX: &str = "gallery";

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    pub static ref BACKGROUND_JOB_EXECUTIONS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(
            format!("{PREFIX}_background_job_executions_total"),
            "Finished background job executions by outcome"
        ),
        &["job_type", "status"]
    ).expect("Failed to create background_job_executions_total metric");

    pub static ref BACKGROUND_JOB_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            format!("{PREFIX}_background_job_duration_seconds"),
            "Background job execution time in seconds"
        )
        .buckets(vec![0.01, 0.1, 1.0, 10.0, 60.0, 300.0, 1800.0, 3600.0]),
        &["job_type"]
    ).expect("Failed to create background_job_duration_seconds metric");

    pub static ref BACKGROUND_JOBS_RUNNING: GaugeVec = GaugeVec::new(
        Opts::new(
            format!("{PREFIX}_background_jobs_running"),
            "Background job executions currently in flight"
        ),
        &["job_type"]
    ).expect("Failed to create background_jobs_running metric");

    pub static ref JOB_LEDGER_WRITE_FAILURES_TOTAL: CounterVec = CounterVec::new(
        Opts::new(
            format!("{PREFIX}_job_ledger_write_failures_total"),
            "Failed attempts to finalize a job ledger row"
        ),
        &["job_type"]
    ).expect("Failed to create job_ledger_write_failures_total metric");
}

/// Register all metrics with the registry. Safe to call more than once.
pub fn init_metrics() {
    let _ = REGISTRY.register(Box::new(BACKGROUND_JOB_EXECUTIONS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(BACKGROUND_JOB_DURATION_SECONDS.clone()));
    let _ = REGISTRY.register(Box::new(BACKGROUND_JOBS_RUNNING.clone()));
    let _ = REGISTRY.register(Box::new(JOB_LEDGER_WRITE_FAILURES_TOTAL.clone()));
}

pub fn record_background_job_execution(job_type: &str, status: &str, duration: Duration) {
    BACKGROUND_JOB_EXECUTIONS_TOTAL
        .with_label_values(&[job_type, status])
        .inc();
    BACKGROUND_JOB_DURATION_SECONDS
        .with_label_values(&[job_type])
        .observe(duration.as_secs_f64());
}

pub fn background_job_started(job_type: &str) {
    BACKGROUND_JOBS_RUNNING.with_label_values(&[job_type]).inc();
}

pub fn background_job_finished(job_type: &str) {
    BACKGROUND_JOBS_RUNNING.with_label_values(&[job_type]).dec();
}

pub fn record_ledger_write_failure(job_type: &str) {
    JOB_LEDGER_WRITE_FAILURES_TOTAL
        .with_label_values(&[job_type])
        .inc();
}

/// Handler for the /metrics endpoint
pub async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();

    let mut buffer = vec![];
    match encoder.encode(&metric_families, &mut buffer) {
        Ok(()) => {
            let response = String::from_utf8(buffer).unwrap_or_default();
            (StatusCode::OK, response)
        }
        Err(e) => {
            tracing::error!("Failed to encode metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to encode metrics: {}", e),
            )
        }
    }
}

/// Serves `GET /metrics` until `shutdown` is cancelled.
pub async fn serve_metrics(port: u16, shutdown: CancellationToken) -> Result<()> {
    let app = Router::new().route("/metrics", get(metrics_handler));
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port))
        .await
        .with_context(|| format!("Failed to bind metrics port {}", port))?;

    info!("Metrics available at port {}", port);
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .context("Metrics server failed")?;
    Ok(())
}
