use axum::routing::{get, post};
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;

use crate::app_state::AppState;

pub mod error;
pub mod health;
pub mod jobs;
pub mod metrics;

/// API routes; `/metrics` is mounted separately since it has its own state.
pub fn api_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/api/v1/jobs", post(jobs::submit_job).get(jobs::list_jobs))
        .route("/api/v1/jobs/{job_id}", get(jobs::get_job_status))
        .route("/api/v1/jobs/{job_id}/result", get(jobs::get_job_result))
        .with_state(state)
}

pub fn metrics_router(handle: Arc<PrometheusHandle>) -> Router {
    Router::new().route(
        "/metrics",
        get(metrics::prometheus_metrics).with_state(handle),
    )
}
