use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use uuid::Uuid;

use crate::app_state::AppState;
use crate::models::api::{
    JobStatusResponse, ListJobsQuery, ListJobsResponse, SubmitJobRequest, SubmitJobResponse,
};
use crate::routes::error::ApiError;
use crate::services::query::{self, ResultView};

/// POST /api/v1/jobs — submit a batch for classification.
///
/// Responds once the job record exists; queueing of the individual items
/// continues in the background and its outcome shows up in the job status.
pub async fn submit_job(
    State(state): State<AppState>,
    payload: Result<Json<SubmitJobRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<SubmitJobResponse>), ApiError> {
    let Json(request) = payload?;
    let submitted = state.submission().submit(request).await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(SubmitJobResponse {
            job_id: submitted.job_id,
            status: "queued".to_string(),
            message: "Job submitted successfully".to_string(),
        }),
    ))
}

/// GET /api/v1/jobs — list jobs, newest first.
pub async fn list_jobs(
    State(state): State<AppState>,
    Query(params): Query<ListJobsQuery>,
) -> Result<Json<ListJobsResponse>, ApiError> {
    Ok(Json(query::list_jobs(state.store.as_ref(), &params).await?))
}

/// GET /api/v1/jobs/{job_id}
pub async fn get_job_status(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> Result<Json<JobStatusResponse>, ApiError> {
    query::job_status(state.store.as_ref(), job_id)
        .await?
        .map(Json)
        .ok_or(ApiError::NotFound)
}

/// GET /api/v1/jobs/{job_id}/result
pub async fn get_job_result(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> Result<Response, ApiError> {
    match query::job_result(state.store.as_ref(), job_id).await? {
        None => Err(ApiError::NotFound),
        Some(ResultView::Ready(result)) => Ok(Json(result).into_response()),
        Some(ResultView::Pending(pending)) => {
            Ok((StatusCode::ACCEPTED, Json(pending)).into_response())
        }
        Some(ResultView::Missing) => Err(ApiError::Internal("Results not available".to_string())),
    }
}
