use uuid::Uuid;

use crate::models::api::{
    JobPendingResponse, JobStatusResponse, JobSummary, ListJobsQuery, ListJobsResponse,
};
use crate::models::job::JobStatus;
use crate::models::result::AggregatedResult;
use crate::services::store::{JobStore, StoreError};

/// Answer to a result query for an existing job.
#[derive(Debug, Clone, PartialEq)]
pub enum ResultView {
    Ready(AggregatedResult),
    Pending(JobPendingResponse),
    /// Completed, yet no result stored. Should not happen.
    Missing,
}

pub async fn job_status(
    store: &dyn JobStore,
    job_id: Uuid,
) -> Result<Option<JobStatusResponse>, StoreError> {
    Ok(store.get(job_id).await?.as_ref().map(JobStatusResponse::from))
}

pub async fn job_result(store: &dyn JobStore, job_id: Uuid) -> Result<Option<ResultView>, StoreError> {
    let Some(job) = store.get(job_id).await? else {
        return Ok(None);
    };

    if job.status != JobStatus::Completed {
        let message = match job.status {
            JobStatus::Failed => "Job failed",
            _ => "Job is still processing",
        };
        return Ok(Some(ResultView::Pending(JobPendingResponse {
            job_id: job.id,
            status: job.status,
            message: message.to_string(),
            error: job.last_error,
        })));
    }

    Ok(Some(match job.result {
        Some(result) => ResultView::Ready(result),
        None => ResultView::Missing,
    }))
}

pub async fn list_jobs(
    store: &dyn JobStore,
    query: &ListJobsQuery,
) -> Result<ListJobsResponse, StoreError> {
    let jobs = store.list(query.effective_limit(), query.status).await?;
    let jobs: Vec<JobSummary> = jobs.iter().map(JobSummary::from).collect();

    Ok(ListJobsResponse {
        total: jobs.len(),
        jobs,
    })
}
