use chrono::{DateTime, Utc};
use garde::Validate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::job::{ClassificationJob, JobStatus, JobType};

pub const DEFAULT_TOP_K: u32 = 5;
pub const DEFAULT_CONFIDENCE_THRESHOLD: f64 = 0.5;
pub const DEFAULT_LIST_LIMIT: usize = 100;
pub const MAX_LIST_LIMIT: usize = 1000;

/// Request to submit a batch classification job.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SubmitJobRequest {
    #[garde(skip)]
    pub job_type: JobType,

    #[serde(alias = "s3_keys")]
    #[garde(length(min = 1), inner(length(min = 1, max = 1024)))]
    pub item_references: Vec<String>,

    #[serde(default)]
    #[garde(inner(length(min = 1, max = 200)))]
    pub custom_labels: Option<Vec<String>>,

    #[serde(default)]
    #[garde(range(min = 1, max = 100))]
    pub top_k: Option<u32>,

    #[serde(default)]
    #[garde(range(min = 0.0, max = 1.0))]
    pub confidence_threshold: Option<f64>,
}

/// Response after submitting a job.
#[derive(Debug, Serialize, Deserialize)]
pub struct SubmitJobResponse {
    pub job_id: Uuid,
    pub status: String,
    pub message: String,
}

/// Response for querying job status.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobStatusResponse {
    pub job_id: Uuid,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_count: Option<u32>,
}

impl From<&ClassificationJob> for JobStatusResponse {
    fn from(job: &ClassificationJob) -> Self {
        let retry_count = (job.last_error.is_some() || job.retry_count > 0).then_some(job.retry_count);
        Self {
            job_id: job.id,
            status: job.status,
            created_at: job.created_at,
            updated_at: job.updated_at,
            completed_at: job.completed_at,
            error: job.last_error.clone(),
            retry_count,
        }
    }
}

/// Body returned by the result endpoint while a job is not completed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobPendingResponse {
    pub job_id: Uuid,
    pub status: JobStatus,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Query string for listing jobs.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListJobsQuery {
    pub limit: Option<usize>,
    pub status: Option<JobStatus>,
}

impl ListJobsQuery {
    pub fn effective_limit(&self) -> usize {
        self.limit
            .unwrap_or(DEFAULT_LIST_LIMIT)
            .clamp(1, MAX_LIST_LIMIT)
    }
}

/// Lightweight listing entry; omits the accumulated result.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobSummary {
    pub job_id: Uuid,
    pub status: JobStatus,
    pub job_type: JobType,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    pub num_items: usize,
}

impl From<&ClassificationJob> for JobSummary {
    fn from(job: &ClassificationJob) -> Self {
        Self {
            job_id: job.id,
            status: job.status,
            job_type: job.parameters.job_type,
            created_at: job.created_at,
            completed_at: job.completed_at,
            num_items: job.item_keys.len(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListJobsResponse {
    pub jobs: Vec<JobSummary>,
    pub total: usize,
}
