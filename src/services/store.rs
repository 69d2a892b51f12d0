use async_trait::async_trait;
use uuid::Uuid;

use crate::models::job::{ClassificationJob, JobStatus};
use crate::services::locks::JobLocks;

/// Persistence contract for job records. Implementations hold no business
/// logic; all state-machine decisions live in the services.
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn create(&self, job: &ClassificationJob) -> Result<(), StoreError>;

    async fn get(&self, job_id: Uuid) -> Result<Option<ClassificationJob>, StoreError>;

    /// Full overwrite of an existing record.
    async fn put(&self, job: &ClassificationJob) -> Result<(), StoreError>;

    /// Most recently created first.
    async fn list(
        &self,
        limit: usize,
        status: Option<JobStatus>,
    ) -> Result<Vec<ClassificationJob>, StoreError>;

    async fn health_check(&self) -> Result<(), StoreError>;
}

/// Read-modify-write a job under its per-job lock.
///
/// `apply` returns whether it changed the job; the record is only written
/// when it did. Returns `None` when the job does not exist.
pub async fn update_job<F>(
    store: &dyn JobStore,
    locks: &JobLocks,
    job_id: Uuid,
    apply: F,
) -> Result<Option<ClassificationJob>, StoreError>
where
    F: FnOnce(&mut ClassificationJob) -> bool,
{
    let _guard = locks.lock(job_id).await;

    let Some(mut job) = store.get(job_id).await? else {
        return Ok(None);
    };

    if apply(&mut job) {
        store.put(&job).await?;
    }

    Ok(Some(job))
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Corrupt job record {job_id}: {reason}")]
    Corrupt { job_id: Uuid, reason: String },

    #[error("Job not found: {0}")]
    NotFound(Uuid),

    #[error("Job already exists: {0}")]
    Conflict(Uuid),

    #[error("Job store unavailable: {0}")]
    Unavailable(String),
}
