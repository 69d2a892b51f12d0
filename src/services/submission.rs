use garde::Validate;
use std::sync::Arc;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::models::api::{SubmitJobRequest, DEFAULT_CONFIDENCE_THRESHOLD, DEFAULT_TOP_K};
use crate::models::job::{ClassificationJob, ClassificationParameters, JobStatus};
use crate::models::messages::ItemRequestMessage;
use crate::services::locks::JobLocks;
use crate::services::queue::{send_json, MessageQueue};
use crate::services::store::{update_job, JobStore, StoreError};

#[derive(Debug, Clone)]
pub struct SubmissionSettings {
    pub request_queue: String,
    pub input_bucket: String,
}

/// A persisted job whose fan-out is running in the background.
///
/// The handle is only for callers that want to wait (tests, shutdown);
/// the HTTP path drops it and the fan-out's outcome is visible solely
/// through the job record.
#[derive(Debug)]
pub struct SubmittedJob {
    pub job_id: Uuid,
    pub fan_out: JoinHandle<()>,
}

#[derive(Clone)]
pub struct JobSubmissionService {
    store: Arc<dyn JobStore>,
    queue: Arc<dyn MessageQueue>,
    locks: JobLocks,
    settings: SubmissionSettings,
}

impl JobSubmissionService {
    pub fn new(
        store: Arc<dyn JobStore>,
        queue: Arc<dyn MessageQueue>,
        locks: JobLocks,
        settings: SubmissionSettings,
    ) -> Self {
        Self {
            store,
            queue,
            locks,
            settings,
        }
    }

    /// Validate the request and turn it into job parameters.
    pub fn build_job(&self, request: SubmitJobRequest) -> Result<ClassificationJob, SubmitError> {
        request
            .validate()
            .map_err(|report| SubmitError::Validation(report.to_string()))?;

        let custom_labels = if request.job_type.requires_custom_labels() {
            match request.custom_labels {
                Some(labels) if !labels.is_empty() => labels,
                _ => {
                    return Err(SubmitError::Validation(format!(
                        "custom_labels required for {}",
                        request.job_type
                    )))
                }
            }
        } else {
            Vec::new()
        };

        let parameters = ClassificationParameters {
            job_type: request.job_type,
            custom_labels,
            top_k: request.top_k.unwrap_or(DEFAULT_TOP_K),
            confidence_threshold: request
                .confidence_threshold
                .unwrap_or(DEFAULT_CONFIDENCE_THRESHOLD),
        };

        Ok(ClassificationJob::new(
            Uuid::new_v4(),
            request.item_references,
            parameters,
            &self.settings.input_bucket,
        ))
    }

    /// Persist a new `pending` job and start its fan-out on a detached task.
    /// Returns as soon as the record exists; emission may still be running.
    pub async fn submit(&self, request: SubmitJobRequest) -> Result<SubmittedJob, SubmitError> {
        let job = self.build_job(request)?;
        self.store.create(&job).await?;

        metrics::counter!("classification_jobs_submitted_total").increment(1);
        tracing::info!(
            job_id = %job.id,
            job_type = %job.parameters.job_type,
            items = job.item_keys.len(),
            "Job created"
        );

        let job_id = job.id;
        let service = self.clone();
        let fan_out = tokio::spawn(async move { service.fan_out(&job).await });

        Ok(SubmittedJob { job_id, fan_out })
    }

    /// Emit one request message per item. The job is marked `queued` first,
    /// `processing` once every message is sent, and `failed` on the first
    /// send error. Messages already sent are not recalled.
    pub async fn fan_out(&self, job: &ClassificationJob) {
        let job_id = job.id;

        if let Err(e) = self.set_status(job_id, JobStatus::Queued, JobStatus::Pending).await {
            tracing::error!(%job_id, error = %e, "Failed to mark job queued");
        }

        for key in &job.item_keys {
            let message = ItemRequestMessage::for_item(job, key);
            if let Err(e) = send_json(self.queue.as_ref(), &self.settings.request_queue, &message).await {
                tracing::error!(%job_id, item = %key, error = %e, "Failed to queue item");

                let diagnostic = format!("failed to queue job for item {key}: {e}");
                let update = update_job(self.store.as_ref(), &self.locks, job_id, |job| {
                    let changed = job.transition(JobStatus::Failed);
                    if changed {
                        job.last_error = Some(diagnostic);
                    }
                    changed
                })
                .await;
                if let Err(e) = update {
                    tracing::error!(%job_id, error = %e, "Failed to mark job failed");
                }
                metrics::counter!("classification_jobs_failed_total").increment(1);
                return;
            }
            tracing::debug!(%job_id, item = %key, "Queued item");
        }

        if let Err(e) = self.set_status(job_id, JobStatus::Processing, JobStatus::Queued).await {
            tracing::error!(%job_id, error = %e, "Failed to mark job processing");
        }
        tracing::info!(%job_id, items = job.item_keys.len(), "All items queued");
    }

    /// Move to `next` only from `expected`; the reconciler may already have
    /// advanced the job further.
    async fn set_status(
        &self,
        job_id: Uuid,
        next: JobStatus,
        expected: JobStatus,
    ) -> Result<(), StoreError> {
        update_job(self.store.as_ref(), &self.locks, job_id, |job| {
            job.status == expected && job.transition(next)
        })
        .await?;
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Failed to create job: {0}")]
    Store(#[from] StoreError),
}
