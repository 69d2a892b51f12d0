//! Status reconciler: folds at-least-once worker notifications into the
//! canonical job record.
//!
//! Every mutation of a job happens under that job's entry in [`JobLocks`]:
//! read, in-memory merge and the record write. Output copies and queue I/O
//! never run under a job lock; copied locations are recorded afterwards in a
//! second short locked write. A message is acknowledged only after its effect
//! is persisted (or after deciding it has no effect), so a crash mid-merge is
//! recovered by redelivery and the idempotent merge.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinSet;
use uuid::Uuid;

use crate::models::job::{ClassificationJob, FailureDecision, JobStatus};
use crate::models::messages::{ItemRequestMessage, Outcome, StatusMessage};
use crate::models::result::ItemResult;
use crate::services::locks::JobLocks;
use crate::services::materializer::OutputMaterializer;
use crate::services::queue::{send_json, MessageQueue, QueueError, ReceivedMessage};
use crate::services::store::{update_job, JobStore, StoreError};

const RECEIVE_ERROR_BACKOFF: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct ReconcilerSettings {
    pub status_queue: String,
    pub request_queue: String,
    pub max_retries: u32,
}

/// What handling a single status message amounted to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    /// Items merged (possibly zero new ones); `status` is the job's status afterwards.
    Merged {
        job_id: Uuid,
        new_items: usize,
        status: JobStatus,
    },
    /// Every item in the message had already been merged.
    Duplicate { job_id: Uuid },
    /// Failure counted; remaining items were re-sent.
    Retried { job_id: Uuid, retry_count: u32 },
    /// Failure counted and the job is now terminally failed.
    Failed { job_id: Uuid, retry_count: u32 },
    /// The job is terminal or the message carried nothing to apply.
    Ignored { job_id: Uuid },
    UnknownJob { job_id: Uuid },
    Malformed,
}

#[derive(Clone)]
pub struct StatusReconciler {
    store: Arc<dyn JobStore>,
    queue: Arc<dyn MessageQueue>,
    materializer: OutputMaterializer,
    locks: JobLocks,
    settings: ReconcilerSettings,
}

impl StatusReconciler {
    pub fn new(
        store: Arc<dyn JobStore>,
        queue: Arc<dyn MessageQueue>,
        materializer: OutputMaterializer,
        locks: JobLocks,
        settings: ReconcilerSettings,
    ) -> Self {
        Self {
            store,
            queue,
            materializer,
            locks,
            settings,
        }
    }

    /// Consume the status queue until `shutdown` flips to `true`, handling
    /// each message on its own task. In-flight tasks are drained before
    /// returning.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let this = Arc::new(self);
        let mut tasks = JoinSet::new();

        tracing::info!(queue = %this.settings.status_queue, "Starting status listener");

        loop {
            if *shutdown.borrow() {
                break;
            }

            let received = tokio::select! {
                _ = shutdown.changed() => break,
                received = this.queue.receive(&this.settings.status_queue) => received,
            };

            match received {
                Ok(messages) => {
                    for message in messages {
                        let worker = Arc::clone(&this);
                        tasks.spawn(async move { worker.process_message(message).await });
                    }
                }
                Err(e) => {
                    tracing::error!(error = %e, "Error receiving status messages");
                    tokio::select! {
                        _ = shutdown.changed() => break,
                        _ = tokio::time::sleep(RECEIVE_ERROR_BACKOFF) => {}
                    }
                }
            }

            while let Some(joined) = tasks.try_join_next() {
                if let Err(e) = joined {
                    tracing::error!(error = %e, "Status handler task panicked");
                }
            }
        }

        tracing::info!(in_flight = tasks.len(), "Status listener stopping, draining handlers");
        while tasks.join_next().await.is_some() {}
    }

    /// Handle one received message and acknowledge it unless handling hit a
    /// store or queue error, in which case it is left for redelivery.
    pub async fn process_message(&self, message: ReceivedMessage) {
        let start = Instant::now();

        match self.handle_body(&message.body).await {
            Ok(disposition) => {
                tracing::debug!(?disposition, "Status message handled");
                metrics::counter!("status_messages_processed_total").increment(1);
                if let Err(e) = self
                    .queue
                    .delete(&self.settings.status_queue, &message.handle)
                    .await
                {
                    tracing::warn!(error = %e, "Failed to acknowledge status message");
                }
            }
            Err(e) => {
                tracing::error!(error = %e, "Status message not applied, leaving it for redelivery");
            }
        }

        metrics::histogram!("status_reconcile_seconds").record(start.elapsed().as_secs_f64());
    }

    /// Parse and apply a raw status message body. Malformed bodies are not
    /// an error: they are reported as [`Disposition::Malformed`] so the
    /// caller drops them.
    pub async fn handle_body(&self, body: &str) -> Result<Disposition, ReconcileError> {
        match serde_json::from_str::<StatusMessage>(body) {
            Ok(message) => self.handle_status(message).await,
            Err(e) => {
                tracing::warn!(error = %e, "Dropping malformed status message");
                Ok(Disposition::Malformed)
            }
        }
    }

    pub async fn handle_status(&self, message: StatusMessage) -> Result<Disposition, ReconcileError> {
        tracing::info!(job_id = %message.job_id, outcome = ?message.outcome, "Processing status update");

        match message.outcome {
            Outcome::Success => {
                let items = message.result.map(|r| r.items).unwrap_or_default();
                self.apply_success(message.job_id, items).await
            }
            Outcome::Failure => {
                let error = message.error.unwrap_or_else(|| "unknown error".to_string());
                self.apply_failure(message.job_id, &error).await
            }
        }
    }

    async fn apply_success(
        &self,
        job_id: Uuid,
        items: Vec<ItemResult>,
    ) -> Result<Disposition, ReconcileError> {
        let (job, merged) = {
            let _guard = self.locks.lock(job_id).await;

            let Some(mut job) = self.store.get(job_id).await? else {
                tracing::warn!(%job_id, "Job not found, dropping status update");
                return Ok(Disposition::UnknownJob { job_id });
            };

            if items.is_empty() {
                tracing::warn!(%job_id, "Success notification without item results");
                return Ok(Disposition::Ignored { job_id });
            }

            let (items, unknown): (Vec<ItemResult>, Vec<ItemResult>) = items
                .into_iter()
                .partition(|item| job.expects_item(&item.item_reference));
            if !unknown.is_empty() {
                let references: Vec<&str> =
                    unknown.iter().map(|i| i.item_reference.as_str()).collect();
                metrics::counter!("status_messages_unknown_items_total")
                    .increment(unknown.len() as u64);
                tracing::warn!(%job_id, ?references, "Dropping results for items not in job");
            }
            if items.is_empty() {
                return Ok(Disposition::Ignored { job_id });
            }

            let offered = items.len();
            let merged = job.merge_items(items);
            let duplicates = offered - merged.len();
            if duplicates > 0 {
                metrics::counter!("status_messages_duplicate_items_total")
                    .increment(duplicates as u64);
                tracing::info!(%job_id, duplicates, "Skipped already merged items");
            }
            if merged.is_empty() {
                return Ok(Disposition::Duplicate { job_id });
            }

            if job.status.is_terminal() {
                // A job failed out-of-band still accumulates late results.
                tracing::info!(%job_id, status = %job.status, "Merged results into terminal job");
            } else {
                let next = if job.is_fully_merged() {
                    JobStatus::Completed
                } else {
                    JobStatus::Processing
                };
                job.transition(next);
                job.last_error = None;
                if next == JobStatus::Completed {
                    metrics::counter!("classification_jobs_completed_total").increment(1);
                    tracing::info!(
                        %job_id,
                        items = job.completed_items(),
                        "Job completed"
                    );
                }
            }
            job.touch();

            self.store.put(&job).await?;
            (job, merged)
        };

        self.record_outputs(&job, &merged).await;

        Ok(Disposition::Merged {
            job_id,
            new_items: merged.len(),
            status: job.status,
        })
    }

    /// Copy newly merged items to the output area, then record where they
    /// landed. Best effort: failures are logged and never undo the merge.
    async fn record_outputs(&self, job: &ClassificationJob, items: &[ItemResult]) {
        let mut locations = Vec::new();
        for item in items {
            if let Some(location) = self.materializer.materialize(job, item).await {
                locations.push((item.item_reference.clone(), location));
            }
        }
        if locations.is_empty() {
            return;
        }

        let recorded = update_job(self.store.as_ref(), &self.locks, job.id, |job| {
            let Some(result) = job.result.as_mut() else {
                return false;
            };
            for (reference, location) in locations {
                result.record_output(&reference, location);
            }
            true
        })
        .await;

        if let Err(e) = recorded {
            tracing::warn!(job_id = %job.id, error = %e, "Failed to record output locations");
        }
    }

    /// A failure notification fails the whole remaining job, since workers do
    /// not say which item in a multi-item request failed. Retries re-send
    /// every item without a merged result.
    async fn apply_failure(&self, job_id: Uuid, error: &str) -> Result<Disposition, ReconcileError> {
        let (decision, requests) = {
            let _guard = self.locks.lock(job_id).await;

            let Some(mut job) = self.store.get(job_id).await? else {
                tracing::warn!(%job_id, "Job not found, dropping failure notification");
                return Ok(Disposition::UnknownJob { job_id });
            };

            if job.status.is_terminal() {
                tracing::info!(%job_id, status = %job.status, error, "Ignoring failure for terminal job");
                return Ok(Disposition::Ignored { job_id });
            }

            let decision = job.record_failure(error, self.settings.max_retries);
            let requests: Vec<ItemRequestMessage> = match decision {
                FailureDecision::Retry { .. } => job
                    .pending_item_keys()
                    .into_iter()
                    .map(|key| ItemRequestMessage::for_item(&job, key))
                    .collect(),
                FailureDecision::Exhausted { .. } => Vec::new(),
            };

            self.store.put(&job).await?;
            (decision, requests)
        };

        let retry_count = match decision {
            FailureDecision::Exhausted { retry_count } => {
                metrics::counter!("classification_jobs_failed_total").increment(1);
                tracing::warn!(%job_id, retry_count, error, "Job failed after max retries");
                return Ok(Disposition::Failed { job_id, retry_count });
            }
            FailureDecision::Retry { retry_count } => retry_count,
        };

        metrics::counter!("classification_jobs_retried_total").increment(1);
        tracing::info!(%job_id, retry_count, items = requests.len(), "Re-queueing job for retry");

        match self.resend(&requests).await {
            Ok(()) => {
                // The retry is already persisted and re-sent; leaving the
                // message for redelivery would count the failure twice.
                let resumed = update_job(self.store.as_ref(), &self.locks, job_id, |job| {
                    job.status == JobStatus::Retrying && job.transition(JobStatus::Processing)
                })
                .await;
                if let Err(e) = resumed {
                    tracing::warn!(%job_id, error = %e, "Re-queued job left in retrying state");
                }
                Ok(Disposition::Retried { job_id, retry_count })
            }
            Err(e) => {
                tracing::error!(%job_id, error = %e, "Failed to re-queue job");
                let send_error = e.to_string();
                let job = update_job(self.store.as_ref(), &self.locks, job_id, |job| {
                    job.fail(&send_error)
                })
                .await?;
                if job.is_some_and(|j| j.status == JobStatus::Failed) {
                    metrics::counter!("classification_jobs_failed_total").increment(1);
                }
                Ok(Disposition::Failed { job_id, retry_count })
            }
        }
    }

    async fn resend(&self, requests: &[ItemRequestMessage]) -> Result<(), QueueError> {
        for request in requests {
            send_json(self.queue.as_ref(), &self.settings.request_queue, request).await?;
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    #[error("Job store error: {0}")]
    Store(#[from] StoreError),
}
