use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use strum::{AsRefStr, Display, EnumString};
use uuid::Uuid;

use crate::models::result::{AggregatedResult, ItemResult};

/// Status of a classification job.
///
/// `Completed` and `Failed` are terminal. Apart from the
/// `Processing -> Retrying -> Processing` cycle, transitions only move forward.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Queued,
    Processing,
    Retrying,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// Whether `self -> next` is a legal move in the job state machine.
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        use JobStatus::*;

        match (self, next) {
            (Completed | Failed, _) => false,
            (Pending, Queued | Processing | Retrying | Completed | Failed) => true,
            (Queued, Processing | Retrying | Completed | Failed) => true,
            (Processing, Processing | Retrying | Completed | Failed) => true,
            (Retrying, Retrying | Processing | Completed | Failed) => true,
            _ => false,
        }
    }
}

/// Kind of classification requested for a job.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum JobType {
    /// Fixed-vocabulary image classification.
    ImageClassification,
    /// Open-vocabulary classification against caller-supplied labels.
    CustomClassification,
}

impl JobType {
    pub fn requires_custom_labels(self) -> bool {
        matches!(self, JobType::CustomClassification)
    }
}

/// Parameters forwarded to the workers. Immutable once the job exists.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClassificationParameters {
    pub job_type: JobType,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub custom_labels: Vec<String>,
    pub top_k: u32,
    pub confidence_threshold: f64,
}

/// A batch classification job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassificationJob {
    #[serde(rename = "job_id")]
    pub id: Uuid,
    pub status: JobStatus,
    pub item_keys: Vec<String>,
    #[serde(flatten)]
    pub parameters: ClassificationParameters,
    pub input_bucket: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    pub retry_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<AggregatedResult>,
}

/// Outcome of recording a failure notification against a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureDecision {
    /// Retry budget remains; the job moved to `Retrying`.
    Retry { retry_count: u32 },
    /// Retry budget exhausted; the job moved to `Failed`.
    Exhausted { retry_count: u32 },
}

impl ClassificationJob {
    /// Build a fresh `Pending` job. Duplicate item keys are dropped, keeping
    /// the first occurrence.
    pub fn new(
        id: Uuid,
        item_keys: Vec<String>,
        parameters: ClassificationParameters,
        input_bucket: impl Into<String>,
    ) -> Self {
        let mut seen = HashSet::new();
        let item_keys = item_keys
            .into_iter()
            .filter(|key| seen.insert(key.clone()))
            .collect();

        let now = Utc::now();
        Self {
            id,
            status: JobStatus::Pending,
            item_keys,
            parameters,
            input_bucket: input_bucket.into(),
            created_at: now,
            updated_at: now,
            completed_at: None,
            retry_count: 0,
            last_error: None,
            result: None,
        }
    }

    /// Move to `next` if the state machine allows it. Stamps `updated_at`,
    /// and `completed_at` on completion. Returns whether the status changed.
    pub fn transition(&mut self, next: JobStatus) -> bool {
        if !self.status.can_transition_to(next) {
            return false;
        }
        if self.status == next {
            return false;
        }

        let now = Utc::now();
        self.status = next;
        self.updated_at = now;
        if next == JobStatus::Completed {
            self.completed_at = Some(now);
        }
        true
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Every submitted item key has a merged result.
    pub fn is_fully_merged(&self) -> bool {
        self.pending_item_keys().is_empty()
    }

    pub fn expects_item(&self, item_reference: &str) -> bool {
        self.item_keys.iter().any(|key| key == item_reference)
    }

    pub fn completed_items(&self) -> usize {
        self.result
            .as_ref()
            .map(|r| r.total_items_completed)
            .unwrap_or(0)
    }

    /// Item keys that have no merged result yet, in submission order.
    pub fn pending_item_keys(&self) -> Vec<&str> {
        self.item_keys
            .iter()
            .filter(|key| {
                self.result
                    .as_ref()
                    .map_or(true, |result| !result.contains(key))
            })
            .map(String::as_str)
            .collect()
    }

    /// Merge item results into the accumulated result, creating it on first
    /// use. Returns the items that were not already present. Results for
    /// references outside `item_keys` are never merged.
    pub fn merge_items(&mut self, items: Vec<ItemResult>) -> Vec<ItemResult> {
        let items: Vec<ItemResult> = items
            .into_iter()
            .filter(|item| self.expects_item(&item.item_reference))
            .collect();
        if items.is_empty() {
            return Vec::new();
        }

        let id = self.id;
        let job_type = self.parameters.job_type;
        let result = self
            .result
            .get_or_insert_with(|| AggregatedResult::new(id, job_type));

        items
            .into_iter()
            .filter_map(|item| result.merge(item))
            .collect()
    }

    /// Count a failure notification against the retry budget.
    ///
    /// `retry_count` never exceeds `max_retries`.
    pub fn record_failure(&mut self, error: &str, max_retries: u32) -> FailureDecision {
        self.retry_count = (self.retry_count + 1).min(max_retries);

        if self.retry_count < max_retries {
            self.transition(JobStatus::Retrying);
            self.last_error = Some(error.to_string());
            FailureDecision::Retry {
                retry_count: self.retry_count,
            }
        } else {
            self.fail(error);
            FailureDecision::Exhausted {
                retry_count: self.retry_count,
            }
        }
    }

    /// Terminally fail the job with the attempts-composed diagnostic.
    pub fn fail(&mut self, error: &str) -> bool {
        let changed = self.transition(JobStatus::Failed);
        if changed {
            self.last_error = Some(format!(
                "failed after {} attempts; last error: {}",
                self.retry_count, error
            ));
        }
        changed
    }
}
