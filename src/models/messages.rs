use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::job::{ClassificationJob, ClassificationParameters};
use crate::models::result::ItemResult;

/// Per-item work request sent to the request queue.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ItemRequestMessage {
    pub job_id: Uuid,
    pub item_reference: String,
    #[serde(flatten)]
    pub parameters: ClassificationParameters,
    pub input_bucket: String,
    pub retry_count: u32,
}

impl ItemRequestMessage {
    pub fn for_item(job: &ClassificationJob, item_reference: &str) -> Self {
        Self {
            job_id: job.id,
            item_reference: item_reference.to_string(),
            parameters: job.parameters.clone(),
            input_bucket: job.input_bucket.clone(),
            retry_count: job.retry_count,
        }
    }
}

/// Worker-reported outcome. Accepts both `success`/`failure` and the
/// workers' `completed`/`failed` spellings.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    #[serde(alias = "completed")]
    Success,
    #[serde(alias = "failed")]
    Failure,
}

/// Partial result carried by a success notification.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct StatusPayload {
    #[serde(alias = "detailed_results", default)]
    pub items: Vec<ItemResult>,
}

/// Notification consumed from the status queue.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StatusMessage {
    pub job_id: Uuid,
    #[serde(alias = "status")]
    pub outcome: Outcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<StatusPayload>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StatusMessage {
    pub fn success(job_id: Uuid, items: Vec<ItemResult>) -> Self {
        Self {
            job_id,
            outcome: Outcome::Success,
            result: Some(StatusPayload { items }),
            error: None,
        }
    }

    pub fn failure(job_id: Uuid, error: impl Into<String>) -> Self {
        Self {
            job_id,
            outcome: Outcome::Failure,
            result: None,
            error: Some(error.into()),
        }
    }
}
