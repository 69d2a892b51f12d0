use serde::Deserialize;
use std::time::Duration;

use crate::services::queue::RedisQueueOptions;
use crate::services::reconciler::ReconcilerSettings;
use crate::services::submission::SubmissionSettings;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Server bind address (e.g., "0.0.0.0:8080"). Unused by the standalone reconciler.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// PostgreSQL connection string
    pub database_url: String,

    /// Redis connection string for the request and status queues
    pub redis_url: String,

    /// Queue the workers consume per-item requests from
    #[serde(default = "default_request_queue")]
    pub request_queue: String,

    /// Queue the workers report outcomes to
    #[serde(default = "default_status_queue")]
    pub status_queue: String,

    /// Bucket holding the submitted items
    pub input_bucket: String,

    /// Bucket receiving label-organized copies
    pub output_bucket: String,

    /// S3-compatible endpoint URL
    pub s3_endpoint: String,

    #[serde(default = "default_s3_region")]
    pub s3_region: String,

    pub s3_access_key: String,

    pub s3_secret_key: String,

    /// Address buckets as `endpoint/bucket` (MinIO and friends)
    #[serde(default)]
    pub s3_path_style: bool,

    /// Failure notifications tolerated before a job is terminally failed
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_receive_batch_size")]
    pub receive_batch_size: usize,

    /// Long-poll wait per receive, in seconds
    #[serde(default = "default_receive_wait_secs")]
    pub receive_wait_secs: u64,

    /// Seconds before an unacknowledged message is redelivered
    #[serde(default = "default_visibility_timeout_secs")]
    pub visibility_timeout_secs: u64,

    /// Run the status consumer inside the API process
    #[serde(default = "default_run_reconciler")]
    pub run_reconciler: bool,
}

fn default_bind_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_request_queue() -> String {
    "requests".to_string()
}

fn default_status_queue() -> String {
    "status".to_string()
}

fn default_s3_region() -> String {
    "us-east-1".to_string()
}

fn default_max_retries() -> u32 {
    2
}

fn default_receive_batch_size() -> usize {
    10
}

fn default_receive_wait_secs() -> u64 {
    20
}

fn default_visibility_timeout_secs() -> u64 {
    300
}

fn default_run_reconciler() -> bool {
    true
}

impl AppConfig {
    pub fn from_env() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env()
    }

    pub fn queue_options(&self) -> RedisQueueOptions {
        RedisQueueOptions {
            batch_size: self.receive_batch_size,
            wait: Duration::from_secs(self.receive_wait_secs),
            visibility_timeout: Duration::from_secs(self.visibility_timeout_secs),
        }
    }

    pub fn submission_settings(&self) -> SubmissionSettings {
        SubmissionSettings {
            request_queue: self.request_queue.clone(),
            input_bucket: self.input_bucket.clone(),
        }
    }

    pub fn reconciler_settings(&self) -> ReconcilerSettings {
        ReconcilerSettings {
            status_queue: self.status_queue.clone(),
            request_queue: self.request_queue.clone(),
            max_retries: self.max_retries,
        }
    }
}
