//! Test helpers: an in-memory harness wiring submission, reconciliation and
//! the HTTP router together, plus client helpers for the end-to-end suite.
#![allow(dead_code)]

pub mod memory;

use axum::body::Body;
use axum::http::{Request, Response, StatusCode};
use axum::Router;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tower::ServiceExt;
use uuid::Uuid;

use memory::{MemoryBlobStore, MemoryJobStore, MemoryQueue};

use classify_jobs::app_state::AppState;
use classify_jobs::config::AppConfig;
use classify_jobs::models::api::{JobStatusResponse, SubmitJobRequest, SubmitJobResponse};
use classify_jobs::models::job::{ClassificationJob, JobStatus};
use classify_jobs::models::messages::{ItemRequestMessage, StatusMessage};
use classify_jobs::routes;
use classify_jobs::services::{
    queue::MessageQueue,
    reconciler::{Disposition, StatusReconciler},
    store::JobStore,
    submission::JobSubmissionService,
};

pub const REQUEST_QUEUE: &str = "requests";
pub const STATUS_QUEUE: &str = "status";
pub const INPUT_BUCKET: &str = "classifier-input";
pub const OUTPUT_BUCKET: &str = "classifier-output";
pub const MAX_RETRIES: u32 = 2;

pub fn test_config() -> AppConfig {
    AppConfig {
        bind_addr: "127.0.0.1:0".to_string(),
        database_url: "postgres://unused".to_string(),
        redis_url: "redis://unused".to_string(),
        request_queue: REQUEST_QUEUE.to_string(),
        status_queue: STATUS_QUEUE.to_string(),
        input_bucket: INPUT_BUCKET.to_string(),
        output_bucket: OUTPUT_BUCKET.to_string(),
        s3_endpoint: "http://localhost:9000".to_string(),
        s3_region: "us-east-1".to_string(),
        s3_access_key: "test".to_string(),
        s3_secret_key: "test".to_string(),
        s3_path_style: true,
        max_retries: MAX_RETRIES,
        receive_batch_size: 10,
        receive_wait_secs: 1,
        visibility_timeout_secs: 30,
        run_reconciler: false,
    }
}

/// Application state over in-memory adapters, with handles kept to the
/// concrete adapters for failure injection and inspection.
pub struct Harness {
    pub state: AppState,
    pub store: Arc<MemoryJobStore>,
    pub queue: Arc<MemoryQueue>,
    pub blobs: Arc<MemoryBlobStore>,
    pub submission: JobSubmissionService,
    pub reconciler: StatusReconciler,
}

impl Harness {
    pub fn new() -> Self {
        let store = Arc::new(MemoryJobStore::new());
        let queue = Arc::new(MemoryQueue::new(10));
        let blobs = Arc::new(MemoryBlobStore::new());

        let state = AppState::new(store.clone(), queue.clone(), blobs.clone(), test_config());
        let submission = state.submission();
        let reconciler = state.reconciler();

        Self {
            state,
            store,
            queue,
            blobs,
            submission,
            reconciler,
        }
    }

    pub fn app(&self) -> Router {
        routes::api_router(self.state.clone())
    }

    /// Submit and wait for the background fan-out to finish.
    pub async fn submit(&self, request: SubmitJobRequest) -> Uuid {
        let submitted = self
            .submission
            .submit(request)
            .await
            .expect("submission rejected");
        submitted.fan_out.await.expect("fan-out task panicked");
        submitted.job_id
    }

    pub async fn job(&self, job_id: Uuid) -> ClassificationJob {
        self.store
            .get(job_id)
            .await
            .expect("store error")
            .expect("job missing")
    }

    /// Apply a notification directly, as the consumer would after receiving it.
    pub async fn deliver(&self, message: &StatusMessage) -> Disposition {
        let body = serde_json::to_string(message).expect("serialize status message");
        self.reconciler
            .handle_body(&body)
            .await
            .expect("reconcile failed")
    }

    /// Enqueue a raw body on the status queue and run one consume pass.
    pub async fn deliver_raw_via_queue(&self, body: &str) {
        self.queue.push(STATUS_QUEUE, body);
        self.consume_status_queue().await;
    }

    pub async fn deliver_via_queue(&self, message: &StatusMessage) {
        let body = serde_json::to_string(message).expect("serialize status message");
        self.deliver_raw_via_queue(&body).await;
    }

    /// Receive whatever is waiting on the status queue and process it.
    pub async fn consume_status_queue(&self) {
        let received = self
            .queue
            .receive(STATUS_QUEUE)
            .await
            .expect("receive failed");
        for message in received {
            self.reconciler.process_message(message).await;
        }
    }

    /// Take every request message emitted so far.
    pub fn take_requests(&self) -> Vec<ItemRequestMessage> {
        self.queue
            .drain(REQUEST_QUEUE)
            .iter()
            .map(|body| serde_json::from_str(body).expect("request message is valid JSON"))
            .collect()
    }
}

pub async fn send(app: Router, request: Request<Body>) -> Response<Body> {
    app.oneshot(request).await.expect("router is infallible")
}

pub async fn get(app: Router, uri: &str) -> Response<Body> {
    let request = Request::builder()
        .uri(uri)
        .body(Body::empty())
        .expect("valid request");
    send(app, request).await
}

pub async fn post_json(app: Router, uri: &str, body: &serde_json::Value) -> Response<Body> {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .expect("valid request");
    send(app, request).await
}

pub async fn body_json<T: DeserializeOwned>(response: Response<Body>) -> T {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read body");
    serde_json::from_slice(&bytes).expect("body is JSON")
}

/// Wait for the job to leave `pending`/`queued` after an HTTP submission,
/// whose fan-out runs detached.
pub async fn wait_for_fan_out(harness: &Harness, job_id: Uuid) -> ClassificationJob {
    for _ in 0..200 {
        let job = harness.job(job_id).await;
        if !matches!(job.status, JobStatus::Pending | JobStatus::Queued) {
            return job;
        }
        sleep(Duration::from_millis(5)).await;
    }
    panic!("fan-out for {job_id} did not finish");
}

pub fn assert_status(response: &Response<Body>, expected: StatusCode) {
    assert_eq!(response.status(), expected, "unexpected HTTP status");
}

/// Submit a job through a running server
pub async fn submit_job(
    client: &reqwest::Client,
    base_url: &str,
    request: &SubmitJobRequest,
) -> Result<SubmitJobResponse, Box<dyn std::error::Error>> {
    let response = client
        .post(format!("{}/api/v1/jobs", base_url))
        .json(request)
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        let error_text = response.text().await?;
        return Err(format!("Submit failed with status {}: {}", status, error_text).into());
    }

    Ok(response.json::<SubmitJobResponse>().await?)
}

/// Poll job status until it reaches a terminal state (with timeout)
pub async fn poll_job_status(
    client: &reqwest::Client,
    base_url: &str,
    job_id: Uuid,
    timeout_secs: u64,
) -> Result<JobStatusResponse, Box<dyn std::error::Error>> {
    let max_attempts = timeout_secs * 2; // Poll every 500ms

    for _ in 0..max_attempts {
        let response = client
            .get(format!("{}/api/v1/jobs/{}", base_url, job_id))
            .send()
            .await?;

        if !response.status().is_success() {
            let error_text = response.text().await?;
            return Err(format!("Status check failed: {}", error_text).into());
        }

        let status_response = response.json::<JobStatusResponse>().await?;
        if status_response.status.is_terminal() {
            return Ok(status_response);
        }
        sleep(Duration::from_millis(500)).await;
    }

    Err(format!("Job did not finish within {} seconds", timeout_secs).into())
}
