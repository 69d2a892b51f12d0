use std::sync::Arc;

use crate::config::AppConfig;
use crate::db::{self, PgJobStore};
use crate::services::{
    locks::JobLocks,
    materializer::OutputMaterializer,
    queue::{MessageQueue, RedisQueue},
    reconciler::StatusReconciler,
    storage::{BlobStore, S3BlobStore},
    store::JobStore,
    submission::JobSubmissionService,
};

/// Shared application state passed to all route handlers and the status
/// consumer. Submission and reconciliation share one lock table.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn JobStore>,
    pub queue: Arc<dyn MessageQueue>,
    pub blobs: Arc<dyn BlobStore>,
    pub locks: JobLocks,
    pub config: Arc<AppConfig>,
}

impl AppState {
    pub fn new(
        store: Arc<dyn JobStore>,
        queue: Arc<dyn MessageQueue>,
        blobs: Arc<dyn BlobStore>,
        config: AppConfig,
    ) -> Self {
        Self {
            store,
            queue,
            blobs,
            locks: JobLocks::new(),
            config: Arc::new(config),
        }
    }

    /// Connect to PostgreSQL (running migrations), Redis and S3.
    pub async fn connect(config: AppConfig) -> Result<Self, Box<dyn std::error::Error>> {
        tracing::info!("Connecting to PostgreSQL database");
        let pool = db::init_pool(&config.database_url).await?;

        tracing::info!("Running database migrations");
        db::run_migrations(&pool).await?;

        tracing::info!("Connecting to Redis queues");
        let queue = RedisQueue::new(&config.redis_url, config.queue_options())?;

        tracing::info!("Initializing S3 storage client");
        let blobs = S3BlobStore::new(
            &config.s3_region,
            &config.s3_endpoint,
            &config.s3_access_key,
            &config.s3_secret_key,
            config.s3_path_style,
        )?;

        Ok(Self::new(
            Arc::new(PgJobStore::new(pool)),
            Arc::new(queue),
            Arc::new(blobs),
            config,
        ))
    }

    pub fn submission(&self) -> JobSubmissionService {
        JobSubmissionService::new(
            Arc::clone(&self.store),
            Arc::clone(&self.queue),
            self.locks.clone(),
            self.config.submission_settings(),
        )
    }

    pub fn reconciler(&self) -> StatusReconciler {
        StatusReconciler::new(
            Arc::clone(&self.store),
            Arc::clone(&self.queue),
            OutputMaterializer::new(Arc::clone(&self.blobs), &self.config.output_bucket),
            self.locks.clone(),
            self.config.reconciler_settings(),
        )
    }
}
