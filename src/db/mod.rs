use async_trait::async_trait;
use sqlx::{postgres::PgPoolOptions, PgPool};
use std::time::Duration;
use uuid::Uuid;

use crate::models::job::{ClassificationJob, JobStatus};
use crate::services::store::{JobStore, StoreError};

/// Initialize PostgreSQL connection pool
pub async fn init_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(20)
        .min_connections(5)
        .acquire_timeout(Duration::from_secs(10))
        .idle_timeout(Duration::from_secs(600))
        .max_lifetime(Duration::from_secs(1800))
        .connect(database_url)
        .await
}

/// Run database migrations
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| sqlx::Error::Migrate(Box::new(e)))
}

/// [`JobStore`] backed by the `classification_jobs` table.
#[derive(Clone)]
pub struct PgJobStore {
    pool: PgPool,
}

impl PgJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn create(&self, job: &ClassificationJob) -> Result<(), StoreError> {
        queries::create_job(&self.pool, job).await
    }

    async fn get(&self, job_id: Uuid) -> Result<Option<ClassificationJob>, StoreError> {
        queries::get_job(&self.pool, job_id).await
    }

    async fn put(&self, job: &ClassificationJob) -> Result<(), StoreError> {
        queries::update_job(&self.pool, job).await
    }

    async fn list(
        &self,
        limit: usize,
        status: Option<JobStatus>,
    ) -> Result<Vec<ClassificationJob>, StoreError> {
        queries::list_jobs(&self.pool, limit as i64, status).await
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

pub mod queries;
