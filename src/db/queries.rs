use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::{PgPool, Row};
use std::str::FromStr;
use uuid::Uuid;

use crate::models::job::{ClassificationJob, ClassificationParameters, JobStatus, JobType};
use crate::models::result::AggregatedResult;
use crate::services::store::StoreError;

const JOB_COLUMNS: &str = r#"
    id, status, job_type, input_bucket, item_keys, custom_labels, top_k,
    confidence_threshold, retry_count, last_error, result,
    created_at, updated_at, completed_at
"#;

fn corrupt(job_id: Uuid, reason: impl Into<String>) -> StoreError {
    StoreError::Corrupt {
        job_id,
        reason: reason.into(),
    }
}

fn job_from_row(row: &PgRow) -> Result<ClassificationJob, StoreError> {
    let id: Uuid = row.try_get("id")?;

    let status_str: String = row.try_get("status")?;
    let status = JobStatus::from_str(&status_str)
        .map_err(|_| corrupt(id, format!("unknown status '{status_str}'")))?;

    let job_type_str: String = row.try_get("job_type")?;
    let job_type = JobType::from_str(&job_type_str)
        .map_err(|_| corrupt(id, format!("unknown job type '{job_type_str}'")))?;

    let top_k: i32 = row.try_get("top_k")?;
    let retry_count: i32 = row.try_get("retry_count")?;
    let item_keys: Json<Vec<String>> = row.try_get("item_keys")?;
    let custom_labels: Json<Vec<String>> = row.try_get("custom_labels")?;
    let result: Option<Json<AggregatedResult>> = row.try_get("result")?;

    Ok(ClassificationJob {
        id,
        status,
        item_keys: item_keys.0,
        parameters: ClassificationParameters {
            job_type,
            custom_labels: custom_labels.0,
            top_k: u32::try_from(top_k).map_err(|_| corrupt(id, "negative top_k"))?,
            confidence_threshold: row.try_get("confidence_threshold")?,
        },
        input_bucket: row.try_get("input_bucket")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        completed_at: row.try_get("completed_at")?,
        retry_count: u32::try_from(retry_count).map_err(|_| corrupt(id, "negative retry_count"))?,
        last_error: row.try_get("last_error")?,
        result: result.map(|r| r.0),
    })
}

/// Insert a new classification job
pub async fn create_job(pool: &PgPool, job: &ClassificationJob) -> Result<(), StoreError> {
    let inserted = sqlx::query(
        r#"
        INSERT INTO classification_jobs (
            id, status, job_type, input_bucket, item_keys, custom_labels, top_k,
            confidence_threshold, retry_count, last_error, result,
            created_at, updated_at, completed_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
        ON CONFLICT (id) DO NOTHING
        "#,
    )
    .bind(job.id)
    .bind(job.status.to_string())
    .bind(job.parameters.job_type.to_string())
    .bind(&job.input_bucket)
    .bind(Json(&job.item_keys))
    .bind(Json(&job.parameters.custom_labels))
    .bind(job.parameters.top_k as i32)
    .bind(job.parameters.confidence_threshold)
    .bind(job.retry_count as i32)
    .bind(job.last_error.as_deref())
    .bind(job.result.as_ref().map(Json))
    .bind(job.created_at)
    .bind(job.updated_at)
    .bind(job.completed_at)
    .execute(pool)
    .await?;

    if inserted.rows_affected() == 0 {
        return Err(StoreError::Conflict(job.id));
    }
    Ok(())
}

/// Get a job by ID
pub async fn get_job(pool: &PgPool, job_id: Uuid) -> Result<Option<ClassificationJob>, StoreError> {
    let row = sqlx::query(&format!(
        "SELECT {JOB_COLUMNS} FROM classification_jobs WHERE id = $1"
    ))
    .bind(job_id)
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(job_from_row).transpose()
}

/// Overwrite every mutable column of an existing job
pub async fn update_job(pool: &PgPool, job: &ClassificationJob) -> Result<(), StoreError> {
    let updated = sqlx::query(
        r#"
        UPDATE classification_jobs
        SET status = $2,
            retry_count = $3,
            last_error = $4,
            result = $5,
            updated_at = $6,
            completed_at = $7
        WHERE id = $1
        "#,
    )
    .bind(job.id)
    .bind(job.status.to_string())
    .bind(job.retry_count as i32)
    .bind(job.last_error.as_deref())
    .bind(job.result.as_ref().map(Json))
    .bind(job.updated_at)
    .bind(job.completed_at)
    .execute(pool)
    .await?;

    if updated.rows_affected() == 0 {
        return Err(StoreError::NotFound(job.id));
    }
    Ok(())
}

/// List jobs, newest first, optionally filtered by status
pub async fn list_jobs(
    pool: &PgPool,
    limit: i64,
    status: Option<JobStatus>,
) -> Result<Vec<ClassificationJob>, StoreError> {
    let rows = sqlx::query(&format!(
        r#"
        SELECT {JOB_COLUMNS}
        FROM classification_jobs
        WHERE ($1::text IS NULL OR status = $1)
        ORDER BY created_at DESC
        LIMIT $2
        "#
    ))
    .bind(status.map(|s| s.to_string()))
    .bind(limit)
    .fetch_all(pool)
    .await?;

    rows.iter().map(job_from_row).collect()
}
