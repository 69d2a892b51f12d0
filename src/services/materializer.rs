use std::sync::Arc;
use uuid::Uuid;

use crate::models::job::ClassificationJob;
use crate::models::result::ItemResult;
use crate::services::storage::{BlobLocation, BlobStore};

/// Copies classified items into a label-organized output area.
#[derive(Clone)]
pub struct OutputMaterializer {
    blobs: Arc<dyn BlobStore>,
    output_bucket: String,
}

impl OutputMaterializer {
    pub fn new(blobs: Arc<dyn BlobStore>, output_bucket: impl Into<String>) -> Self {
        Self {
            blobs,
            output_bucket: output_bucket.into(),
        }
    }

    /// `{job_id}/{label}/{display_name}` in the output bucket.
    pub fn output_location(&self, job_id: Uuid, item: &ItemResult) -> BlobLocation {
        BlobLocation::new(
            &self.output_bucket,
            format!("{}/{}/{}", job_id, item.label_bucket(), item.display_name),
        )
    }

    /// Best effort: a failed copy is logged and yields `None`, it never
    /// blocks the job.
    pub async fn materialize(&self, job: &ClassificationJob, item: &ItemResult) -> Option<String> {
        let src = BlobLocation::new(&job.input_bucket, &item.item_reference);
        let dst = self.output_location(job.id, item);

        match self.blobs.copy(&src, &dst).await {
            Ok(()) => {
                tracing::debug!(job_id = %job.id, src = %src, dst = %dst, "Materialized item");
                Some(dst.to_string())
            }
            Err(e) => {
                metrics::counter!("output_materialization_failures_total").increment(1);
                tracing::warn!(
                    job_id = %job.id,
                    item = %item.item_reference,
                    error = %e,
                    "Failed to copy item to output location"
                );
                None
            }
        }
    }
}
