use async_trait::async_trait;
use s3::creds::Credentials;
use s3::{Bucket, Region};
use std::fmt;

/// Address of an object in the blob store.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BlobLocation {
    pub bucket: String,
    pub key: String,
}

impl BlobLocation {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
        }
    }
}

impl fmt::Display for BlobLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s3://{}/{}", self.bucket, self.key)
    }
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn copy(&self, src: &BlobLocation, dst: &BlobLocation) -> Result<(), StorageError>;
}

/// Client for S3-compatible object storage.
pub struct S3BlobStore {
    region: Region,
    credentials: Credentials,
    path_style: bool,
}

impl S3BlobStore {
    pub fn new(
        region: &str,
        endpoint: &str,
        access_key: &str,
        secret_key: &str,
        path_style: bool,
    ) -> Result<Self, StorageError> {
        let region = Region::Custom {
            region: region.to_string(),
            endpoint: endpoint.to_string(),
        };

        let credentials =
            Credentials::new(Some(access_key), Some(secret_key), None, None, None)
                .map_err(|e| StorageError::Config(e.to_string()))?;

        Ok(Self {
            region,
            credentials,
            path_style,
        })
    }

    fn bucket(&self, name: &str) -> Result<Box<Bucket>, StorageError> {
        let bucket = Bucket::new(name, self.region.clone(), self.credentials.clone())
            .map_err(|e| StorageError::Config(e.to_string()))?;
        Ok(if self.path_style {
            bucket.with_path_style()
        } else {
            bucket
        })
    }
}

fn check_status(status: u16) -> Result<(), StorageError> {
    if (200..300).contains(&status) {
        Ok(())
    } else {
        Err(StorageError::Status(status))
    }
}

#[async_trait]
impl BlobStore for S3BlobStore {
    /// Server-side copy within a bucket; across buckets the object is read
    /// and re-written.
    async fn copy(&self, src: &BlobLocation, dst: &BlobLocation) -> Result<(), StorageError> {
        let dst_bucket = self.bucket(&dst.bucket)?;

        if src.bucket == dst.bucket {
            let status = dst_bucket.copy_object_internal(&src.key, &dst.key).await?;
            return check_status(status);
        }

        let src_bucket = self.bucket(&src.bucket)?;
        let object = src_bucket.get_object(&src.key).await?;
        check_status(object.status_code())?;

        let response = dst_bucket.put_object(&dst.key, object.as_slice()).await?;
        check_status(response.status_code())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("S3 operation failed: {0}")]
    S3(#[from] s3::error::S3Error),

    #[error("S3 returned status {0}")]
    Status(u16),

    #[error("Storage configuration error: {0}")]
    Config(String),

    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}
