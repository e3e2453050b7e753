//! Destinations for metrics files.

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::Region;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as S3Client;
use std::path::PathBuf;
use tracing::debug;

use crate::error::{AuditError, Result};

/// Stores a finished metrics file under a key.
#[async_trait]
pub trait Uploader: Send + Sync {
    /// Writes `body` to `key` and returns where it ended up.
    async fn upload(&self, key: &str, body: Vec<u8>) -> Result<String>;
}

/// Uploads to an S3 bucket.
#[derive(Debug, Clone)]
pub struct S3Uploader {
    client: S3Client,
    bucket: String,
}

impl S3Uploader {
    pub fn new(client: S3Client, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
    }

    /// Builds an S3 client for `region` from the default credential chain.
    pub async fn connect(region: &str, bucket: impl Into<String>) -> Self {
        let sdk_config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(region.to_string()))
            .load()
            .await;
        Self::new(S3Client::new(&sdk_config), bucket)
    }
}

#[async_trait]
impl Uploader for S3Uploader {
    async fn upload(&self, key: &str, body: Vec<u8>) -> Result<String> {
        let destination = format!("s3://{}/{}", self.bucket, key);
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(body))
            .content_type("text/csv")
            .send()
            .await
            .map_err(|e| {
                AuditError::upload(format!(
                    "Failed to write {destination}: {}",
                    DisplayErrorContext(&e)
                ))
            })?;

        debug!("Uploaded {}", destination);
        Ok(destination)
    }
}

/// Writes files below a local directory, mirroring the key layout.
#[derive(Debug, Clone)]
pub struct LocalUploader {
    root: PathBuf,
}

impl LocalUploader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl Uploader for LocalUploader {
    async fn upload(&self, key: &str, body: Vec<u8>) -> Result<String> {
        let path = self.root.join(key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                AuditError::upload(format!("Failed to create {}: {e}", parent.display()))
            })?;
        }
        tokio::fs::write(&path, body)
            .await
            .map_err(|e| AuditError::upload(format!("Failed to write {}: {e}", path.display())))?;

        debug!("Wrote {}", path.display());
        Ok(path.display().to_string())
    }
}
