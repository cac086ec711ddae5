use std::path::Path;

use async_trait::async_trait;
use s3::creds::Credentials;
use s3::{Bucket, Region};
use tracing::debug;

use crate::error::StoreError;
use crate::ports::ObjectStore;

/// Connection details for an S3-compatible bucket.
#[derive(Debug, Clone, Copy)]
pub struct S3Location<'a> {
    pub bucket: &'a str,
    pub region: &'a str,
    /// Custom endpoint for S3-compatible services.
    pub endpoint: Option<&'a str>,
    pub path_style: bool,
}

/// Uploads artifacts to an S3 bucket.
pub struct S3Store {
    bucket: Box<Bucket>,
}

impl S3Store {
    /// Without static keys the credentials come from the environment or the
    /// shared AWS profile.
    pub fn new(
        location: S3Location<'_>,
        access_key: Option<&str>,
        secret_key: Option<&str>,
    ) -> Result<Self, StoreError> {
        let region = match location.endpoint {
            Some(endpoint) => Region::Custom {
                region: location.region.to_string(),
                endpoint: endpoint.to_string(),
            },
            None => location
                .region
                .parse()
                .map_err(|e| StoreError::Backend(format!("invalid region: {e}")))?,
        };
        let credentials = Credentials::new(access_key, secret_key, None, None, None)
            .map_err(|e| StoreError::Backend(format!("credentials: {e}")))?;

        let mut bucket = Bucket::new(location.bucket, region, credentials)
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        if location.path_style {
            bucket = bucket.with_path_style();
        }
        Ok(Self { bucket })
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn put(&self, key: &str, local_path: &Path) -> Result<(), StoreError> {
        let content = tokio::fs::read(local_path)
            .await
            .map_err(|source| StoreError::Read {
                path: local_path.to_path_buf(),
                source,
            })?;

        let response = self
            .bucket
            .put_object_with_content_type(key, &content, content_type(key))
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        let status = response.status_code();
        if !(200..300).contains(&status) {
            return Err(StoreError::Rejected {
                key: key.to_string(),
                status,
            });
        }
        debug!(key, bytes = content.len(), "Object stored");
        Ok(())
    }
}

fn content_type(key: &str) -> &'static str {
    match Path::new(key).extension().and_then(|ext| ext.to_str()) {
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("h264") => "video/h264",
        _ => "application/octet-stream",
    }
}
