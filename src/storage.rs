use std::fmt;
use std::path::Path;

use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use tracing::info;

use crate::config::StorageConfig;
use crate::error::PipelineError;

/// Name of an uploaded photo, shared between the bucket and the detection
/// service. Compared case-sensitively.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StorageReference(String);

impl StorageReference {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StorageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The reference an upload of `local_path` is stored under: its base filename.
pub fn reference_for(local_path: &Path) -> Result<StorageReference, PipelineError> {
    local_path
        .file_name()
        .and_then(|name| name.to_str())
        .map(StorageReference::new)
        .ok_or_else(|| {
            PipelineError::Upload(format!(
                "Path has no usable filename: {}",
                local_path.display()
            ))
        })
}

#[async_trait]
pub trait Uploader: Send + Sync {
    async fn upload(&self, local_path: &Path) -> Result<StorageReference, PipelineError>;
}

/// Uploads staged photos to an S3 bucket.
#[derive(Clone)]
pub struct S3Uploader {
    client: Client,
    bucket_name: String,
}

impl S3Uploader {
    pub fn new(client: Client, bucket_name: String) -> Self {
        Self {
            client,
            bucket_name,
        }
    }

    /// Build the S3 client from the ambient AWS environment, applying the
    /// configured region and endpoint overrides.
    pub async fn from_config(config: &StorageConfig) -> Self {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());
        if let Some(region) = &config.region {
            loader = loader.region(aws_config::Region::new(region.clone()));
        }
        if let Some(endpoint) = &config.endpoint_url {
            loader = loader.endpoint_url(endpoint);
        }
        let sdk_config = loader.load().await;

        let mut builder = aws_sdk_s3::config::Builder::from(&sdk_config);
        if config.endpoint_url.is_some() {
            builder = builder.force_path_style(true);
        }

        info!("S3 uploader configured for bucket: {}", config.bucket);
        Self::new(Client::from_conf(builder.build()), config.bucket.clone())
    }
}

#[async_trait]
impl Uploader for S3Uploader {
    async fn upload(&self, local_path: &Path) -> Result<StorageReference, PipelineError> {
        if !local_path.exists() {
            return Err(PipelineError::Upload(format!(
                "Local file does not exist: {}",
                local_path.display()
            )));
        }
        let reference = reference_for(local_path)?;

        let body = ByteStream::from_path(local_path)
            .await
            .map_err(|e| PipelineError::Upload(e.to_string()))?;

        self.client
            .put_object()
            .bucket(&self.bucket_name)
            .key(reference.as_str())
            .body(body)
            .content_type("image/jpeg")
            .send()
            .await
            .map_err(|e| PipelineError::Upload(e.to_string()))?;

        info!("Uploaded {} to bucket {}", reference, self.bucket_name);
        Ok(reference)
    }
}
