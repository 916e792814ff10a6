//! Blob storage access (MinIO via the S3 API)
//!
//! Two clients are kept: one for the internal container-network endpoint
//! (downloads/uploads) and one for the host-reachable endpoint so presigned
//! URLs resolve in a browser.

use crate::config::MinioConfig;
use crate::error::StorageError;
use async_trait::async_trait;
use aws_sdk_s3::config::{BehaviorVersion, Credentials, Region};
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Key prefix for generated audio samples
const UPLOAD_PREFIX: &str = "samples";
/// Presigned download URL lifetime
const URL_EXPIRY: Duration = Duration::from_secs(24 * 60 * 60);

/// Blob storage contract, seam for worker tests
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Download an object to a local temp file; the caller owns cleanup
    async fn download_to_temp(&self, storage_name: &str) -> Result<PathBuf, StorageError>;

    /// Upload a generated .wav sample; returns a bounded-lifetime URL
    async fn upload_sample(&self, path: &Path) -> Result<String, StorageError>;
}

/// S3-backed blob store
pub struct S3BlobStore {
    client: aws_sdk_s3::Client,
    url_client: aws_sdk_s3::Client,
    bucket: String,
}

impl S3BlobStore {
    pub fn new(config: &MinioConfig) -> Self {
        let client = build_client(config, &config.endpoint_url());
        let url_client = if config.external_endpoint_url() == config.endpoint_url() {
            client.clone()
        } else {
            build_client(config, &config.external_endpoint_url())
        };
        info!(
            internal = %config.endpoint_url(),
            external = %config.external_endpoint_url(),
            bucket = %config.bucket,
            "blob storage client initialized"
        );
        Self {
            client,
            url_client,
            bucket: config.bucket.clone(),
        }
    }

    async fn ensure_bucket(&self) -> Result<(), StorageError> {
        if self.client.head_bucket().bucket(&self.bucket).send().await.is_err() {
            self.client
                .create_bucket()
                .bucket(&self.bucket)
                .send()
                .await
                .map_err(|e| StorageError::Upload(format!("create bucket: {}", e)))?;
            info!(bucket = %self.bucket, "bucket created");
        }
        Ok(())
    }
}

fn build_client(config: &MinioConfig, endpoint_url: &str) -> aws_sdk_s3::Client {
    let credentials = Credentials::new(
        config.access_key.clone(),
        config.secret_key.clone(),
        None,
        None,
        "vibe-analysis",
    );
    let sdk_config = aws_sdk_s3::config::Builder::new()
        .behavior_version(BehaviorVersion::latest())
        .region(Region::new("us-east-1"))
        .endpoint_url(endpoint_url)
        .credentials_provider(credentials)
        .force_path_style(true)
        .build();
    aws_sdk_s3::Client::from_conf(sdk_config)
}

#[async_trait]
impl BlobStore for S3BlobStore {
    async fn download_to_temp(&self, storage_name: &str) -> Result<PathBuf, StorageError> {
        // Keep the original extension so decoders can probe the format
        let extension = Path::new(storage_name)
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("wav");

        let file = tempfile::Builder::new()
            .prefix("vibe_analysis_")
            .suffix(&format!(".{}", extension))
            .tempfile()?;
        let path = file.into_temp_path().keep().map_err(|e| e.error)?;

        let result = async {
            let object = self
                .client
                .get_object()
                .bucket(&self.bucket)
                .key(storage_name)
                .send()
                .await
                .map_err(|e| StorageError::Download(format!("{}: {}", storage_name, e)))?;

            let bytes = object
                .body
                .collect()
                .await
                .map_err(|e| StorageError::Download(format!("read body: {}", e)))?
                .into_bytes();

            tokio::fs::write(&path, &bytes).await?;
            Ok::<usize, StorageError>(bytes.len())
        }
        .await;

        match result {
            Ok(size) => {
                info!(
                    storage_name = storage_name,
                    path = %path.display(),
                    size_bytes = size,
                    "object downloaded"
                );
                Ok(path)
            }
            Err(e) => {
                // Download failed, reclaim the temp file before propagating
                if let Err(cleanup) = tokio::fs::remove_file(&path).await {
                    warn!(path = %path.display(), error = %cleanup, "temp file cleanup failed");
                }
                Err(e)
            }
        }
    }

    async fn upload_sample(&self, path: &Path) -> Result<String, StorageError> {
        self.ensure_bucket().await?;

        let object_name = format!("{}/{}.wav", UPLOAD_PREFIX, Uuid::new_v4().simple());
        let body = ByteStream::from_path(path)
            .await
            .map_err(|e| StorageError::Upload(format!("read {}: {}", path.display(), e)))?;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&object_name)
            .content_type("audio/wav")
            .body(body)
            .send()
            .await
            .map_err(|e| StorageError::Upload(format!("{}: {}", object_name, e)))?;

        let presigning = PresigningConfig::expires_in(URL_EXPIRY)
            .map_err(|e| StorageError::Upload(format!("presigning config: {}", e)))?;
        let presigned = self
            .url_client
            .get_object()
            .bucket(&self.bucket)
            .key(&object_name)
            .presigned(presigning)
            .await
            .map_err(|e| StorageError::Upload(format!("presign {}: {}", object_name, e)))?;

        let url = presigned.uri().to_string();
        debug!(object = %object_name, "sample uploaded");
        Ok(url)
    }
}
