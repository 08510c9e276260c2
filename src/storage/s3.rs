use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_sdk_s3::config::Credentials;
use aws_sdk_s3::Client as S3Client;
use aws_types::region::Region;
use std::path::Path;

use super::{content_type_for, AssetStore};
use crate::config::StorageConfig;

/// S3-compatible object storage (AWS S3, DigitalOcean Spaces, MinIO)
pub struct S3AssetStore {
    client: S3Client,
    bucket: String,
    public_base: String,
}

impl S3AssetStore {
    /// Build a store from configuration; `None` when no bucket is configured
    pub async fn from_config(config: &StorageConfig) -> Result<Option<Self>> {
        if config.bucket.trim().is_empty() {
            tracing::debug!("Object storage disabled: no bucket configured");
            return Ok(None);
        }

        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(Region::new(config.region.clone()));

        if let Some(endpoint) = &config.endpoint_url {
            loader = loader.endpoint_url(endpoint.clone());
        }

        // Spaces-style static keys take precedence over the default provider chain
        if let (Ok(key), Ok(secret)) = (
            std::env::var("DO_SPACES_KEY"),
            std::env::var("DO_SPACES_SECRET"),
        ) {
            loader = loader.credentials_provider(Credentials::new(
                key,
                secret,
                None,
                None,
                "reelforge-environment",
            ));
        }

        let shared = loader.load().await;
        let client = S3Client::new(&shared);

        let public_base = match (&config.public_base_url, &config.endpoint_url) {
            (Some(base), _) => base.trim_end_matches('/').to_string(),
            (None, Some(endpoint)) => {
                format!("{}/{}", endpoint.trim_end_matches('/'), config.bucket)
            }
            (None, None) => format!("s3://{}", config.bucket),
        };

        tracing::info!("Object storage configured: bucket '{}'", config.bucket);

        Ok(Some(Self {
            client,
            bucket: config.bucket.clone(),
            public_base,
        }))
    }

    async fn upload(&self, local_path: &Path, key: &str) -> Result<String> {
        let content = tokio::fs::read(local_path)
            .await
            .with_context(|| format!("Failed to read {}", local_path.display()))?;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(content.into())
            .content_type(content_type_for(local_path))
            .send()
            .await
            .context("Failed to upload object")?;

        Ok(format!("{}/{}", self.public_base, key))
    }
}

#[async_trait]
impl AssetStore for S3AssetStore {
    async fn put(&self, local_path: &Path, key: &str) -> Option<String> {
        tracing::info!("Uploading {} to s3://{}/{}", local_path.display(), self.bucket, key);
        match self.upload(local_path, key).await {
            Ok(reference) => Some(reference),
            Err(e) => {
                tracing::warn!("Upload of '{}' failed: {:#}", key, e);
                None
            }
        }
    }

    async fn get(&self, key: &str) -> Option<Vec<u8>> {
        let response = match self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                let service_error = e.into_service_error();
                if service_error.is_no_such_key() {
                    tracing::info!("Object '{}' not found", key);
                } else {
                    tracing::warn!("Could not retrieve '{}': {}", key, service_error);
                }
                return None;
            }
        };

        match response.body.collect().await {
            Ok(data) => Some(data.into_bytes().to_vec()),
            Err(e) => {
                tracing::warn!("Could not read body of '{}': {}", key, e);
                None
            }
        }
    }
}
