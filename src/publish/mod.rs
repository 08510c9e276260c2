use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

use crate::content::ContentPackage;
use crate::storage::{archive_key, AssetStore};
use crate::utils::slugify;
use crate::{ForgeError, Result};

/// What a publisher receives for one finished video
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishRequest {
    pub video: PathBuf,
    pub title: String,
    pub description: String,
    pub tags: Vec<String>,
}

impl PublishRequest {
    pub fn from_package(video: impl Into<PathBuf>, content: &ContentPackage) -> Self {
        Self {
            video: video.into(),
            title: content.title.clone(),
            description: content.description.clone(),
            tags: content.tags.clone(),
        }
    }
}

/// Proof that a platform accepted the video
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishReceipt {
    pub platform: String,
    pub reference: String,
}

/// A destination for finished videos
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Name used to select this publisher in configuration
    fn platform_name(&self) -> &'static str;

    async fn publish(&self, request: &PublishRequest) -> Result<PublishReceipt>;
}

/// Publishes by uploading the video and a metadata sidecar to the asset store
pub struct ObjectStoragePublisher {
    store: Arc<dyn AssetStore>,
    key_prefix: Option<String>,
}

impl ObjectStoragePublisher {
    pub fn new(store: Arc<dyn AssetStore>, key_prefix: Option<String>) -> Self {
        Self { store, key_prefix }
    }
}

#[async_trait]
impl Publisher for ObjectStoragePublisher {
    fn platform_name(&self) -> &'static str {
        "object-storage"
    }

    async fn publish(&self, request: &PublishRequest) -> Result<PublishReceipt> {
        let stem = match slugify(&request.title) {
            slug if slug.is_empty() => "video".to_string(),
            slug => slug,
        };
        let now = Utc::now();
        let prefix = self.key_prefix.as_deref();

        let video_key = archive_key(prefix, "published", &stem, "mp4", now);
        let reference = self
            .store
            .put(&request.video, &video_key)
            .await
            .ok_or_else(|| ForgeError::Publish(format!("upload of {} failed", video_key)))?;

        let mut sidecar = tempfile::Builder::new().suffix(".json").tempfile()?;
        serde_json::to_writer_pretty(
            sidecar.as_file_mut(),
            &serde_json::json!({
                "title": request.title,
                "description": request.description,
                "tags": request.tags,
                "video": reference,
            }),
        )?;
        let metadata_key = archive_key(prefix, "published", &stem, "json", now);
        if self.store.put(sidecar.path(), &metadata_key).await.is_none() {
            tracing::warn!("Metadata upload failed for {}", video_key);
        }

        Ok(PublishReceipt {
            platform: self.platform_name().to_string(),
            reference,
        })
    }
}

/// Registry for the configured publishers
#[derive(Default)]
pub struct PublisherRegistry {
    publishers: Vec<Box<dyn Publisher>>,
}

impl PublisherRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, publisher: Box<dyn Publisher>) {
        self.publishers.push(publisher);
    }

    pub fn find(&self, name: &str) -> Option<&dyn Publisher> {
        self.publishers
            .iter()
            .find(|publisher| publisher.platform_name() == name)
            .map(|boxed| boxed.as_ref())
    }

    pub fn list_platforms(&self) -> Vec<&'static str> {
        self.publishers
            .iter()
            .map(|publisher| publisher.platform_name())
            .collect()
    }

    /// Hand the video to each named publisher in turn; one failure does not stop the others
    pub async fn publish_to(
        &self,
        names: &[String],
        request: &PublishRequest,
    ) -> Vec<(String, Result<PublishReceipt>)> {
        let mut results = Vec::with_capacity(names.len());
        for name in names {
            let result = match self.find(name) {
                Some(publisher) => publisher.publish(request).await,
                None => Err(ForgeError::Publish(format!("unknown platform '{}'", name)).into()),
            };
            match &result {
                Ok(receipt) => tracing::info!("Published to {}: {}", name, receipt.reference),
                Err(e) => tracing::error!("Publishing to {} failed: {:#}", name, e),
            }
            results.push((name.clone(), result));
        }
        results
    }
}
