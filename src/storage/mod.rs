use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};

pub mod s3;

pub use s3::S3AssetStore;

/// Blob store used for archiving run artifacts.
///
/// Failures are reported as `None` and logged by the implementation; no single
/// production run depends on the store for correctness.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AssetStore: Send + Sync {
    /// Upload a local file under `key` and return its durable reference
    async fn put(&self, local_path: &Path, key: &str) -> Option<String>;

    /// Fetch the object stored under `key`
    async fn get(&self, key: &str) -> Option<Vec<u8>>;
}

/// Build a timestamp-qualified object key: `{prefix}{category}/{stem}_{YYYYmmdd_HHMMSS}.{ext}`
pub fn archive_key(
    prefix: Option<&str>,
    category: &str,
    stem: &str,
    extension: &str,
    at: DateTime<Utc>,
) -> String {
    format!(
        "{}{}/{}_{}.{}",
        prefix.unwrap_or(""),
        category.trim_matches('/'),
        stem,
        at.format("%Y%m%d_%H%M%S"),
        extension.trim_start_matches('.'),
    )
}

/// MIME type for an archived artifact, by file extension
pub fn content_type_for(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_lowercase())
        .as_deref()
    {
        Some("mp4") => "video/mp4",
        Some("mp3") => "audio/mpeg",
        Some("m4a") => "audio/mp4",
        Some("wav") => "audio/wav",
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("json") => "application/json",
        _ => "application/octet-stream",
    }
}

/// Asset store backed by a local directory, for offline runs
pub struct LocalAssetStore {
    root: PathBuf,
}

impl LocalAssetStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn object_path(&self, key: &str) -> Option<PathBuf> {
        let relative = Path::new(key);
        let escapes = relative.components().any(|c| {
            !matches!(c, std::path::Component::Normal(_))
        });
        if escapes {
            tracing::warn!("Refusing asset key outside the store: {}", key);
            return None;
        }
        Some(self.root.join(relative))
    }
}

#[async_trait]
impl AssetStore for LocalAssetStore {
    async fn put(&self, local_path: &Path, key: &str) -> Option<String> {
        let target = self.object_path(key)?;
        if let Some(parent) = target.parent() {
            if let Err(e) = tokio::fs::create_dir_all(parent).await {
                tracing::warn!("Could not create archive directory {}: {}", parent.display(), e);
                return None;
            }
        }
        match tokio::fs::copy(local_path, &target).await {
            Ok(_) => {
                tracing::debug!("Archived {} to {}", local_path.display(), target.display());
                Some(format!("file://{}", target.display()))
            }
            Err(e) => {
                tracing::warn!("Could not archive {}: {}", local_path.display(), e);
                None
            }
        }
    }

    async fn get(&self, key: &str) -> Option<Vec<u8>> {
        let target = self.object_path(key)?;
        match tokio::fs::read(&target).await {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                tracing::info!("Asset '{}' not available: {}", key, e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_archive_key_layout() {
        let at = Utc.with_ymd_and_hms(2024, 3, 9, 7, 5, 1).unwrap();
        assert_eq!(
            archive_key(Some("reelforge/"), "generated_videos", "video", "mp4", at),
            "reelforge/generated_videos/video_20240309_070501.mp4"
        );
        assert_eq!(
            archive_key(None, "/generated_content/", "youtube_content", ".json", at),
            "generated_content/youtube_content_20240309_070501.json"
        );
    }

    #[test]
    fn test_content_type_for() {
        assert_eq!(content_type_for(Path::new("a/b.MP4")), "video/mp4");
        assert_eq!(content_type_for(Path::new("narration.mp3")), "audio/mpeg");
        assert_eq!(content_type_for(Path::new("noext")), "application/octet-stream");
    }

    #[tokio::test]
    async fn test_local_store_round_trip_and_key_escape() {
        let root = tempfile::tempdir().unwrap();
        let source = root.path().join("source.txt");
        fs_err::write(&source, b"payload").unwrap();

        let store = LocalAssetStore::new(root.path().join("archive"));
        let reference = store.put(&source, "videos/v_1.txt").await;
        assert!(reference.unwrap().starts_with("file://"));
        assert_eq!(store.get("videos/v_1.txt").await.unwrap(), b"payload");

        assert!(store.put(&source, "../outside.txt").await.is_none());
        assert!(store.get("missing.txt").await.is_none());
    }
}
