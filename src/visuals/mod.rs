use anyhow::Context;
use async_trait::async_trait;
use image::{DynamicImage, ImageFormat};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

pub mod search;
pub mod stability;

pub use search::WebImageSearch;
pub use stability::StabilityGenerator;

use crate::cancel::CancellationToken;
use crate::producer::Stage;
use crate::{ForgeError, Result};

/// Target frame shape of the rendered video
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AspectRatio {
    #[serde(rename = "16:9")]
    Landscape,
    #[serde(rename = "9:16")]
    Portrait,
    #[serde(rename = "1:1")]
    Square,
}

impl AspectRatio {
    pub fn as_str(&self) -> &'static str {
        match self {
            AspectRatio::Landscape => "16:9",
            AspectRatio::Portrait => "9:16",
            AspectRatio::Square => "1:1",
        }
    }

    /// Output resolution as (width, height)
    pub fn resolution(&self) -> (u32, u32) {
        match self {
            AspectRatio::Landscape => (1920, 1080),
            AspectRatio::Portrait => (1080, 1920),
            AspectRatio::Square => (1080, 1080),
        }
    }
}

impl FromStr for AspectRatio {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> std::result::Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "16:9" | "landscape" => Ok(AspectRatio::Landscape),
            "9:16" | "portrait" | "vertical" => Ok(AspectRatio::Portrait),
            "1:1" | "square" => Ok(AspectRatio::Square),
            other => anyhow::bail!("Unsupported aspect ratio: {}", other),
        }
    }
}

impl std::fmt::Display for AspectRatio {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How images are obtained for the prompts of a run.
///
/// Selected by the caller; there is no implicit substitution between modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum ImageSourcingMode {
    /// Generative image API
    Generated,
    /// Keyword image search
    WebSearched,
}

impl std::fmt::Display for ImageSourcingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ImageSourcingMode::Generated => write!(f, "generated"),
            ImageSourcingMode::WebSearched => write!(f, "web-searched"),
        }
    }
}

/// Where a resolved image came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceKind {
    Generated,
    WebSearched,
}

impl SourceKind {
    fn file_prefix(&self) -> &'static str {
        match self {
            SourceKind::Generated => "ai_image",
            SourceKind::WebSearched => "web_image",
        }
    }
}

/// One successfully resolved prompt, stored locally as PNG
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageAsset {
    pub path: PathBuf,
    pub source_kind: SourceKind,
    /// Index of the prompt this image was resolved from
    pub prompt_index: usize,
}

/// Turns one prompt into raw image bytes
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ImageProvider: Send + Sync {
    fn source_kind(&self) -> SourceKind;

    /// Fetch one image for `prompt`; any error skips the prompt.
    ///
    /// Providers that make several requests per prompt check `cancel` between them.
    async fn fetch_image(
        &self,
        prompt: &str,
        aspect_ratio: AspectRatio,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>>;
}

/// Resolves image prompts into local image files, one attempt per prompt
pub struct VisualSourcing {
    generated: Arc<dyn ImageProvider>,
    web_searched: Arc<dyn ImageProvider>,
}

impl VisualSourcing {
    pub fn new(generated: Arc<dyn ImageProvider>, web_searched: Arc<dyn ImageProvider>) -> Self {
        Self {
            generated,
            web_searched,
        }
    }

    fn provider(&self, mode: ImageSourcingMode) -> &dyn ImageProvider {
        match mode {
            ImageSourcingMode::Generated => self.generated.as_ref(),
            ImageSourcingMode::WebSearched => self.web_searched.as_ref(),
        }
    }

    /// Resolve every prompt in order, skipping failures.
    ///
    /// The result may be shorter than `prompts` (empty when everything failed). The only
    /// error is `ForgeError::Cancelled`, checked before each external call.
    pub async fn resolve_images(
        &self,
        prompts: &[String],
        mode: ImageSourcingMode,
        aspect_ratio: AspectRatio,
        output_dir: &Path,
        cancel: &CancellationToken,
    ) -> std::result::Result<Vec<ImageAsset>, ForgeError> {
        let provider = self.provider(mode);
        let mut assets = Vec::with_capacity(prompts.len());

        tracing::info!("Resolving {} image(s) via {}", prompts.len(), mode);

        for (index, prompt) in prompts.iter().enumerate() {
            cancel.checkpoint(Stage::ResolveImages)?;

            let preview: String = prompt.chars().take(50).collect();
            tracing::debug!(index, "Requesting image for '{}'", preview);

            let bytes = match provider.fetch_image(prompt, aspect_ratio, cancel).await {
                Ok(bytes) => bytes,
                Err(e) => {
                    cancel.checkpoint(Stage::ResolveImages)?;
                    tracing::warn!(index, "Skipping image prompt '{}': {:#}", preview, e);
                    continue;
                }
            };

            let kind = provider.source_kind();
            let path = output_dir.join(format!("{}_{}.png", kind.file_prefix(), index));
            match store_as_png(bytes, path.clone()).await {
                Ok(()) => {
                    tracing::info!(index, "Image saved: {}", path.display());
                    assets.push(ImageAsset {
                        path,
                        source_kind: kind,
                        prompt_index: index,
                    });
                }
                Err(e) => {
                    tracing::warn!(index, "Discarding undecodable image for '{}': {:#}", preview, e);
                }
            }
        }

        tracing::info!("Resolved {}/{} image(s)", assets.len(), prompts.len());
        Ok(assets)
    }
}

/// Decode arbitrary raster bytes and write them as an RGB PNG
async fn store_as_png(bytes: Vec<u8>, path: PathBuf) -> Result<()> {
    tokio::task::spawn_blocking(move || -> Result<()> {
        let decoded = image::load_from_memory(&bytes).context("Failed to decode image")?;
        DynamicImage::ImageRgb8(decoded.to_rgb8())
            .save_with_format(&path, ImageFormat::Png)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(())
    })
    .await
    .context("Image decoding task failed")?
}
