//! Video producer: the end-to-end pipeline for one content package.
//!
//! Stages run strictly in order, each behind a cancellation checkpoint:
//! script cleaning, narration, image sourcing, timeline build, assembly, render.
//! Every intermediate file lives in a per-run workspace that is removed on every
//! exit path; only the final render is moved out to the output directory.

use anyhow::Context;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use tracing::instrument;

use crate::cancel::CancellationToken;
use crate::content::ContentPackage;
use crate::speech::{TextToSpeech, VoiceProfile};
use crate::storage::{archive_key, AssetStore};
use crate::timeline::{FrameSpec, TimelineAssembler};
use crate::utils::generate_unique_filename;
use crate::visuals::{AspectRatio, ImageAsset, ImageSourcingMode, VisualSourcing};
use crate::ForgeError;

type StageResult<T> = std::result::Result<T, ForgeError>;

/// Pipeline stages, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    CleanScript,
    Narration,
    ResolveImages,
    BuildTimeline,
    Assemble,
    Render,
}

impl Stage {
    pub const ALL: [Stage; 6] = [
        Stage::CleanScript,
        Stage::Narration,
        Stage::ResolveImages,
        Stage::BuildTimeline,
        Stage::Assemble,
        Stage::Render,
    ];
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Stage::CleanScript => "script cleaning",
            Stage::Narration => "narration",
            Stage::ResolveImages => "image sourcing",
            Stage::BuildTimeline => "timeline build",
            Stage::Assemble => "assembly",
            Stage::Render => "render",
        };
        f.write_str(name)
    }
}

/// Per-run production choices
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductionRequest {
    pub voice: VoiceProfile,
    pub aspect_ratio: AspectRatio,
    pub image_source: ImageSourcingMode,
}

impl Default for ProductionRequest {
    fn default() -> Self {
        Self {
            voice: VoiceProfile::default(),
            aspect_ratio: AspectRatio::Landscape,
            image_source: ImageSourcingMode::Generated,
        }
    }
}

/// The final encoded file; the caller owns it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderedVideo {
    pub path: PathBuf,
    pub duration_seconds: f64,
    pub narration_seconds: f64,
    pub content_segments: usize,
    pub images_used: usize,
    /// Durable reference when the render was archived
    #[serde(skip_serializing_if = "Option::is_none")]
    pub archive_ref: Option<String>,
}

/// Exactly one of success, cancellation or failure
#[derive(Debug)]
pub enum ProductionOutcome {
    Completed(RenderedVideo),
    Cancelled { stage: Stage },
    Failed(ForgeError),
}

impl ProductionOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, ProductionOutcome::Completed(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, ProductionOutcome::Cancelled { .. })
    }

    pub fn video(&self) -> Option<&RenderedVideo> {
        match self {
            ProductionOutcome::Completed(video) => Some(video),
            _ => None,
        }
    }

    fn from_result(result: StageResult<RenderedVideo>) -> Self {
        match result {
            Ok(video) => ProductionOutcome::Completed(video),
            Err(ForgeError::Cancelled(stage)) => ProductionOutcome::Cancelled { stage },
            Err(e) => ProductionOutcome::Failed(e),
        }
    }
}

/// Runs the production pipeline for one content package at a time
pub struct VideoProducer {
    tts: TextToSpeech,
    visuals: VisualSourcing,
    assembler: TimelineAssembler,
    output_dir: PathBuf,
    work_root: Option<PathBuf>,
    fps: u32,
    asset_store: Option<Arc<dyn AssetStore>>,
    key_prefix: Option<String>,
    archive_intermediates: bool,
}

impl VideoProducer {
    pub fn new(
        tts: TextToSpeech,
        visuals: VisualSourcing,
        assembler: TimelineAssembler,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            tts,
            visuals,
            assembler,
            output_dir: output_dir.into(),
            work_root: None,
            fps: 24,
            asset_store: None,
            key_prefix: None,
            archive_intermediates: false,
        }
    }

    /// Create run workspaces under `dir` instead of the system temp directory
    pub fn with_work_root(mut self, dir: impl Into<PathBuf>) -> Self {
        self.work_root = Some(dir.into());
        self
    }

    pub fn with_fps(mut self, fps: u32) -> Self {
        self.fps = fps;
        self
    }

    /// Archive renders (and optionally intermediates) to `store`
    pub fn with_asset_store(
        mut self,
        store: Arc<dyn AssetStore>,
        key_prefix: Option<String>,
        archive_intermediates: bool,
    ) -> Self {
        self.asset_store = Some(store);
        self.key_prefix = key_prefix;
        self.archive_intermediates = archive_intermediates;
        self
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Produce one video. Never returns an error: every outcome is folded into
    /// `ProductionOutcome`, and the run workspace is gone by the time this returns.
    #[instrument(
        skip_all,
        fields(
            title = %content.title,
            aspect_ratio = %request.aspect_ratio,
            image_source = %request.image_source
        )
    )]
    pub async fn produce_video(
        &self,
        content: &ContentPackage,
        request: &ProductionRequest,
        cancel: &CancellationToken,
    ) -> ProductionOutcome {
        let workspace = match self.create_workspace() {
            Ok(workspace) => workspace,
            Err(e) => {
                return ProductionOutcome::Failed(ForgeError::production(Stage::CleanScript, e))
            }
        };
        tracing::debug!("Run workspace: {}", workspace.path().display());

        let result = self
            .run_stages(content, request, cancel, workspace.path())
            .await;

        let workspace_path = workspace.path().to_path_buf();
        if let Err(e) = workspace.close() {
            tracing::warn!(
                "Failed to remove run workspace {}: {}",
                workspace_path.display(),
                e
            );
        }

        let outcome = ProductionOutcome::from_result(result);
        match &outcome {
            ProductionOutcome::Completed(video) => tracing::info!(
                "Video ready: {} ({:.2}s)",
                video.path.display(),
                video.duration_seconds
            ),
            ProductionOutcome::Cancelled { stage } => {
                tracing::warn!("Production cancelled before {}", stage)
            }
            ProductionOutcome::Failed(e) => tracing::error!("Production failed: {}", e),
        }
        outcome
    }

    async fn run_stages(
        &self,
        content: &ContentPackage,
        request: &ProductionRequest,
        cancel: &CancellationToken,
        workspace: &Path,
    ) -> StageResult<RenderedVideo> {
        // 1. script
        cancel.checkpoint(Stage::CleanScript)?;
        if content.script.is_blank() {
            return Err(ForgeError::Validation(
                "script is empty after flattening".to_string(),
            ));
        }
        let script = content.script.flatten();

        // 2. narration
        cancel.checkpoint(Stage::Narration)?;
        let narration = self
            .tts
            .synthesize(&script, &request.voice, workspace)
            .await
            .ok_or_else(|| {
                ForgeError::AudioGeneration("speech engine produced no narration".to_string())
            })?;

        // 3. images; intermediates are only uploaded once the run is still wanted
        cancel.checkpoint(Stage::ResolveImages)?;
        self.archive_intermediate(&narration.path, "audio", "narration")
            .await;
        let images_dir = workspace.join("images");
        create_dir(&images_dir, Stage::ResolveImages).await?;
        let images = self
            .visuals
            .resolve_images(
                &content.image_prompts,
                request.image_source,
                request.aspect_ratio,
                &images_dir,
                cancel,
            )
            .await?;

        // 4. timeline
        cancel.checkpoint(Stage::BuildTimeline)?;
        for image in &images {
            self.archive_image(image).await;
        }
        let frame = FrameSpec::for_aspect(request.aspect_ratio, self.fps);
        let timeline = self.assembler.plan(narration.duration_seconds, &images);
        tracing::info!(
            segments = timeline.segments().len(),
            total_seconds = timeline.total_duration(),
            "Timeline planned"
        );
        let segments_dir = workspace.join("segments");
        create_dir(&segments_dir, Stage::BuildTimeline).await?;
        let clips = self
            .assembler
            .render_segments(&timeline, &frame, &segments_dir, cancel)
            .await?;

        // 5. assembly
        cancel.checkpoint(Stage::Assemble)?;
        let tracks = self
            .assembler
            .assemble(&timeline, &clips, &narration, workspace)
            .await?;

        // 6. render
        cancel.checkpoint(Stage::Render)?;
        let duration_seconds = frame.snap(timeline.total_duration());
        let staged = workspace.join("render.mp4");
        self.assembler
            .encode(&tracks, &frame, duration_seconds, &staged)
            .await?;
        let path = self
            .deliver(&staged)
            .await
            .map_err(|e| ForgeError::production(Stage::Render, e))?;

        let archive_ref = self.archive(&path, "generated_videos", "video").await;

        Ok(RenderedVideo {
            path,
            duration_seconds,
            narration_seconds: narration.duration_seconds,
            content_segments: timeline.content_segments().count(),
            images_used: images.len(),
            archive_ref,
        })
    }

    fn create_workspace(&self) -> crate::Result<TempDir> {
        let builder = {
            let mut builder = tempfile::Builder::new();
            builder.prefix("reelforge-run-");
            builder
        };
        let workspace = match &self.work_root {
            Some(root) => {
                fs_err::create_dir_all(root)?;
                builder.tempdir_in(root)
            }
            None => builder.tempdir(),
        };
        workspace.context("Failed to create run workspace")
    }

    /// Move the staged render out of the workspace into the output directory
    async fn deliver(&self, staged: &Path) -> crate::Result<PathBuf> {
        tokio::fs::create_dir_all(&self.output_dir)
            .await
            .with_context(|| format!("Failed to create {}", self.output_dir.display()))?;

        let target = self
            .output_dir
            .join(generate_unique_filename("video", "mp4"));

        if tokio::fs::rename(staged, &target).await.is_err() {
            // Different filesystem: copy, and never leave a partial target behind
            if let Err(e) = tokio::fs::copy(staged, &target).await {
                let _ = tokio::fs::remove_file(&target).await;
                return Err(e).with_context(|| format!("Failed to write {}", target.display()));
            }
        }

        Ok(target)
    }

    async fn archive(&self, path: &Path, category: &str, stem: &str) -> Option<String> {
        let store = self.asset_store.as_ref()?;
        let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("bin");
        let key = archive_key(
            self.key_prefix.as_deref(),
            category,
            stem,
            extension,
            Utc::now(),
        );

        let reference = store.put(path, &key).await;
        match &reference {
            Some(url) => tracing::info!("Archived {} to {}", path.display(), url),
            None => tracing::warn!("Archiving {} failed; continuing", path.display()),
        }
        reference
    }

    async fn archive_intermediate(&self, path: &Path, category: &str, stem: &str) {
        if self.archive_intermediates {
            self.archive(path, category, stem).await;
        }
    }

    async fn archive_image(&self, image: &ImageAsset) {
        let stem = image
            .path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("image")
            .to_string();
        self.archive_intermediate(&image.path, "images", &stem).await;
    }
}

async fn create_dir(dir: &Path, stage: Stage) -> StageResult<()> {
    tokio::fs::create_dir_all(dir)
        .await
        .with_context(|| format!("Failed to create {}", dir.display()))
        .map_err(|e| ForgeError::production(stage, e))
}
