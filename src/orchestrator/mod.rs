use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::cancel::CancellationController;
use crate::config::Config;
use crate::content::{ContentGenerator, ContentPackage, OpenAiGenerator};
use crate::producer::{ProductionOutcome, ProductionRequest, RenderedVideo, Stage, VideoProducer};
use crate::publish::{ObjectStoragePublisher, PublishReceipt, PublishRequest, PublisherRegistry};
use crate::research::SerperResearcher;
use crate::speech::{GoogleTranslateTts, TextToSpeech};
use crate::storage::{AssetStore, LocalAssetStore, S3AssetStore};
use crate::timeline::{FfmpegToolkit, MediaToolkit, MusicPool, TimelineAssembler, TimelineSettings};
use crate::visuals::{StabilityGenerator, VisualSourcing, WebImageSearch};
use crate::Result;

/// How a run ended, as reported to the CLI or scheduler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Succeeded,
    Cancelled,
    Failed,
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunStatus::Succeeded => write!(f, "succeeded"),
            RunStatus::Cancelled => write!(f, "cancelled"),
            RunStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Everything the caller learns about one run; no intermediate state is exposed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub status: RunStatus,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video: Option<RenderedVideo>,
    /// Stage that was about to start when a stop was observed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancelled_before: Option<Stage>,
    #[serde(default)]
    pub published: Vec<PublishReceipt>,
    #[serde(default)]
    pub publish_errors: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunReport {
    fn new(status: RunStatus, message: impl Into<String>, started_at: DateTime<Utc>) -> Self {
        Self {
            status,
            message: message.into(),
            title: None,
            video: None,
            cancelled_before: None,
            published: Vec::new(),
            publish_errors: Vec::new(),
            started_at,
            finished_at: Utc::now(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Succeeded
    }
}

/// A topic-to-video request
#[derive(Debug, Clone)]
pub struct VideoJob {
    pub topic: String,
    pub niche: String,
    pub use_web_context: bool,
    pub request: ProductionRequest,
    /// Publisher names; empty keeps the video local
    pub publish_to: Vec<String>,
}

/// Wires content generation, production and publishing, and owns run cancellation
pub struct Orchestrator {
    generator: Arc<dyn ContentGenerator>,
    producer: VideoProducer,
    publishers: PublisherRegistry,
    cancellation: CancellationController,
}

impl Orchestrator {
    pub fn new(
        generator: Arc<dyn ContentGenerator>,
        producer: VideoProducer,
        publishers: PublisherRegistry,
    ) -> Self {
        Self {
            generator,
            producer,
            publishers,
            cancellation: CancellationController::new(),
        }
    }

    /// Build the production stack described by `config`
    pub async fn from_config(config: &Config) -> Result<Self> {
        let production = &config.production;
        let timeouts = &config.timeouts;

        let toolkit: Arc<dyn MediaToolkit> = Arc::new(FfmpegToolkit::new(
            production.ffmpeg_path.clone(),
            production.ffprobe_path.clone(),
        ));

        let tts = TextToSpeech::new(
            Arc::new(GoogleTranslateTts::new(timeouts.tts())),
            Arc::clone(&toolkit),
        );

        let visuals = VisualSourcing::new(
            Arc::new(StabilityGenerator::new(
                config.apis.stability_api_key.clone(),
                timeouts.image_generation(),
            )),
            Arc::new(WebImageSearch::new(
                timeouts.image_search(),
                timeouts.image_fetch(),
            )?),
        );

        let assembler = TimelineAssembler::new(
            Arc::clone(&toolkit),
            TimelineSettings::from_config(production)?,
        )
        .with_music(
            MusicPool::scan(&production.music_dir()),
            production.music_volume,
        );

        let store = Self::asset_store(config).await?;

        let mut producer = VideoProducer::new(tts, visuals, assembler, production.videos_dir())
            .with_work_root(production.work_dir())
            .with_fps(production.fps);

        let mut generator = OpenAiGenerator::new(
            config.apis.openai_api_key.clone(),
            config.apis.openai_model.clone(),
            timeouts.llm(),
        );
        if let Some(key) = &config.apis.serper_api_key {
            generator = generator.with_researcher(Arc::new(SerperResearcher::new(
                key.clone(),
                timeouts.research(),
            )));
        }

        let mut publishers = PublisherRegistry::new();
        if let Some(store) = store {
            let prefix = config.storage.key_prefix.clone();
            producer = producer.with_asset_store(
                Arc::clone(&store),
                prefix.clone(),
                config.storage.archive_intermediates,
            );
            generator = generator.with_archive(Arc::clone(&store), prefix.clone());
            publishers.register(Box::new(ObjectStoragePublisher::new(store, prefix)));
        }

        Ok(Self::new(Arc::new(generator), producer, publishers))
    }

    async fn asset_store(config: &Config) -> Result<Option<Arc<dyn AssetStore>>> {
        if let Some(store) = S3AssetStore::from_config(&config.storage).await? {
            return Ok(Some(Arc::new(store)));
        }
        Ok(config
            .storage
            .local_dir
            .as_ref()
            .map(|dir| Arc::new(LocalAssetStore::new(dir.clone())) as Arc<dyn AssetStore>))
    }

    pub fn cancellation(&self) -> &CancellationController {
        &self.cancellation
    }

    /// Ask every active run to stop at its next checkpoint
    pub fn trigger_stop(&self) {
        self.cancellation.trigger();
    }

    pub fn list_platforms(&self) -> Vec<&'static str> {
        self.publishers.list_platforms()
    }

    /// Draft content for a topic, produce the video and publish it
    pub async fn generate_single_video(&self, job: &VideoJob) -> RunReport {
        let started_at = Utc::now();
        let run = self.cancellation.begin_run();

        let content = match self
            .generator
            .generate_video_content(&job.topic, &job.niche, job.use_web_context)
            .await
        {
            Ok(content) => content,
            Err(e) => {
                tracing::error!("Content generation failed: {:#}", e);
                return RunReport::new(
                    RunStatus::Failed,
                    format!("Content generation failed: {:#}", e),
                    started_at,
                );
            }
        };

        if run.token().is_triggered() {
            let mut report = RunReport::new(
                RunStatus::Cancelled,
                "Operation cancelled by user",
                started_at,
            );
            report.title = Some(content.title);
            report.cancelled_before = Some(Stage::CleanScript);
            return report;
        }

        self.run_production(&content, &job.request, &job.publish_to, run.token(), started_at)
            .await
    }

    /// Produce a video from an existing package and publish it
    pub async fn produce_from_package(
        &self,
        content: &ContentPackage,
        request: &ProductionRequest,
        publish_to: &[String],
    ) -> RunReport {
        let started_at = Utc::now();
        let run = self.cancellation.begin_run();
        self.run_production(content, request, publish_to, run.token(), started_at)
            .await
    }

    async fn run_production(
        &self,
        content: &ContentPackage,
        request: &ProductionRequest,
        publish_to: &[String],
        cancel: &crate::CancellationToken,
        started_at: DateTime<Utc>,
    ) -> RunReport {
        let outcome = self.producer.produce_video(content, request, cancel).await;

        let mut report = match outcome {
            ProductionOutcome::Completed(video) => {
                let mut report = RunReport::new(
                    RunStatus::Succeeded,
                    format!("Video ready at {}", video.path.display()),
                    started_at,
                );
                report.video = Some(video);
                report
            }
            ProductionOutcome::Cancelled { stage } => {
                let mut report = RunReport::new(
                    RunStatus::Cancelled,
                    "Operation cancelled by user",
                    started_at,
                );
                report.cancelled_before = Some(stage);
                report
            }
            ProductionOutcome::Failed(e) => {
                RunReport::new(RunStatus::Failed, e.to_string(), started_at)
            }
        };
        report.title = Some(content.title.clone());

        if let Some(video) = &report.video {
            if !publish_to.is_empty() {
                let request = PublishRequest::from_package(video.path.clone(), content);
                for (platform, result) in self.publishers.publish_to(publish_to, &request).await {
                    match result {
                        Ok(receipt) => report.published.push(receipt),
                        Err(e) => report.publish_errors.push(format!("{}: {:#}", platform, e)),
                    }
                }
            }
        }

        report.finished_at = Utc::now();
        report
    }
}
