//! End-to-end production runs against in-process fakes of the speech engine, image
//! providers and media toolkit. No network access or ffmpeg binary is needed.

use async_trait::async_trait;
use image::{DynamicImage, ImageOutputFormat, Rgb, RgbImage};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

use reelforge::automation::{AutomationScheduler, SettingsUpdate};
use reelforge::config::AutomationConfig;
use reelforge::content::{ContentGenerator, ContentPackage, Script};
use reelforge::orchestrator::{Orchestrator, RunStatus, VideoJob};
use reelforge::producer::{ProductionOutcome, ProductionRequest, Stage, VideoProducer};
use reelforge::speech::{SpeechEngine, TextToSpeech, VoiceProfile};
use reelforge::publish::{ObjectStoragePublisher, PublisherRegistry};
use reelforge::storage::LocalAssetStore;
use reelforge::timeline::{
    FrameSpec, MediaToolkit, SegmentKind, SoundtrackRequest, TimelineAssembler, TimelineSegment,
    TimelineSettings,
};
use reelforge::visuals::{AspectRatio, ImageProvider, ImageSourcingMode, SourceKind, VisualSourcing};
use reelforge::{CancellationToken, ForgeError, Result};

const NARRATION_SECONDS: f64 = 9.5;
const FPS: u32 = 24;

fn png_bytes() -> Vec<u8> {
    let img = RgbImage::from_pixel(8, 6, Rgb([10, 120, 200]));
    let mut buffer = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(img)
        .write_to(&mut buffer, ImageOutputFormat::Png)
        .unwrap();
    buffer.into_inner()
}

/// Toolkit operations a fake can be told to fail at or stop after
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ToolkitStep {
    RenderSegment,
    Concat,
    Soundtrack,
    Encode,
}

/// Writes placeholder files and records what it was asked to do
struct FakeToolkit {
    narration_seconds: f64,
    fail_at: Option<ToolkitStep>,
    stop_after: Option<(ToolkitStep, CancellationToken)>,
    segments: Mutex<Vec<TimelineSegment>>,
    frames: Mutex<Vec<u64>>,
    soundtracks: Mutex<Vec<SoundtrackRequest>>,
    encoded: Mutex<Vec<f64>>,
}

impl FakeToolkit {
    fn new(narration_seconds: f64) -> Self {
        Self {
            narration_seconds,
            fail_at: None,
            stop_after: None,
            segments: Mutex::new(Vec::new()),
            frames: Mutex::new(Vec::new()),
            soundtracks: Mutex::new(Vec::new()),
            encoded: Mutex::new(Vec::new()),
        }
    }

    /// Write the output, then fail at `step`
    fn failing_at(mut self, step: ToolkitStep) -> Self {
        self.fail_at = Some(step);
        self
    }

    /// Complete `step` normally, then request a stop on `token`
    fn stopping_after(mut self, step: ToolkitStep, token: &CancellationToken) -> Self {
        self.stop_after = Some((step, token.clone()));
        self
    }

    fn finish(&self, step: ToolkitStep) -> Result<()> {
        if self.fail_at == Some(step) {
            anyhow::bail!("{:?} exited with status 1", step);
        }
        if let Some((at, token)) = &self.stop_after {
            if *at == step {
                token.trigger();
            }
        }
        Ok(())
    }

    fn content_segments(&self) -> Vec<TimelineSegment> {
        self.segments
            .lock()
            .unwrap()
            .iter()
            .filter(|segment| segment.kind == SegmentKind::Content)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl MediaToolkit for FakeToolkit {
    async fn probe_duration(&self, _path: &Path) -> Result<f64> {
        Ok(self.narration_seconds)
    }

    async fn render_segment(
        &self,
        segment: &TimelineSegment,
        _frame: &FrameSpec,
        frames: u64,
        output: &Path,
    ) -> Result<()> {
        self.segments.lock().unwrap().push(segment.clone());
        self.frames.lock().unwrap().push(frames);
        tokio::fs::write(output, b"clip").await?;
        self.finish(ToolkitStep::RenderSegment)
    }

    async fn concat_segments(&self, _clips: &[PathBuf], output: &Path) -> Result<()> {
        tokio::fs::write(output, b"video").await?;
        self.finish(ToolkitStep::Concat)
    }

    async fn build_soundtrack(&self, request: &SoundtrackRequest, output: &Path) -> Result<()> {
        self.soundtracks.lock().unwrap().push(request.clone());
        tokio::fs::write(output, b"audio").await?;
        self.finish(ToolkitStep::Soundtrack)
    }

    async fn encode_final(
        &self,
        _video_track: &Path,
        _soundtrack: &Path,
        _frame: &FrameSpec,
        duration_seconds: f64,
        output: &Path,
    ) -> Result<()> {
        tokio::fs::write(output, b"partial mp4").await?;
        self.finish(ToolkitStep::Encode)?;
        self.encoded.lock().unwrap().push(duration_seconds);
        Ok(())
    }
}

/// Speech engine that writes a stub file, optionally failing or requesting a stop afterwards
#[derive(Default)]
struct FakeSpeech {
    fail: bool,
    stop_after: Option<CancellationToken>,
    calls: AtomicUsize,
    written: Mutex<Option<PathBuf>>,
}

#[async_trait]
impl SpeechEngine for FakeSpeech {
    fn engine_name(&self) -> &'static str {
        "fake"
    }

    async fn synthesize_to_file(
        &self,
        _text: &str,
        _voice: &VoiceProfile,
        output_path: &Path,
    ) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            anyhow::bail!("speech service unavailable");
        }
        tokio::fs::write(output_path, b"mp3").await?;
        *self.written.lock().unwrap() = Some(output_path.to_path_buf());
        if let Some(token) = &self.stop_after {
            token.trigger();
        }
        Ok(())
    }
}

/// Image provider that fails for the listed prompts and counts every call
struct FakeImages {
    kind: SourceKind,
    failing: Vec<String>,
    calls: AtomicUsize,
}

impl FakeImages {
    fn new(kind: SourceKind, failing: &[&str]) -> Self {
        Self {
            kind,
            failing: failing.iter().map(|s| s.to_string()).collect(),
            calls: AtomicUsize::new(0),
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ImageProvider for FakeImages {
    fn source_kind(&self) -> SourceKind {
        self.kind
    }

    async fn fetch_image(
        &self,
        prompt: &str,
        _aspect_ratio: AspectRatio,
        _cancel: &CancellationToken,
    ) -> Result<Vec<u8>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.iter().any(|p| p == prompt) {
            anyhow::bail!("generation failed for {}", prompt);
        }
        Ok(png_bytes())
    }
}

struct Harness {
    toolkit: Arc<FakeToolkit>,
    speech: Arc<FakeSpeech>,
    generated: Arc<FakeImages>,
    web: Arc<FakeImages>,
    work_root: TempDir,
    output_dir: TempDir,
}

impl Harness {
    fn new(speech: FakeSpeech, failing_prompts: &[&str]) -> Self {
        Self {
            toolkit: Arc::new(FakeToolkit::new(NARRATION_SECONDS)),
            speech: Arc::new(speech),
            generated: Arc::new(FakeImages::new(SourceKind::Generated, failing_prompts)),
            web: Arc::new(FakeImages::new(SourceKind::WebSearched, &[])),
            work_root: tempfile::tempdir().unwrap(),
            output_dir: tempfile::tempdir().unwrap(),
        }
    }

    fn producer(&self) -> VideoProducer {
        let toolkit: Arc<dyn MediaToolkit> = self.toolkit.clone();
        VideoProducer::new(
            TextToSpeech::new(self.speech.clone(), Arc::clone(&toolkit)),
            VisualSourcing::new(self.generated.clone(), self.web.clone()),
            TimelineAssembler::new(toolkit, TimelineSettings::default()),
            self.output_dir.path(),
        )
        .with_work_root(self.work_root.path())
        .with_fps(FPS)
    }

    fn with_toolkit(mut self, toolkit: FakeToolkit) -> Self {
        self.toolkit = Arc::new(toolkit);
        self
    }

    fn work_root_is_empty(&self) -> bool {
        std::fs::read_dir(self.work_root.path()).unwrap().next().is_none()
    }

    fn output_dir_is_empty(&self) -> bool {
        std::fs::read_dir(self.output_dir.path()).unwrap().next().is_none()
    }
}

fn package(script: &str, prompts: &[&str]) -> ContentPackage {
    ContentPackage {
        title: "Test video".to_string(),
        script: Script::Plain(script.to_string()),
        image_prompts: prompts.iter().map(|s| s.to_string()).collect(),
        ..Default::default()
    }
}

#[tokio::test]
async fn single_image_spans_the_whole_narration() {
    let harness = Harness::new(FakeSpeech::default(), &[]);
    let outcome = harness
        .producer()
        .produce_video(
            &package("Hello world.", &["a red cube"]),
            &ProductionRequest::default(),
            &CancellationToken::new(),
        )
        .await;

    let video = outcome.video().expect("run should complete").clone();
    assert_eq!(video.content_segments, 1);
    assert_eq!(video.images_used, 1);
    assert_eq!(video.duration_seconds, 3.0 + NARRATION_SECONDS + 5.0);
    assert!(video.path.exists());
    assert_eq!(video.path.parent(), Some(harness.output_dir.path()));

    let content = harness.toolkit.content_segments();
    assert_eq!(content.len(), 1);
    assert_eq!(content[0].duration_seconds, NARRATION_SECONDS);
    assert!(harness.work_root_is_empty());
}

#[tokio::test]
async fn failed_generations_leave_only_surviving_segments() {
    let harness = Harness::new(FakeSpeech::default(), &["a", "c"]);
    let outcome = harness
        .producer()
        .produce_video(
            &package("Hello world.", &["a", "b", "c"]),
            &ProductionRequest::default(),
            &CancellationToken::new(),
        )
        .await;

    let video = outcome.video().expect("run should complete");
    assert_eq!(video.content_segments, 1);
    assert_eq!(video.images_used, 1);
    assert_eq!(harness.generated.calls(), 3);

    let content = harness.toolkit.content_segments();
    assert_eq!(content.len(), 1);
    assert_eq!(content[0].duration_seconds, NARRATION_SECONDS);
}

#[tokio::test]
async fn stop_after_narration_skips_image_sourcing() {
    let cancel = CancellationToken::new();
    let speech = FakeSpeech {
        stop_after: Some(cancel.clone()),
        ..Default::default()
    };
    let harness = Harness::new(speech, &[]);

    let outcome = harness
        .producer()
        .produce_video(
            &package("Hello world.", &["a red cube"]),
            &ProductionRequest::default(),
            &cancel,
        )
        .await;

    assert!(matches!(
        outcome,
        ProductionOutcome::Cancelled {
            stage: Stage::ResolveImages
        }
    ));
    assert_eq!(harness.generated.calls(), 0);
    assert_eq!(harness.web.calls(), 0);
    assert!(harness.toolkit.segments.lock().unwrap().is_empty());

    let narration = harness.speech.written.lock().unwrap().clone().unwrap();
    assert!(!narration.exists());
    assert!(harness.work_root_is_empty());
    assert_eq!(std::fs::read_dir(harness.output_dir.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn empty_music_pool_keeps_narration_unmixed() {
    let harness = Harness::new(FakeSpeech::default(), &[]);
    let outcome = harness
        .producer()
        .produce_video(
            &package("Hello world.", &["a red cube"]),
            &ProductionRequest::default(),
            &CancellationToken::new(),
        )
        .await;
    assert!(outcome.is_completed());

    let soundtracks = harness.toolkit.soundtracks.lock().unwrap();
    assert_eq!(soundtracks.len(), 1);
    assert!(soundtracks[0].music.is_none());
    assert_eq!(soundtracks[0].narration_offset, 3.0);
    assert_eq!(
        soundtracks[0].narration.file_name().and_then(|n| n.to_str()),
        Some("narration.mp3")
    );
}

#[tokio::test]
async fn rendered_length_is_intro_narration_outro_within_a_frame() {
    for narration in [1.0, 4.37, 10.01, 61.333] {
        let harness =
            Harness::new(FakeSpeech::default(), &[]).with_toolkit(FakeToolkit::new(narration));

        let request = ProductionRequest {
            aspect_ratio: AspectRatio::Portrait,
            ..Default::default()
        };
        let outcome = harness
            .producer()
            .produce_video(
                &package("Some narration.", &["one", "two", "three"]),
                &request,
                &CancellationToken::new(),
            )
            .await;

        let video = outcome.video().expect("run should complete");
        let expected = 3.0 + narration + 5.0;
        let frame = 1.0 / FPS as f64;
        assert!(
            (video.duration_seconds - expected).abs() <= frame,
            "{} vs {}",
            video.duration_seconds,
            expected
        );

        let content_total: f64 = harness
            .toolkit
            .content_segments()
            .iter()
            .map(|segment| segment.duration_seconds)
            .sum();
        assert!((content_total - narration).abs() < 1e-9);
        assert_eq!(harness.toolkit.encoded.lock().unwrap()[0], video.duration_seconds);

        // Clips are whole frames that add up to exactly the encoded length
        let frames: u64 = harness.toolkit.frames.lock().unwrap().iter().sum();
        assert_eq!(frames as f64 / FPS as f64, video.duration_seconds);
    }
}

#[tokio::test]
async fn no_surviving_images_falls_back_to_a_solid_segment() {
    let harness = Harness::new(FakeSpeech::default(), &["a", "b"]);
    let outcome = harness
        .producer()
        .produce_video(
            &package("Hello world.", &["a", "b"]),
            &ProductionRequest::default(),
            &CancellationToken::new(),
        )
        .await;

    let video = outcome.video().expect("run should complete");
    assert_eq!(video.images_used, 0);
    assert_eq!(video.content_segments, 1);
    assert_eq!(video.duration_seconds, 3.0 + NARRATION_SECONDS + 5.0);
}

#[tokio::test]
async fn web_search_mode_never_calls_the_generator() {
    let harness = Harness::new(FakeSpeech::default(), &[]);
    let request = ProductionRequest {
        image_source: ImageSourcingMode::WebSearched,
        ..Default::default()
    };
    let outcome = harness
        .producer()
        .produce_video(
            &package("Hello world.", &["a", "b"]),
            &request,
            &CancellationToken::new(),
        )
        .await;

    assert!(outcome.is_completed());
    assert_eq!(harness.web.calls(), 2);
    assert_eq!(harness.generated.calls(), 0);
}

#[tokio::test]
async fn speech_failure_stops_before_images_and_rendering() {
    let harness = Harness::new(
        FakeSpeech {
            fail: true,
            ..Default::default()
        },
        &[],
    );
    let outcome = harness
        .producer()
        .produce_video(
            &package("Hello world.", &["a red cube"]),
            &ProductionRequest::default(),
            &CancellationToken::new(),
        )
        .await;

    assert!(matches!(
        outcome,
        ProductionOutcome::Failed(ForgeError::AudioGeneration(_))
    ));
    assert_eq!(harness.generated.calls(), 0);
    assert!(harness.toolkit.segments.lock().unwrap().is_empty());
    assert!(harness.toolkit.encoded.lock().unwrap().is_empty());
    assert!(harness.work_root_is_empty());
}

#[tokio::test]
async fn blank_script_is_rejected_before_narration() {
    let harness = Harness::new(FakeSpeech::default(), &[]);
    let outcome = harness
        .producer()
        .produce_video(
            &package("   \n ", &["a red cube"]),
            &ProductionRequest::default(),
            &CancellationToken::new(),
        )
        .await;

    assert!(matches!(
        outcome,
        ProductionOutcome::Failed(ForgeError::Validation(_))
    ));
    assert_eq!(harness.speech.calls.load(Ordering::SeqCst), 0);
    assert!(harness.work_root_is_empty());
}

#[tokio::test]
async fn stop_before_start_touches_nothing() {
    let harness = Harness::new(FakeSpeech::default(), &[]);
    let cancel = CancellationToken::new();
    cancel.trigger();

    let outcome = harness
        .producer()
        .produce_video(
            &package("Hello world.", &["a red cube"]),
            &ProductionRequest::default(),
            &cancel,
        )
        .await;

    assert!(matches!(
        outcome,
        ProductionOutcome::Cancelled {
            stage: Stage::CleanScript
        }
    ));
    assert_eq!(harness.speech.calls.load(Ordering::SeqCst), 0);
    assert!(harness.work_root_is_empty());
}

#[tokio::test]
async fn renders_and_intermediates_are_archived_to_the_store() {
    let harness = Harness::new(FakeSpeech::default(), &[]);
    let archive = tempfile::tempdir().unwrap();
    let producer = harness.producer().with_asset_store(
        Arc::new(LocalAssetStore::new(archive.path())),
        Some("reelforge/".to_string()),
        true,
    );

    let outcome = producer
        .produce_video(
            &package("Hello world.", &["a red cube"]),
            &ProductionRequest::default(),
            &CancellationToken::new(),
        )
        .await;

    let video = outcome.video().expect("run should complete");
    let reference = video.archive_ref.as_deref().expect("render archived");
    assert!(reference.starts_with("file://"));

    let root = archive.path().join("reelforge");
    for category in ["generated_videos", "audio", "images"] {
        let entries = std::fs::read_dir(root.join(category))
            .unwrap_or_else(|_| panic!("missing {} archive", category))
            .count();
        assert_eq!(entries, 1, "{}", category);
    }
    assert!(harness.work_root_is_empty());
}

#[tokio::test]
async fn toolkit_failures_are_production_errors_with_their_cause() {
    let cases = [
        (ToolkitStep::RenderSegment, Stage::BuildTimeline),
        (ToolkitStep::Concat, Stage::Assemble),
        (ToolkitStep::Soundtrack, Stage::Assemble),
        (ToolkitStep::Encode, Stage::Render),
    ];

    for (step, expected_stage) in cases {
        let harness = Harness::new(FakeSpeech::default(), &[])
            .with_toolkit(FakeToolkit::new(NARRATION_SECONDS).failing_at(step));
        let outcome = harness
            .producer()
            .produce_video(
                &package("Hello world.", &["a", "b"]),
                &ProductionRequest::default(),
                &CancellationToken::new(),
            )
            .await;

        match outcome {
            ProductionOutcome::Failed(ForgeError::Production { stage, cause }) => {
                assert_eq!(stage, expected_stage, "{:?}", step);
                assert!(
                    format!("{:#}", cause).contains("exited with status 1"),
                    "{:?}: {:#}",
                    step,
                    cause
                );
            }
            other => panic!("{:?}: unexpected outcome {:?}", step, other),
        }
        assert!(harness.toolkit.encoded.lock().unwrap().is_empty());
        assert!(harness.work_root_is_empty(), "{:?}", step);
        assert!(harness.output_dir_is_empty(), "{:?}", step);
    }
}

#[tokio::test]
async fn stop_during_segment_rendering_skips_assembly() {
    let cancel = CancellationToken::new();
    let harness = Harness::new(FakeSpeech::default(), &[]).with_toolkit(
        FakeToolkit::new(NARRATION_SECONDS).stopping_after(ToolkitStep::RenderSegment, &cancel),
    );

    let outcome = harness
        .producer()
        .produce_video(
            &package("Hello world.", &["a", "b", "c"]),
            &ProductionRequest::default(),
            &cancel,
        )
        .await;

    assert!(matches!(
        outcome,
        ProductionOutcome::Cancelled {
            stage: Stage::BuildTimeline
        }
    ));
    assert_eq!(harness.toolkit.segments.lock().unwrap().len(), 1);
    assert!(harness.toolkit.soundtracks.lock().unwrap().is_empty());
    assert!(harness.toolkit.encoded.lock().unwrap().is_empty());
    assert!(harness.work_root_is_empty());
    assert!(harness.output_dir_is_empty());
}

#[tokio::test]
async fn stop_while_building_the_soundtrack_skips_the_encode() {
    let cancel = CancellationToken::new();
    let harness = Harness::new(FakeSpeech::default(), &[]).with_toolkit(
        FakeToolkit::new(NARRATION_SECONDS).stopping_after(ToolkitStep::Soundtrack, &cancel),
    );

    let outcome = harness
        .producer()
        .produce_video(
            &package("Hello world.", &["a red cube"]),
            &ProductionRequest::default(),
            &cancel,
        )
        .await;

    assert!(matches!(
        outcome,
        ProductionOutcome::Cancelled {
            stage: Stage::Render
        }
    ));
    assert_eq!(harness.toolkit.soundtracks.lock().unwrap().len(), 1);
    assert!(harness.toolkit.encoded.lock().unwrap().is_empty());
    assert!(harness.work_root_is_empty());
    assert!(harness.output_dir_is_empty());
}

#[tokio::test]
async fn stop_after_narration_uploads_no_intermediates() {
    let cancel = CancellationToken::new();
    let speech = FakeSpeech {
        stop_after: Some(cancel.clone()),
        ..Default::default()
    };
    let harness = Harness::new(speech, &[]);
    let archive = tempfile::tempdir().unwrap();
    let producer = harness.producer().with_asset_store(
        Arc::new(LocalAssetStore::new(archive.path())),
        None,
        true,
    );

    let outcome = producer
        .produce_video(
            &package("Hello world.", &["a red cube"]),
            &ProductionRequest::default(),
            &cancel,
        )
        .await;

    assert!(outcome.is_cancelled());
    assert_eq!(std::fs::read_dir(archive.path()).unwrap().count(), 0);
}

/// Generator that always returns the same package and counts topics it was asked for
struct FixedGenerator {
    package: ContentPackage,
    topics: Mutex<Vec<String>>,
}

#[async_trait]
impl ContentGenerator for FixedGenerator {
    async fn generate_video_content(
        &self,
        topic: &str,
        _niche: &str,
        _use_web_context: bool,
    ) -> Result<ContentPackage> {
        self.topics.lock().unwrap().push(topic.to_string());
        Ok(self.package.clone())
    }
}

fn orchestrator(harness: &Harness, archive: &Path) -> (Orchestrator, Arc<FixedGenerator>) {
    let generator = Arc::new(FixedGenerator {
        package: package("Hello world.", &["a red cube"]),
        topics: Mutex::new(Vec::new()),
    });
    let mut publishers = PublisherRegistry::new();
    publishers.register(Box::new(ObjectStoragePublisher::new(
        Arc::new(LocalAssetStore::new(archive)),
        None,
    )));
    (
        Orchestrator::new(generator.clone(), harness.producer(), publishers),
        generator,
    )
}

#[tokio::test]
async fn orchestrated_run_publishes_and_reports_unknown_platforms() {
    let harness = Harness::new(FakeSpeech::default(), &[]);
    let archive = tempfile::tempdir().unwrap();
    let (orchestrator, _) = orchestrator(&harness, archive.path());

    let job = VideoJob {
        topic: "Robots".to_string(),
        niche: "Technology".to_string(),
        use_web_context: false,
        request: ProductionRequest::default(),
        publish_to: vec!["object-storage".to_string(), "youtube".to_string()],
    };
    let report = orchestrator.generate_single_video(&job).await;

    assert_eq!(report.status, RunStatus::Succeeded);
    assert_eq!(report.title.as_deref(), Some("Test video"));
    assert_eq!(report.published.len(), 1);
    assert_eq!(report.published[0].platform, "object-storage");
    assert_eq!(report.publish_errors.len(), 1);
    assert!(report.publish_errors[0].starts_with("youtube"));
    assert!(archive.path().join("published").is_dir());
    assert_eq!(orchestrator.cancellation().active_runs(), 0);
}

#[tokio::test]
async fn stop_with_no_active_run_does_not_carry_over() {
    let harness = Harness::new(FakeSpeech::default(), &[]);
    let archive = tempfile::tempdir().unwrap();
    let (orchestrator, _) = orchestrator(&harness, archive.path());

    orchestrator.trigger_stop();
    let report = orchestrator
        .produce_from_package(
            &package("Hello world.", &["a red cube"]),
            &ProductionRequest::default(),
            &[],
        )
        .await;

    assert_eq!(report.status, RunStatus::Succeeded);
    assert!(report.cancelled_before.is_none());
    assert!(report.published.is_empty());
}

#[tokio::test]
async fn automation_cycle_updates_persisted_stats() {
    let harness = Harness::new(FakeSpeech::default(), &[]);
    let archive = tempfile::tempdir().unwrap();
    let state = tempfile::tempdir().unwrap();
    let (orchestrator, generator) = orchestrator(&harness, archive.path());

    let settings = AutomationConfig {
        niche: "Space".to_string(),
        ..AutomationConfig::default()
    };
    let mut scheduler = AutomationScheduler::new(
        Arc::new(orchestrator),
        settings,
        AspectRatio::Square,
        state.path(),
    );
    scheduler.run(Some(1)).await.unwrap();

    let stats = scheduler.stats();
    assert_eq!(stats.videos_generated, 1);
    assert_eq!(stats.videos_published, 1);
    assert_eq!(stats.errors, 0);
    assert!(stats.last_run.is_some());
    assert!(state.path().join("automation_stats.json").is_file());
    assert_eq!(
        generator.topics.lock().unwrap().as_slice(),
        ["The latest developments in Space"]
    );
}

#[tokio::test]
async fn updated_automation_settings_survive_a_restart() {
    let harness = Harness::new(FakeSpeech::default(), &[]);
    let archive = tempfile::tempdir().unwrap();
    let state = tempfile::tempdir().unwrap();

    let (first, _) = orchestrator(&harness, archive.path());
    let mut scheduler = AutomationScheduler::new(
        Arc::new(first),
        AutomationConfig::default(),
        AspectRatio::Landscape,
        state.path(),
    );
    scheduler
        .update_settings(SettingsUpdate {
            niche: Some("Oceans".to_string()),
            interval_hours: Some(6),
            ..Default::default()
        })
        .unwrap();
    assert!(state.path().join("automation_settings.json").is_file());

    let (second, generator) = orchestrator(&harness, archive.path());
    let mut reopened = AutomationScheduler::new(
        Arc::new(second),
        AutomationConfig::default(),
        AspectRatio::Landscape,
        state.path(),
    );
    let status = reopened.status();
    assert!(!status.running);
    assert_eq!(status.settings.niche, "Oceans");
    assert_eq!(status.settings.interval_hours, 6);
    assert_eq!(status.settings.voice, AutomationConfig::default().voice);
    assert!(status.next_run.is_none());

    let report = reopened.run_single_cycle().await;
    assert_eq!(report.status, RunStatus::Succeeded);
    assert_eq!(
        generator.topics.lock().unwrap().as_slice(),
        ["The latest developments in Oceans"]
    );
    assert_eq!(reopened.status().stats.videos_generated, 1);
}
