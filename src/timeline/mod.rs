//! Timeline assembly: segment timing, brand bumpers, music bed and the media
//! toolkit that turns a timeline into an encoded file.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub mod assembler;
pub mod ffmpeg;
pub mod music;

pub use assembler::{AssembledTracks, TimelineAssembler};
pub use ffmpeg::FfmpegToolkit;
pub use music::{MusicBed, MusicFit, MusicPool};

use crate::config::ProductionConfig;
use crate::visuals::{AspectRatio, ImageAsset};
use crate::Result;

/// An opaque RGB colour
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RgbColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl RgbColor {
    pub const BLACK: RgbColor = RgbColor { r: 0, g: 0, b: 0 };

    /// Parse `#rrggbb` or `rrggbb`
    pub fn parse(value: &str) -> Result<Self> {
        let hex = value.trim().trim_start_matches('#');
        if hex.len() != 6 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            anyhow::bail!("Invalid colour '{}', expected #rrggbb", value);
        }
        let channel = |range: std::ops::Range<usize>| u8::from_str_radix(&hex[range], 16);
        Ok(Self {
            r: channel(0..2)?,
            g: channel(2..4)?,
            b: channel(4..6)?,
        })
    }

    /// Colour in ffmpeg's `0xRRGGBB` notation
    pub fn ffmpeg_hex(&self) -> String {
        format!("0x{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

/// Output frame geometry and rate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameSpec {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

impl FrameSpec {
    pub fn for_aspect(aspect_ratio: AspectRatio, fps: u32) -> Self {
        let (width, height) = aspect_ratio.resolution();
        Self { width, height, fps }
    }

    /// Length of one frame in seconds
    pub fn frame_interval(&self) -> f64 {
        1.0 / self.fps as f64
    }

    /// Round a duration to the nearest whole frame
    pub fn snap(&self, seconds: f64) -> f64 {
        self.frames(seconds) as f64 / self.fps as f64
    }

    /// Nearest whole number of frames covering `seconds`
    pub fn frames(&self, seconds: f64) -> u64 {
        (seconds * self.fps as f64).round().max(0.0) as u64
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SegmentKind {
    Intro,
    Content,
    Outro,
}

/// What a segment shows
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum VisualSource {
    /// A sourced image, filled and cropped to the frame
    Image(ImageAsset),
    /// Brand background with a centred logo
    BrandLogo {
        logo: PathBuf,
        background: RgbColor,
        height_ratio: f64,
    },
    /// Static branded card stretched to the frame
    BrandCard(PathBuf),
    /// Plain background
    SolidColor(RgbColor),
}

/// One ordered, timed unit of the final video
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineSegment {
    pub kind: SegmentKind,
    pub duration_seconds: f64,
    pub visual: VisualSource,
}

/// Fixed look of the bumpers and fallbacks
#[derive(Debug, Clone)]
pub struct TimelineSettings {
    pub intro_seconds: f64,
    pub outro_seconds: f64,
    pub brand_color: RgbColor,
    pub content_fallback_color: RgbColor,
    pub logo_height_ratio: f64,
    pub intro_logo: Option<PathBuf>,
    pub outro_card: Option<PathBuf>,
}

impl Default for TimelineSettings {
    fn default() -> Self {
        Self {
            intro_seconds: 3.0,
            outro_seconds: 5.0,
            brand_color: RgbColor { r: 13, g: 17, b: 23 },
            content_fallback_color: RgbColor::BLACK,
            logo_height_ratio: 0.2,
            intro_logo: None,
            outro_card: None,
        }
    }
}

impl TimelineSettings {
    /// Build settings from configuration, keeping brand assets only if they exist on disk
    pub fn from_config(production: &ProductionConfig) -> Result<Self> {
        let existing = |path: PathBuf| {
            if path.is_file() {
                Some(path)
            } else {
                tracing::debug!("Brand asset not found: {}", path.display());
                None
            }
        };

        Ok(Self {
            intro_seconds: production.intro_seconds,
            outro_seconds: production.outro_seconds,
            brand_color: RgbColor::parse(&production.brand_color)?,
            content_fallback_color: RgbColor::parse(&production.content_fallback_color)?,
            logo_height_ratio: production.logo_height_ratio,
            intro_logo: existing(production.intro_logo()),
            outro_card: existing(production.outro_card()),
        })
    }
}

/// Split the narration evenly across `count` content segments.
///
/// Every segment gets `narration / count`; the last one absorbs the floating-point
/// remainder so the durations always sum to the narration exactly.
pub fn content_durations(narration_seconds: f64, count: usize) -> Vec<f64> {
    if count == 0 {
        return Vec::new();
    }
    let share = narration_seconds / count as f64;
    let mut durations = vec![share; count];
    let preceding: f64 = durations[..count - 1].iter().sum();
    durations[count - 1] = narration_seconds - preceding;
    durations
}

/// Ordered segment plan for one video
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Timeline {
    segments: Vec<TimelineSegment>,
    narration_seconds: f64,
}

impl Timeline {
    /// Intro, then one content segment per image (or a solid fallback), then outro
    pub fn build(narration_seconds: f64, images: &[ImageAsset], settings: &TimelineSettings) -> Self {
        let mut segments = Vec::with_capacity(images.len() + 2);

        let intro_visual = match &settings.intro_logo {
            Some(logo) => VisualSource::BrandLogo {
                logo: logo.clone(),
                background: settings.brand_color,
                height_ratio: settings.logo_height_ratio,
            },
            None => VisualSource::SolidColor(settings.brand_color),
        };
        segments.push(TimelineSegment {
            kind: SegmentKind::Intro,
            duration_seconds: settings.intro_seconds,
            visual: intro_visual,
        });

        if images.is_empty() {
            segments.push(TimelineSegment {
                kind: SegmentKind::Content,
                duration_seconds: narration_seconds,
                visual: VisualSource::SolidColor(settings.content_fallback_color),
            });
        } else {
            let durations = content_durations(narration_seconds, images.len());
            segments.extend(images.iter().zip(durations).map(|(image, duration)| {
                TimelineSegment {
                    kind: SegmentKind::Content,
                    duration_seconds: duration,
                    visual: VisualSource::Image(image.clone()),
                }
            }));
        }

        let outro_visual = match &settings.outro_card {
            Some(card) => VisualSource::BrandCard(card.clone()),
            None => VisualSource::SolidColor(settings.brand_color),
        };
        segments.push(TimelineSegment {
            kind: SegmentKind::Outro,
            duration_seconds: settings.outro_seconds,
            visual: outro_visual,
        });

        Self {
            segments,
            narration_seconds,
        }
    }

    pub fn segments(&self) -> &[TimelineSegment] {
        &self.segments
    }

    pub fn content_segments(&self) -> impl Iterator<Item = &TimelineSegment> {
        self.segments
            .iter()
            .filter(|segment| segment.kind == SegmentKind::Content)
    }

    pub fn narration_seconds(&self) -> f64 {
        self.narration_seconds
    }

    /// Where narration starts: the end of the intro
    pub fn narration_offset(&self) -> f64 {
        self.segments
            .iter()
            .take_while(|segment| segment.kind == SegmentKind::Intro)
            .map(|segment| segment.duration_seconds)
            .sum()
    }

    pub fn total_duration(&self) -> f64 {
        self.segments.iter().map(|segment| segment.duration_seconds).sum()
    }

    /// Whole frames to render for each segment.
    ///
    /// Counts come from rounding each segment's cumulative end time, so clips never drift
    /// against the narration and together they last exactly `frame.snap(total_duration())`.
    pub fn frame_counts(&self, frame: &FrameSpec) -> Vec<u64> {
        let mut end = 0.0;
        let mut rendered = 0u64;
        self.segments
            .iter()
            .map(|segment| {
                end += segment.duration_seconds;
                let boundary = frame.frames(end);
                let count = boundary.saturating_sub(rendered);
                rendered = rendered.max(boundary);
                count
            })
            .collect()
    }
}

/// Inputs for the mixed audio track
#[derive(Debug, Clone, PartialEq)]
pub struct SoundtrackRequest {
    pub narration: PathBuf,
    /// Silence before narration starts (the intro)
    pub narration_offset: f64,
    /// Length of the whole video
    pub total_duration: f64,
    /// Optional music bed under the narration
    pub music: Option<MusicBed>,
}

/// Media operations the assembler needs; the production implementation shells out to ffmpeg
#[async_trait]
pub trait MediaToolkit: Send + Sync {
    /// Duration of an audio or video file in seconds
    async fn probe_duration(&self, path: &Path) -> Result<f64>;

    /// Render one segment as a silent clip of exactly `frames` frames
    async fn render_segment(
        &self,
        segment: &TimelineSegment,
        frame: &FrameSpec,
        frames: u64,
        output: &Path,
    ) -> Result<()>;

    /// Join clips back to back into one silent video track
    async fn concat_segments(&self, clips: &[PathBuf], output: &Path) -> Result<()>;

    /// Place narration after the intro, pad to full length and optionally mix music
    async fn build_soundtrack(&self, request: &SoundtrackRequest, output: &Path) -> Result<()>;

    /// Mux video and soundtrack into the final encoded file
    async fn encode_final(
        &self,
        video_track: &Path,
        soundtrack: &Path,
        frame: &FrameSpec,
        duration_seconds: f64,
        output: &Path,
    ) -> Result<()>;
}
