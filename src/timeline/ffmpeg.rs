use anyhow::Context;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;

use super::{FrameSpec, MediaToolkit, MusicFit, SoundtrackRequest, TimelineSegment, VisualSource};
use crate::Result;

/// Media toolkit backed by the ffmpeg and ffprobe binaries
pub struct FfmpegToolkit {
    ffmpeg: String,
    ffprobe: String,
}

impl FfmpegToolkit {
    pub fn new(ffmpeg: impl Into<String>, ffprobe: impl Into<String>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            ffprobe: ffprobe.into(),
        }
    }

    async fn run_ffmpeg(&self, args: &[String], what: &str) -> Result<()> {
        tracing::debug!("{} {}", self.ffmpeg, args.join(" "));

        let output = Command::new(&self.ffmpeg)
            .args(["-hide_banner", "-loglevel", "error", "-y"])
            .args(args)
            .stdin(Stdio::null())
            .output()
            .await
            .with_context(|| format!("Failed to run {}", self.ffmpeg))?;

        if !output.status.success() {
            let error = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("Failed to {} with ffmpeg: {}", what, error.trim());
        }

        Ok(())
    }
}

impl Default for FfmpegToolkit {
    fn default() -> Self {
        Self::new("ffmpeg", "ffprobe")
    }
}

fn seconds(value: f64) -> String {
    format!("{:.3}", value)
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// ffmpeg arguments that render one segment as a silent H.264 clip of `frames` frames
pub fn segment_args(
    segment: &TimelineSegment,
    frame: &FrameSpec,
    frames: u64,
    output: &Path,
) -> Vec<String> {
    let (w, h, fps) = (frame.width, frame.height, frame.fps);
    let color_source = |hex: String| format!("color=c={}:s={}x{}:r={}", hex, w, h, fps);

    let mut args: Vec<String> = match &segment.visual {
        VisualSource::SolidColor(color) => {
            vec!["-f".into(), "lavfi".into(), "-i".into(), color_source(color.ffmpeg_hex())]
        }
        VisualSource::BrandLogo {
            logo,
            background,
            height_ratio,
        } => {
            let logo_height = ((h as f64 * height_ratio).round() as u32).max(2);
            vec![
                "-f".into(),
                "lavfi".into(),
                "-i".into(),
                color_source(background.ffmpeg_hex()),
                "-loop".into(),
                "1".into(),
                "-i".into(),
                path_arg(logo),
                "-filter_complex".into(),
                format!(
                    "[1:v]scale=-2:{}[logo];[0:v][logo]overlay=(W-w)/2:(H-h)/2:shortest=1,format=yuv420p[v]",
                    logo_height
                ),
                "-map".into(),
                "[v]".into(),
            ]
        }
        VisualSource::BrandCard(card) => vec![
            "-loop".into(),
            "1".into(),
            "-i".into(),
            path_arg(card),
            "-vf".into(),
            format!("scale={}:{},setsar=1,format=yuv420p", w, h),
        ],
        VisualSource::Image(asset) => vec![
            "-loop".into(),
            "1".into(),
            "-i".into(),
            path_arg(&asset.path),
            "-vf".into(),
            format!(
                "scale={w}:{h}:force_original_aspect_ratio=increase,crop={w}:{h},setsar=1,format=yuv420p"
            ),
        ],
    };

    args.extend([
        "-frames:v".into(),
        frames.to_string(),
        "-r".into(),
        fps.to_string(),
        "-an".into(),
        "-c:v".into(),
        "libx264".into(),
        "-preset".into(),
        "veryfast".into(),
        "-pix_fmt".into(),
        "yuv420p".into(),
        path_arg(output),
    ]);
    args
}

/// Concat demuxer list: one `file '...'` line per clip
pub fn concat_list(clips: &[PathBuf]) -> String {
    clips
        .iter()
        .map(|clip| format!("file '{}'\n", path_arg(clip).replace('\'', r"'\''")))
        .collect()
}

pub fn concat_args(list_file: &Path, output: &Path) -> Vec<String> {
    vec![
        "-f".into(),
        "concat".into(),
        "-safe".into(),
        "0".into(),
        "-i".into(),
        path_arg(list_file),
        "-c".into(),
        "copy".into(),
        path_arg(output),
    ]
}

/// Narration delayed past the intro, padded then trimmed to the full length, with
/// an optional attenuated music bed mixed underneath
pub fn soundtrack_args(request: &SoundtrackRequest, output: &Path) -> Vec<String> {
    let total = seconds(request.total_duration);
    let delay_ms = (request.narration_offset * 1000.0).round() as u64;
    let normalize = "aresample=44100,aformat=sample_fmts=fltp:channel_layouts=stereo";

    let mut args = vec!["-i".to_string(), path_arg(&request.narration)];
    let narration_chain = format!(
        "[0:a]{normalize},adelay=delays={delay_ms}:all=1,apad,atrim=0:{total},asetpts=PTS-STARTPTS"
    );

    let (filter, label) = match &request.music {
        Some(bed) => {
            if bed.fit == MusicFit::Loop {
                args.extend(["-stream_loop".to_string(), "-1".to_string()]);
            }
            args.extend(["-i".to_string(), path_arg(&bed.track)]);
            (
                format!(
                    "{narration_chain}[narr];[1:a]{normalize},atrim=0:{total},asetpts=PTS-STARTPTS,volume={:.3}[bed];[narr][bed]amix=inputs=2:duration=first:dropout_transition=0:normalize=0[mix]",
                    bed.volume
                ),
                "[mix]",
            )
        }
        None => (format!("{narration_chain}[narr]"), "[narr]"),
    };

    args.extend([
        "-filter_complex".to_string(),
        filter,
        "-map".to_string(),
        label.to_string(),
        "-t".to_string(),
        total,
        "-c:a".to_string(),
        "aac".to_string(),
        "-b:a".to_string(),
        "192k".to_string(),
        path_arg(output),
    ]);
    args
}

pub fn encode_args(
    video_track: &Path,
    soundtrack: &Path,
    frame: &FrameSpec,
    duration_seconds: f64,
    output: &Path,
) -> Vec<String> {
    vec![
        "-i".into(),
        path_arg(video_track),
        "-i".into(),
        path_arg(soundtrack),
        "-map".into(),
        "0:v:0".into(),
        "-map".into(),
        "1:a:0".into(),
        "-c:v".into(),
        "libx264".into(),
        "-preset".into(),
        "medium".into(),
        "-pix_fmt".into(),
        "yuv420p".into(),
        "-r".into(),
        frame.fps.to_string(),
        "-c:a".into(),
        "aac".into(),
        "-b:a".into(),
        "192k".into(),
        "-t".into(),
        seconds(duration_seconds),
        "-movflags".into(),
        "+faststart".into(),
        "-threads".into(),
        "4".into(),
        path_arg(output),
    ]
}

#[async_trait]
impl MediaToolkit for FfmpegToolkit {
    async fn probe_duration(&self, path: &Path) -> Result<f64> {
        let output = Command::new(&self.ffprobe)
            .args([
                "-v",
                "quiet",
                "-print_format",
                "json",
                "-show_format",
                &path.to_string_lossy(),
            ])
            .output()
            .await
            .with_context(|| format!("Failed to run {}", self.ffprobe))?;

        if !output.status.success() {
            let error = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("Failed to analyze file with ffprobe: {}", error);
        }

        let info: serde_json::Value = serde_json::from_slice(&output.stdout)?;
        info["format"]["duration"]
            .as_str()
            .and_then(|d| d.parse::<f64>().ok())
            .with_context(|| format!("No duration reported for {}", path.display()))
    }

    async fn render_segment(
        &self,
        segment: &TimelineSegment,
        frame: &FrameSpec,
        frames: u64,
        output: &Path,
    ) -> Result<()> {
        self.run_ffmpeg(&segment_args(segment, frame, frames, output), "render segment")
            .await
    }

    async fn concat_segments(&self, clips: &[PathBuf], output: &Path) -> Result<()> {
        let list_file = output.with_extension("txt");
        tokio::fs::write(&list_file, concat_list(clips))
            .await
            .with_context(|| format!("Failed to write {}", list_file.display()))?;
        self.run_ffmpeg(&concat_args(&list_file, output), "concatenate segments")
            .await
    }

    async fn build_soundtrack(&self, request: &SoundtrackRequest, output: &Path) -> Result<()> {
        self.run_ffmpeg(&soundtrack_args(request, output), "build soundtrack")
            .await
    }

    async fn encode_final(
        &self,
        video_track: &Path,
        soundtrack: &Path,
        frame: &FrameSpec,
        duration_seconds: f64,
        output: &Path,
    ) -> Result<()> {
        self.run_ffmpeg(
            &encode_args(video_track, soundtrack, frame, duration_seconds, output),
            "encode video",
        )
        .await
    }
}
