use rand::thread_rng;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::{
    FrameSpec, MediaToolkit, MusicBed, MusicPool, SoundtrackRequest, Timeline, TimelineSettings,
};
use crate::cancel::CancellationToken;
use crate::producer::Stage;
use crate::speech::NarrationTrack;
use crate::visuals::ImageAsset;
use crate::ForgeError;

type StageResult<T> = std::result::Result<T, ForgeError>;

/// Silent video track and mixed audio track, ready for the final encode
#[derive(Debug, Clone, PartialEq)]
pub struct AssembledTracks {
    pub video_track: PathBuf,
    pub soundtrack: PathBuf,
}

/// Composes intro, content and outro segments with narration and an optional music bed
pub struct TimelineAssembler {
    toolkit: Arc<dyn MediaToolkit>,
    settings: TimelineSettings,
    music: MusicPool,
    music_volume: f64,
}

impl TimelineAssembler {
    pub fn new(toolkit: Arc<dyn MediaToolkit>, settings: TimelineSettings) -> Self {
        Self {
            toolkit,
            settings,
            music: MusicPool::empty(),
            music_volume: 0.1,
        }
    }

    pub fn with_music(mut self, pool: MusicPool, volume: f64) -> Self {
        self.music = pool;
        self.music_volume = volume;
        self
    }

    pub fn settings(&self) -> &TimelineSettings {
        &self.settings
    }

    pub fn toolkit(&self) -> Arc<dyn MediaToolkit> {
        Arc::clone(&self.toolkit)
    }

    /// Lay out the segments for a narration of the given length
    pub fn plan(&self, narration_seconds: f64, images: &[ImageAsset]) -> Timeline {
        Timeline::build(narration_seconds, images, &self.settings)
    }

    /// Render every segment to its own clip, checking for cancellation between segments
    pub async fn render_segments(
        &self,
        timeline: &Timeline,
        frame: &FrameSpec,
        work_dir: &Path,
        cancel: &CancellationToken,
    ) -> StageResult<Vec<PathBuf>> {
        let mut clips = Vec::with_capacity(timeline.segments().len());
        let frame_counts = timeline.frame_counts(frame);

        for (index, (segment, frames)) in timeline.segments().iter().zip(frame_counts).enumerate() {
            cancel.checkpoint(Stage::BuildTimeline)?;

            let clip = work_dir.join(format!("segment_{:03}.mp4", index));
            tracing::debug!(
                index,
                kind = ?segment.kind,
                frames,
                "Rendering {:.2}s segment",
                segment.duration_seconds
            );
            self.toolkit
                .render_segment(segment, frame, frames, &clip)
                .await
                .map_err(|e| ForgeError::production(Stage::BuildTimeline, e))?;
            clips.push(clip);
        }

        Ok(clips)
    }

    /// Concatenate the clips and build the soundtrack.
    ///
    /// A music failure never fails the run: the soundtrack is rebuilt from narration alone.
    pub async fn assemble(
        &self,
        timeline: &Timeline,
        clips: &[PathBuf],
        narration: &NarrationTrack,
        work_dir: &Path,
    ) -> StageResult<AssembledTracks> {
        let video_track = work_dir.join("video_track.mp4");
        self.toolkit
            .concat_segments(clips, &video_track)
            .await
            .map_err(|e| ForgeError::production(Stage::Assemble, e))?;

        let soundtrack = work_dir.join("soundtrack.m4a");
        let mut request = SoundtrackRequest {
            narration: narration.path.clone(),
            narration_offset: timeline.narration_offset(),
            total_duration: timeline.total_duration(),
            music: self.choose_music_bed(timeline.total_duration()).await,
        };

        if let Err(e) = self.toolkit.build_soundtrack(&request, &soundtrack).await {
            if request.music.is_none() {
                return Err(ForgeError::production(Stage::Assemble, e));
            }
            tracing::warn!("Background music failed, continuing with narration only: {:#}", e);
            request.music = None;
            self.toolkit
                .build_soundtrack(&request, &soundtrack)
                .await
                .map_err(|e| ForgeError::production(Stage::Assemble, e))?;
        }

        Ok(AssembledTracks {
            video_track,
            soundtrack,
        })
    }

    /// Encode the assembled tracks into `output`
    pub async fn encode(
        &self,
        tracks: &AssembledTracks,
        frame: &FrameSpec,
        duration_seconds: f64,
        output: &Path,
    ) -> StageResult<()> {
        self.toolkit
            .encode_final(
                &tracks.video_track,
                &tracks.soundtrack,
                frame,
                duration_seconds,
                output,
            )
            .await
            .map_err(|e| ForgeError::production(Stage::Render, e))
    }

    /// Pick a random track and fit it to the video; any problem means no music
    async fn choose_music_bed(&self, video_seconds: f64) -> Option<MusicBed> {
        let track = self.music.pick(&mut thread_rng())?.to_path_buf();

        match self.toolkit.probe_duration(&track).await {
            Ok(track_seconds) if track_seconds > 0.0 => {
                let bed = MusicBed::fit_to(track, track_seconds, video_seconds, self.music_volume);
                tracing::info!("Background music: {} ({:?})", bed.track.display(), bed.fit);
                Some(bed)
            }
            Ok(_) => {
                tracing::warn!("Skipping empty music track {}", track.display());
                None
            }
            Err(e) => {
                tracing::warn!("Skipping unreadable music track {}: {:#}", track.display(), e);
                None
            }
        }
    }
}
