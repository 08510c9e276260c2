use rand::seq::SliceRandom;
use rand::Rng;
use std::path::{Path, PathBuf};

/// Audio extensions picked up from the music directory
const MUSIC_EXTENSIONS: &[&str] = &["mp3", "wav"];

/// Background tracks available to a run
#[derive(Debug, Clone, Default)]
pub struct MusicPool {
    tracks: Vec<PathBuf>,
}

impl MusicPool {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn new(tracks: Vec<PathBuf>) -> Self {
        Self { tracks }
    }

    /// Collect mp3/wav files from `dir`; a missing directory yields an empty pool
    pub fn scan(dir: &Path) -> Self {
        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::debug!("No music directory at {}: {}", dir.display(), e);
                return Self::empty();
            }
        };

        let mut tracks: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.is_file() && has_music_extension(path))
            .collect();
        tracks.sort();

        tracing::debug!("Found {} music track(s) in {}", tracks.len(), dir.display());
        Self { tracks }
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn tracks(&self) -> &[PathBuf] {
        &self.tracks
    }

    pub fn pick<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<&Path> {
        self.tracks.choose(rng).map(PathBuf::as_path)
    }
}

fn has_music_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| MUSIC_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// How a track is fitted to the video length
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MusicFit {
    /// Track is shorter than the video: repeat it
    Loop,
    /// Track covers the video: cut it at the end
    Trim,
}

/// A chosen track, fitted and attenuated for mixing
#[derive(Debug, Clone, PartialEq)]
pub struct MusicBed {
    pub track: PathBuf,
    pub fit: MusicFit,
    pub volume: f64,
}

impl MusicBed {
    pub fn fit_to(track: PathBuf, track_seconds: f64, video_seconds: f64, volume: f64) -> Self {
        let fit = if track_seconds < video_seconds {
            MusicFit::Loop
        } else {
            MusicFit::Trim
        };
        Self { track, fit, volume }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_scan_filters_extensions() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.wav", "a.MP3", "notes.txt", "cover.png"] {
            std::fs::write(dir.path().join(name), b"x").unwrap();
        }
        std::fs::create_dir(dir.path().join("nested.mp3")).unwrap();

        let pool = MusicPool::scan(dir.path());
        let names: Vec<_> = pool
            .tracks()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, ["a.MP3", "b.wav"]);
    }

    #[test]
    fn test_missing_directory_is_empty() {
        let pool = MusicPool::scan(Path::new("/definitely/not/here"));
        assert!(pool.is_empty());
        assert!(pool.pick(&mut StdRng::seed_from_u64(1)).is_none());
    }

    #[test]
    fn test_pick_stays_within_pool() {
        let pool = MusicPool::new(vec![PathBuf::from("one.mp3"), PathBuf::from("two.mp3")]);
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..10 {
            let picked = pool.pick(&mut rng).unwrap();
            assert!(pool.tracks().iter().any(|t| t == picked));
        }
    }

    #[test]
    fn test_fit_loops_short_tracks_and_trims_long_ones() {
        let short = MusicBed::fit_to(PathBuf::from("s.mp3"), 20.0, 60.0, 0.1);
        assert_eq!(short.fit, MusicFit::Loop);
        let long = MusicBed::fit_to(PathBuf::from("l.mp3"), 120.0, 60.0, 0.1);
        assert_eq!(long.fit, MusicFit::Trim);
        assert_eq!(long.volume, 0.1);
    }
}
