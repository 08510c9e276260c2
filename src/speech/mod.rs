use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub mod google;

pub use google::GoogleTranslateTts;

use crate::timeline::MediaToolkit;
use crate::Result;

/// Voice selection for narration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceProfile {
    pub name: String,
    pub language: String,
    /// Regional accent, expressed as the engine's top-level domain
    pub accent_tld: String,
}

impl VoiceProfile {
    /// Known profiles: `female_voice` (en, US) and `male_voice` (en, UK); anything else
    /// falls back to the default accent.
    pub fn from_name(name: &str) -> Self {
        let accent = match name {
            "male_voice" => "co.uk",
            _ => "com",
        };
        Self {
            name: name.to_string(),
            language: "en".to_string(),
            accent_tld: accent.to_string(),
        }
    }
}

impl Default for VoiceProfile {
    fn default() -> Self {
        Self::from_name("female_voice")
    }
}

/// Synthesised narration; timing for the whole video hangs off `duration_seconds`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NarrationTrack {
    pub path: PathBuf,
    pub duration_seconds: f64,
}

/// Drop heading and bold-marker lines, trim the rest and join them with single spaces
pub fn clean_script_text(text: &str) -> String {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#') && !line.starts_with("**"))
        .collect::<Vec<_>>()
        .join(" ")
}

/// A speech synthesis backend
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SpeechEngine: Send + Sync {
    fn engine_name(&self) -> &'static str;

    /// Write speech for `text` to `output_path`
    async fn synthesize_to_file(
        &self,
        text: &str,
        voice: &VoiceProfile,
        output_path: &Path,
    ) -> Result<()>;
}

/// Text-to-speech adapter: cleaned text in, narration of known duration out
pub struct TextToSpeech {
    engine: Arc<dyn SpeechEngine>,
    toolkit: Arc<dyn MediaToolkit>,
}

impl TextToSpeech {
    pub fn new(engine: Arc<dyn SpeechEngine>, toolkit: Arc<dyn MediaToolkit>) -> Self {
        Self { engine, toolkit }
    }

    /// Synthesise narration into `output_dir`.
    ///
    /// Returns `None` when the text is empty after cleaning, the engine fails, or the
    /// result has no measurable duration. No partial file is left behind in that case.
    pub async fn synthesize(
        &self,
        text: &str,
        voice: &VoiceProfile,
        output_dir: &Path,
    ) -> Option<NarrationTrack> {
        let cleaned = clean_script_text(text);
        if cleaned.is_empty() {
            tracing::warn!("Nothing to narrate after cleaning the script");
            return None;
        }

        let path = output_dir.join("narration.mp3");
        tracing::info!(
            engine = self.engine.engine_name(),
            voice = %voice.name,
            "Synthesising {} characters of narration",
            cleaned.chars().count()
        );

        if let Err(e) = self.engine.synthesize_to_file(&cleaned, voice, &path).await {
            tracing::error!("Speech synthesis failed: {:#}", e);
            discard(&path).await;
            return None;
        }

        match self.toolkit.probe_duration(&path).await {
            Ok(duration_seconds) if duration_seconds > 0.0 => {
                tracing::info!("Narration ready: {:.2}s", duration_seconds);
                Some(NarrationTrack {
                    path,
                    duration_seconds,
                })
            }
            Ok(duration_seconds) => {
                tracing::error!("Narration has no usable duration ({})", duration_seconds);
                discard(&path).await;
                None
            }
            Err(e) => {
                tracing::error!("Could not measure narration: {:#}", e);
                discard(&path).await;
                None
            }
        }
    }
}

async fn discard(path: &Path) {
    if tokio::fs::try_exists(path).await.unwrap_or(false) {
        if let Err(e) = tokio::fs::remove_file(path).await {
            tracing::warn!("Failed to remove {}: {}", path.display(), e);
        }
    }
}
