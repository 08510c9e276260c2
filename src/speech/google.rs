use anyhow::Context;
use async_trait::async_trait;
use reqwest::header::USER_AGENT;
use reqwest::Client;
use std::path::Path;
use std::time::Duration;
use tokio::io::AsyncWriteExt;

use super::{SpeechEngine, VoiceProfile};
use crate::Result;

/// The translate endpoint rejects longer inputs
const MAX_CHUNK_CHARS: usize = 100;

/// Speech engine backed by Google Translate's public TTS endpoint (MP3 output)
pub struct GoogleTranslateTts {
    client: Client,
    timeout: Duration,
}

impl GoogleTranslateTts {
    pub fn new(timeout: Duration) -> Self {
        Self {
            client: Client::new(),
            timeout,
        }
    }

    async fn fetch_chunk(&self, chunk: &str, voice: &VoiceProfile) -> Result<Vec<u8>> {
        let url = format!(
            "https://translate.google.{}/translate_tts?ie=UTF-8&client=tw-ob&tl={}&q={}",
            voice.accent_tld,
            urlencoding::encode(&voice.language),
            urlencoding::encode(chunk)
        );

        let response = self
            .client
            .get(&url)
            .header(USER_AGENT, "Mozilla/5.0")
            .timeout(self.timeout)
            .send()
            .await?;

        if !response.status().is_success() {
            anyhow::bail!("TTS request failed: HTTP {}", response.status());
        }

        Ok(response.bytes().await?.to_vec())
    }
}

/// Split text into word-aligned chunks of at most `max_chars` characters.
///
/// A single word longer than the limit is split hard.
pub fn chunk_text(text: &str, max_chars: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        let needed = if current.is_empty() {
            word.chars().count()
        } else {
            current.chars().count() + 1 + word.chars().count()
        };

        if needed <= max_chars {
            if !current.is_empty() {
                current.push(' ');
            }
            current.push_str(word);
            continue;
        }

        if !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
        }

        let chars: Vec<char> = word.chars().collect();
        let mut pieces = chars.chunks(max_chars.max(1)).peekable();
        while let Some(piece) = pieces.next() {
            let piece: String = piece.iter().collect();
            if pieces.peek().is_some() {
                chunks.push(piece);
            } else {
                current = piece;
            }
        }
    }

    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

#[async_trait]
impl SpeechEngine for GoogleTranslateTts {
    fn engine_name(&self) -> &'static str {
        "google-translate"
    }

    async fn synthesize_to_file(
        &self,
        text: &str,
        voice: &VoiceProfile,
        output_path: &Path,
    ) -> Result<()> {
        let chunks = chunk_text(text, MAX_CHUNK_CHARS);
        if chunks.is_empty() {
            anyhow::bail!("No text to synthesise");
        }

        let mut file = tokio::fs::File::create(output_path)
            .await
            .with_context(|| format!("Failed to create {}", output_path.display()))?;

        for (index, chunk) in chunks.iter().enumerate() {
            tracing::debug!(index, total = chunks.len(), "Requesting speech chunk");
            let audio = self
                .fetch_chunk(chunk, voice)
                .await
                .with_context(|| format!("Speech chunk {} of {} failed", index + 1, chunks.len()))?;
            file.write_all(&audio).await?;
        }

        file.flush().await?;
        Ok(())
    }
}
