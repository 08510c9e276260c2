use async_trait::async_trait;
use reqwest::multipart::Form;
use reqwest::Client;
use std::time::Duration;

use super::{AspectRatio, ImageProvider, SourceKind};
use crate::cancel::CancellationToken;
use crate::Result;

const DEFAULT_ENDPOINT: &str = "https://api.stability.ai/v2beta/stable-image/generate/ultra";

/// Generative image provider backed by the Stability AI REST API
pub struct StabilityGenerator {
    client: Client,
    api_key: Option<String>,
    endpoint: String,
    timeout: Duration,
}

impl StabilityGenerator {
    pub fn new(api_key: Option<String>, timeout: Duration) -> Self {
        if api_key.is_none() {
            tracing::warn!("STABILITY_AI_API_KEY not configured; generated images will be skipped");
        }
        Self {
            client: Client::new(),
            api_key,
            endpoint: DEFAULT_ENDPOINT.to_string(),
            timeout,
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

/// Wrap a scene prompt with the fixed stylistic qualifiers
pub fn embellish_prompt(prompt: &str) -> String {
    format!(
        "concept art for a youtube video, {}, cinematic, ultra realistic, 8k",
        prompt.trim()
    )
}

#[async_trait]
impl ImageProvider for StabilityGenerator {
    fn source_kind(&self) -> SourceKind {
        SourceKind::Generated
    }

    async fn fetch_image(
        &self,
        prompt: &str,
        aspect_ratio: AspectRatio,
        _cancel: &CancellationToken,
    ) -> Result<Vec<u8>> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("Stability API key is not configured"))?;

        let form = Form::new()
            .text("prompt", embellish_prompt(prompt))
            .text("output_format", "png")
            .text("aspect_ratio", aspect_ratio.as_str());

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(api_key)
            .header("accept", "image/*")
            .multipart(form)
            .timeout(self.timeout)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let snippet: String = body.chars().take(200).collect();
            anyhow::bail!("Image generation failed: HTTP {} {}", status, snippet);
        }

        Ok(response.bytes().await?.to_vec())
    }
}
