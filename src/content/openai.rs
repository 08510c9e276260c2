use anyhow::Context;
use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde::Deserialize;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use super::{ContentGenerator, ContentPackage};
use crate::research::ContextResearcher;
use crate::storage::{archive_key, AssetStore};
use crate::Result;

const DEFAULT_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";

/// How much research text is handed to the model
const MAX_CONTEXT_CHARS: usize = 4000;

#[derive(Debug, Deserialize)]
struct ChatCompletion {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Content generator backed by the OpenAI chat completions API in JSON mode
pub struct OpenAiGenerator {
    client: Client,
    api_key: Option<String>,
    model: String,
    endpoint: String,
    timeout: Duration,
    researcher: Option<Arc<dyn ContextResearcher>>,
    archive: Option<Arc<dyn AssetStore>>,
    key_prefix: Option<String>,
}

impl OpenAiGenerator {
    pub fn new(api_key: Option<String>, model: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: Client::new(),
            api_key,
            model: model.into(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            timeout,
            researcher: None,
            archive: None,
            key_prefix: None,
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Use `researcher` when web context is requested
    pub fn with_researcher(mut self, researcher: Arc<dyn ContextResearcher>) -> Self {
        self.researcher = Some(researcher);
        self
    }

    /// Archive every generated package to `store`
    pub fn with_archive(mut self, store: Arc<dyn AssetStore>, key_prefix: Option<String>) -> Self {
        self.archive = Some(store);
        self.key_prefix = key_prefix;
        self
    }

    async fn complete(&self, prompt: &str) -> Result<String> {
        let api_key = self
            .api_key
            .as_deref()
            .context("OpenAI API key is not configured")?;

        let body = serde_json::json!({
            "model": self.model,
            "response_format": { "type": "json_object" },
            "messages": [
                {
                    "role": "system",
                    "content": "You are a helpful assistant that only outputs valid JSON."
                },
                { "role": "user", "content": prompt }
            ]
        });

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(api_key)
            .json(&body)
            .timeout(self.timeout)
            .send()
            .await
            .context("Failed to reach the language model")?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            let snippet: String = text.chars().take(200).collect();
            anyhow::bail!("Language model request failed: HTTP {} {}", status, snippet);
        }

        let completion: ChatCompletion = response.json().await?;
        completion_text(completion)
    }

    /// Upload the package as pretty JSON; failures are logged only
    async fn archive_package(&self, package: &ContentPackage) {
        let Some(store) = &self.archive else {
            return;
        };

        let file = match stage_json(package) {
            Ok(file) => file,
            Err(e) => {
                tracing::warn!("Could not stage content package for archiving: {:#}", e);
                return;
            }
        };

        let key = archive_key(
            self.key_prefix.as_deref(),
            "generated_content",
            "youtube_content",
            "json",
            Utc::now(),
        );
        match store.put(file.path(), &key).await {
            Some(reference) => tracing::info!("Content package archived to {}", reference),
            None => tracing::warn!("Content package archiving failed; continuing"),
        }
    }
}

/// Write the package to a temporary `.json` file, removed when dropped
fn stage_json(package: &ContentPackage) -> Result<tempfile::NamedTempFile> {
    let mut file = tempfile::Builder::new().suffix(".json").tempfile()?;
    serde_json::to_writer_pretty(&mut file, package)?;
    file.flush()?;
    Ok(file)
}

fn completion_text(completion: ChatCompletion) -> Result<String> {
    completion
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .filter(|content| !content.trim().is_empty())
        .context("Language model returned an empty response")
}

/// Prompt asking for the five-key JSON package, grounded on `context` when present
pub fn build_prompt(topic: &str, niche: &str, context: Option<&str>) -> String {
    let mut prompt = format!(
        "You are an expert-level YouTube scriptwriter for a '{}' channel. \
         Generate a complete content package for a video on: '{}'.",
        niche, topic
    );

    if let Some(context) = context {
        let excerpt: String = context.chars().take(MAX_CONTEXT_CHARS).collect();
        prompt.push_str(
            "\n\nBase the script, title and image prompts on the following context. \
             Treat it as the single source of truth.\n\nCONTEXT:\n---\n",
        );
        prompt.push_str(&excerpt);
        prompt.push_str("\n---");
    }

    prompt.push_str(
        "\nThe output MUST be a single valid JSON object with exactly these keys: \
         \"title\", \"description\", \"tags\", \"script\", \"image_prompts\".",
    );
    prompt
}

#[async_trait]
impl ContentGenerator for OpenAiGenerator {
    async fn generate_video_content(
        &self,
        topic: &str,
        niche: &str,
        use_web_context: bool,
    ) -> Result<ContentPackage> {
        let context = match (&self.researcher, use_web_context) {
            (Some(researcher), true) => {
                let found = researcher.research(topic).await;
                if found.is_none() {
                    tracing::warn!("Proceeding without web context");
                }
                found
            }
            (None, true) => {
                tracing::warn!("Web context requested but no researcher is configured");
                None
            }
            _ => None,
        };

        tracing::info!("Generating content for '{}' ({})", topic, niche);
        let prompt = build_prompt(topic, niche, context.as_deref());
        let raw = self.complete(&prompt).await?;

        let package = ContentPackage::from_json(&raw).with_context(|| {
            let preview: String = raw.chars().take(200).collect();
            format!("Language model returned malformed JSON: {}", preview)
        })?;

        self.archive_package(&package).await;
        Ok(package)
    }
}
