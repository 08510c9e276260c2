use async_trait::async_trait;
use reqwest::header::USER_AGENT;
use reqwest::Client;
use scraper::{Html, Node};
use serde::Deserialize;
use std::time::Duration;

use crate::Result;

const SERPER_ENDPOINT: &str = "https://google.serper.dev/search";

/// Elements whose text never reaches the reader
const HIDDEN_ELEMENTS: &[&str] = &["script", "style", "noscript", "template"];

/// Looks up background material for a topic before content is drafted
#[async_trait]
pub trait ContextResearcher: Send + Sync {
    /// Plain-text context for `topic`, or `None` when nothing usable was found
    async fn research(&self, topic: &str) -> Option<String>;
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    organic: Vec<OrganicResult>,
}

#[derive(Debug, Deserialize)]
struct OrganicResult {
    link: String,
}

/// Serper web search: reads the top organic result and keeps its visible text
pub struct SerperResearcher {
    client: Client,
    api_key: String,
    endpoint: String,
    timeout: Duration,
}

impl SerperResearcher {
    pub fn new(api_key: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            endpoint: SERPER_ENDPOINT.to_string(),
            timeout,
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    async fn top_link(&self, topic: &str) -> Result<Option<String>> {
        let response = self
            .client
            .post(&self.endpoint)
            .header("X-API-KEY", &self.api_key)
            .json(&serde_json::json!({ "q": topic }))
            .timeout(self.timeout)
            .send()
            .await?
            .error_for_status()?;

        let results: SearchResponse = response.json().await?;
        Ok(results.organic.into_iter().next().map(|r| r.link))
    }

    async fn page_text(&self, url: &str) -> Result<String> {
        let html = self
            .client
            .get(url)
            .header(USER_AGENT, "Mozilla/5.0")
            .timeout(self.timeout)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        Ok(extract_visible_text(&html))
    }
}

#[async_trait]
impl ContextResearcher for SerperResearcher {
    async fn research(&self, topic: &str) -> Option<String> {
        tracing::info!("Researching '{}'", topic);

        let link = match self.top_link(topic).await {
            Ok(Some(link)) => link,
            Ok(None) => {
                tracing::warn!("Search returned no organic results");
                return None;
            }
            Err(e) => {
                tracing::warn!("Search request failed: {:#}", e);
                return None;
            }
        };

        tracing::debug!("Reading {}", link);
        match self.page_text(&link).await {
            Ok(text) if !text.is_empty() => {
                tracing::info!("Extracted {} characters of context", text.chars().count());
                Some(text)
            }
            Ok(_) => {
                tracing::warn!("No readable text at {}", link);
                None
            }
            Err(e) => {
                tracing::warn!("Could not read {}: {:#}", link, e);
                None
            }
        }
    }
}

/// Visible text of an HTML document: script and style content removed, each
/// non-empty line trimmed, lines joined with newlines
pub fn extract_visible_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let mut lines = Vec::new();

    for node in document.root_element().descendants() {
        let Node::Text(text) = node.value() else {
            continue;
        };
        let hidden = node.ancestors().any(|ancestor| match ancestor.value() {
            Node::Element(element) => HIDDEN_ELEMENTS.contains(&element.name()),
            _ => false,
        });
        if hidden {
            continue;
        }
        lines.extend(
            text.lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(str::to_string),
        );
    }

    lines.join("\n")
}
