use async_trait::async_trait;
use futures_util::StreamExt;
use regex::Regex;
use reqwest::header::USER_AGENT;
use reqwest::Client;
use std::time::Duration;
use url::Url;

use super::{AspectRatio, ImageProvider, SourceKind};
use crate::cancel::CancellationToken;
use crate::producer::Stage;
use crate::Result;

const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

/// Raster formats we accept from search results
const ALLOWED_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

const MAX_IMAGE_BYTES: usize = 20 * 1024 * 1024;

/// Keyword image search provider: first fetchable, decodable raster result wins
pub struct WebImageSearch {
    client: Client,
    search_endpoint: String,
    search_timeout: Duration,
    fetch_timeout: Duration,
    source_pattern: Regex,
}

impl WebImageSearch {
    pub fn new(search_timeout: Duration, fetch_timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: Client::new(),
            search_endpoint: "https://www.google.com/search".to_string(),
            search_timeout,
            fetch_timeout,
            source_pattern: Regex::new(r#"src="(https://[^"]+)""#)?,
        })
    }

    pub fn with_search_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.search_endpoint = endpoint.into();
        self
    }

    /// Pull candidate image URLs out of a results page, in page order
    pub fn candidate_urls(&self, html: &str) -> Vec<String> {
        self.source_pattern
            .captures_iter(html)
            .filter_map(|caps| caps.get(1))
            .map(|m| m.as_str().replace("&amp;", "&"))
            .filter(|url| is_allowed_image_url(url))
            .collect()
    }

    async fn search_page(&self, query: &str) -> Result<String> {
        let url = format!(
            "{}?q={}&tbm=isch",
            self.search_endpoint,
            urlencoding::encode(query)
        );
        let response = self
            .client
            .get(&url)
            .header(USER_AGENT, BROWSER_USER_AGENT)
            .timeout(self.search_timeout)
            .send()
            .await?;

        if !response.status().is_success() {
            anyhow::bail!("Image search failed: HTTP {}", response.status());
        }
        Ok(response.text().await?)
    }

    async fn download_decodable(&self, url: &str) -> Result<Vec<u8>> {
        let response = self
            .client
            .get(url)
            .header(USER_AGENT, BROWSER_USER_AGENT)
            .timeout(self.fetch_timeout)
            .send()
            .await?;

        if response.status() != reqwest::StatusCode::OK {
            anyhow::bail!("HTTP {}", response.status());
        }
        let mut bytes = Vec::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            bytes.extend_from_slice(&chunk?);
            if bytes.len() > MAX_IMAGE_BYTES {
                anyhow::bail!("Image larger than {} bytes", MAX_IMAGE_BYTES);
            }
        }
        image::load_from_memory(&bytes)?;
        Ok(bytes)
    }

    /// Try candidates in order; a stop request ends the loop before the next download
    async fn first_decodable(
        &self,
        candidates: &[String],
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>> {
        for candidate in candidates {
            cancel.checkpoint(Stage::ResolveImages)?;
            match self.download_decodable(candidate).await {
                Ok(bytes) => return Ok(bytes),
                Err(e) => tracing::debug!("Candidate {} rejected: {:#}", candidate, e),
            }
        }

        anyhow::bail!("No usable image found among {} result(s)", candidates.len())
    }
}

/// True when the URL's path ends with an allowed raster extension
pub fn is_allowed_image_url(candidate: &str) -> bool {
    let Ok(parsed) = Url::parse(candidate) else {
        return false;
    };
    if parsed.scheme() != "https" {
        return false;
    }
    let path = parsed.path().to_lowercase();
    ALLOWED_EXTENSIONS
        .iter()
        .any(|ext| path.ends_with(&format!(".{}", ext)))
}

#[async_trait]
impl ImageProvider for WebImageSearch {
    fn source_kind(&self) -> SourceKind {
        SourceKind::WebSearched
    }

    async fn fetch_image(
        &self,
        prompt: &str,
        _aspect_ratio: AspectRatio,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>> {
        let page = self.search_page(prompt).await?;
        let candidates = self.candidate_urls(&page);
        tracing::debug!("{} candidate image(s) for '{}'", candidates.len(), prompt);

        self.first_decodable(&candidates, cancel).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allowlist_checks_path_extension() {
        assert!(is_allowed_image_url("https://cdn.example.com/a/cat.JPG"));
        assert!(is_allowed_image_url("https://cdn.example.com/cat.png?w=200"));
        assert!(!is_allowed_image_url("https://cdn.example.com/cat.gif"));
        assert!(!is_allowed_image_url("https://cdn.example.com/thumb?id=cat.png"));
        assert!(!is_allowed_image_url("http://cdn.example.com/cat.png"));
        assert!(!is_allowed_image_url("not a url.png"));
    }

    #[test]
    fn test_candidate_urls_in_page_order() {
        let search = WebImageSearch::new(Duration::from_secs(1), Duration::from_secs(1)).unwrap();
        let html = r#"
            <img src="https://example.com/logo.svg">
            <img src="https://images.example.com/first.jpeg">
            <img src="http://insecure.example.com/skip.png">
            <img src="https://images.example.com/second.png?a=1&amp;b=2">
        "#;
        assert_eq!(
            search.candidate_urls(html),
            [
                "https://images.example.com/first.jpeg",
                "https://images.example.com/second.png?a=1&b=2",
            ]
        );
    }

    #[tokio::test]
    async fn test_stop_skips_remaining_candidates() {
        let search = WebImageSearch::new(Duration::from_secs(1), Duration::from_secs(1)).unwrap();
        let cancel = CancellationToken::new();
        cancel.trigger();

        let candidates = vec![
            "https://127.0.0.1:9/first.png".to_string(),
            "https://127.0.0.1:9/second.png".to_string(),
        ];
        let err = search.first_decodable(&candidates, &cancel).await.unwrap_err();

        assert!(matches!(
            err.downcast_ref::<crate::ForgeError>(),
            Some(crate::ForgeError::Cancelled(Stage::ResolveImages))
        ));
    }
}
