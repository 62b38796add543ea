//! HTTP retrieval of venue websites.

use reqwest::Client;
use tracing::{debug, instrument};

use expofinder_shared::{ExpoFinderError, FetchConfig, Result};

use crate::sanitize::sanitize_html;

/// Fetches venue pages and reduces them to sanitized content.
///
/// One GET per call, no retries. Any transport error or non-2xx status
/// becomes [`ExpoFinderError::Fetch`].
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: Client,
    max_content_chars: usize,
}

impl Fetcher {
    /// Create a fetcher with the configured user agent and timeout.
    pub fn new(config: &FetchConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(config.user_agent.as_str())
            .redirect(reqwest::redirect::Policy::limited(5))
            .timeout(config.timeout())
            .build()
            .map_err(|e| ExpoFinderError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            max_content_chars: config.max_content_chars,
        })
    }

    /// Download `url` and return its sanitized main-content markup.
    #[instrument(skip_all, fields(url = %url))]
    pub async fn fetch_clean_content(&self, url: &str) -> Result<String> {
        let html = self.fetch_html(url).await?;
        let content = sanitize_html(&html, self.max_content_chars);
        debug!(
            raw_len = html.len(),
            content_chars = content.chars().count(),
            "page sanitized"
        );
        Ok(content)
    }

    /// Download `url` and return the raw response body.
    pub async fn fetch_html(&self, url: &str) -> Result<String> {
        debug!(url, "fetching page");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ExpoFinderError::fetch(url, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ExpoFinderError::fetch(url, format!("HTTP {status}")));
        }

        response
            .text()
            .await
            .map_err(|e| ExpoFinderError::fetch(url, format!("body read failed: {e}")))
    }
}
