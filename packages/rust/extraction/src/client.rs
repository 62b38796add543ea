//! OpenAI-compatible chat-completion client for exhibition extraction.

use std::time::Instant;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use expofinder_shared::{ExhibitionRecord, ExpoFinderError, LlmConfig, Result};

use crate::parse::parse_exhibitions;
use crate::prompt::{SYSTEM_PROMPT, build_prompt};

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Turns sanitized page content into exhibition records via one model call.
#[derive(Debug, Clone)]
pub struct ExtractionClient {
    http: Client,
    api_key: String,
    endpoint: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

impl ExtractionClient {
    /// Build a client with an explicit key and base URL.
    pub fn new(api_key: impl Into<String>, base_url: &str, config: &LlmConfig) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(ExpoFinderError::credential_missing("LLM", &config.api_key_env));
        }

        let http = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| ExpoFinderError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            api_key,
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        })
    }

    /// Build a client from config, reading the key and base URL override
    /// from the environment. Fails with `CredentialMissing` if no key is set.
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let api_key = config.api_key()?;
        Self::new(api_key, &config.resolved_base_url(), config)
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Extract exhibitions from `content`, which was fetched from `source_url`.
    ///
    /// Transport errors, non-2xx replies, and unparseable output all come
    /// back as [`ExpoFinderError::Extraction`].
    #[instrument(skip_all, fields(source_url = %source_url, model = %self.model))]
    pub async fn extract_exhibitions(
        &self,
        content: &str,
        source_url: &str,
    ) -> Result<Vec<ExhibitionRecord>> {
        let reply = self.complete(&build_prompt(content, source_url)).await?;
        let records = parse_exhibitions(&reply)?;
        debug!(records = records.len(), "exhibitions extracted");
        Ok(records)
    }

    async fn complete(&self, prompt: &str) -> Result<String> {
        let start = Instant::now();
        let request = ChatRequest {
            model: &self.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                warn!(error = %e, "chat completion request failed");
                ExpoFinderError::Extraction(format!("request failed: {e}"))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let body: String = body.chars().take(300).collect();
            return Err(ExpoFinderError::Extraction(format!(
                "model API returned HTTP {status}: {body}"
            )));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| ExpoFinderError::Extraction(format!("invalid API response: {e}")))?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| ExpoFinderError::Extraction("model returned no message".into()))?;

        debug!(
            duration_ms = start.elapsed().as_millis() as u64,
            reply_chars = content.chars().count(),
            "chat completion finished"
        );
        Ok(content)
    }
}
