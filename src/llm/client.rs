//! AI client for summarization and embeddings

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Longest input shipped to the AI service, in bytes. Inputs past this
/// point would exceed model context limits.
const MAX_INPUT_BYTES: usize = 8_000;

const SUMMARY_SYSTEM_PROMPT: &str = "You are a helpful assistant that summarizes documents \
concisely, focusing on key points, main requirements, and important details.";

/// Configuration for the AI client
#[derive(Debug, Clone)]
pub struct AiConfig {
    /// API endpoint URL (OpenAI-compatible)
    pub endpoint: String,
    /// API key (optional)
    pub api_key: Option<String>,
    /// Model used for summaries
    pub completion_model: String,
    /// Model used for embeddings
    pub embedding_model: String,
    /// Temperature for summary generation
    pub temperature: f32,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:11434".to_string(),
            api_key: None,
            completion_model: "gpt-4o-mini".to_string(),
            embedding_model: "text-embedding-3-large".to_string(),
            temperature: 0.3,
        }
    }
}

/// Abstract AI collaborator used by the indexing orchestrator.
#[async_trait]
pub trait AiService: Send + Sync {
    /// Summarize document content in at most `max_tokens` tokens.
    async fn summarize(&self, content: &str, max_tokens: usize) -> Result<String>;

    /// Produce an embedding vector for the given text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// Client for OpenAI-compatible summarization and embedding APIs.
pub struct AiClient {
    config: AiConfig,
    client: reqwest::Client,
    max_retries: usize,
}

impl AiClient {
    /// Create a new AI client
    pub fn new(config: AiConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
            max_retries: 3,
        }
    }

    /// Override the retry budget for transient failures.
    pub fn with_max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }

    fn authorized(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.config.api_key {
            Some(key) => builder.header("Authorization", format!("Bearer {}", key)),
            None => builder,
        }
    }

    async fn post_with_retry<Req: Serialize, Resp: for<'de> Deserialize<'de>>(
        &self,
        url: &str,
        request: &Req,
    ) -> Result<Resp> {
        let mut last_error = None;

        for attempt in 0..self.max_retries {
            let result = self
                .authorized(self.client.post(url))
                .json(request)
                .send()
                .await;

            match result {
                Ok(response) if response.status().is_success() => {
                    return response.json().await.context("Failed to parse AI response");
                }
                Ok(response) => {
                    let status = response.status();
                    let body = response.text().await.unwrap_or_default();
                    tracing::warn!(
                        "AI request failed (attempt {}): {} - {}",
                        attempt + 1,
                        status,
                        body
                    );
                    last_error = Some(anyhow::anyhow!("AI request failed: {} - {}", status, body));
                    if !status.is_server_error() && status != reqwest::StatusCode::TOO_MANY_REQUESTS
                    {
                        break;
                    }
                }
                Err(e) => {
                    tracing::warn!("AI request failed (attempt {}): {}", attempt + 1, e);
                    last_error = Some(e.into());
                }
            }

            tokio::time::sleep(Duration::from_millis(500 * (attempt as u64 + 1))).await;
        }

        Err(last_error.unwrap_or_else(|| anyhow::anyhow!("AI request failed")))
    }
}

#[async_trait]
impl AiService for AiClient {
    async fn summarize(&self, content: &str, max_tokens: usize) -> Result<String> {
        let url = format!("{}/v1/chat/completions", self.config.endpoint);

        let request = ChatRequest {
            model: self.config.completion_model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: SUMMARY_SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: format!(
                        "Please summarize the following document content:\n\n{}",
                        truncate_input(content, MAX_INPUT_BYTES)
                    ),
                },
            ],
            max_tokens,
            temperature: self.config.temperature,
        };

        let response: ChatResponse = self.post_with_retry(&url, &request).await?;

        let summary = response
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content.trim().to_string())
            .unwrap_or_default();

        tracing::debug!("generated summary of {} characters", summary.len());
        Ok(summary)
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let url = format!("{}/v1/embeddings", self.config.endpoint);

        let request = EmbeddingRequest {
            model: self.config.embedding_model.clone(),
            input: truncate_input(text, MAX_INPUT_BYTES).to_string(),
        };

        let response: EmbeddingResponse = self.post_with_retry(&url, &request).await?;

        let embedding = response
            .data
            .into_iter()
            .next()
            .map(|item| item.embedding)
            .unwrap_or_default();

        if embedding.is_empty() {
            anyhow::bail!("empty embedding returned from API");
        }

        tracing::debug!("generated embedding with {} dimensions", embedding.len());
        Ok(embedding)
    }
}

/// Truncate to a byte budget without splitting a UTF-8 character.
fn truncate_input(text: &str, max_bytes: usize) -> &str {
    if text.len() <= max_bytes {
        return text;
    }
    let mut end = max_bytes;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

// OpenAI-compatible wire types

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    max_tokens: usize,
    temperature: f32,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest {
    model: String,
    input: String,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingItem>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingItem {
    embedding: Vec<f32>,
}

/// Mock AI service for testing
#[derive(Debug, Clone, Default)]
pub struct MockAiClient {
    pub summary: String,
    pub vector: Vec<f32>,
    pub fail: bool,
}

impl MockAiClient {
    /// A mock that answers every call successfully.
    pub fn new(summary: &str, vector: Vec<f32>) -> Self {
        Self {
            summary: summary.to_string(),
            vector,
            fail: false,
        }
    }

    /// A mock whose every call fails.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }
}

#[async_trait]
impl AiService for MockAiClient {
    async fn summarize(&self, _content: &str, _max_tokens: usize) -> Result<String> {
        if self.fail {
            anyhow::bail!("mock summarization failure");
        }
        Ok(self.summary.clone())
    }

    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        if self.fail {
            anyhow::bail!("mock embedding failure");
        }
        Ok(self.vector.clone())
    }
}
