//! reqwest-backed client for an OpenAI-compatible proxy.
//!
//! Every call carries a bounded timeout. Transient failures (timeouts,
//! connection errors, 429 and 5xx) are retried with exponential backoff;
//! everything else fails on the first attempt.

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::{ChatRequest, ChatResponse, LlmClient, LlmError, ToolCall};
use crate::config::{Config, RetryConfig};
use crate::text::truncate;

/// Longest error body kept in an [`LlmError::Status`].
const MAX_ERROR_BODY_CHARS: usize = 2_000;

#[derive(Debug, Clone)]
pub struct AiProxyClient {
    http: reqwest::Client,
    base_url: String,
    auth_header: String,
    retry: RetryConfig,
}

#[derive(Debug, Deserialize)]
struct CompletionEnvelope {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: AssistantMessage,
}

#[derive(Debug, Deserialize)]
struct AssistantMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ToolCall>>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingEnvelope {
    data: Vec<EmbeddingItem>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingItem {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
}

impl AiProxyClient {
    pub fn new(
        api_token: &str,
        base_url: &str,
        timeout: Duration,
        retry: RetryConfig,
    ) -> Result<Self, LlmError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LlmError::Client(e.to_string()))?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            auth_header: format!("Bearer {}", api_token.trim()),
            retry,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, LlmError> {
        Self::new(
            &config.api_token,
            &config.proxy_url,
            config.request_timeout,
            config.retry.clone(),
        )
    }

    async fn post_json<B, T>(&self, endpoint: &str, body: &B) -> Result<T, LlmError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = format!("{}/{}", self.base_url, endpoint);
        let mut retry = 0;

        loop {
            match self.post_once(&url, body).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && retry < self.retry.max_retries => {
                    let delay = self.retry.delay_for(retry);
                    tracing::warn!(
                        endpoint,
                        attempt = retry + 1,
                        delay_ms = delay.as_millis() as u64,
                        "Transient model service failure, retrying: {}",
                        e
                    );
                    tokio::time::sleep(delay).await;
                    retry += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn post_once<B, T>(&self, url: &str, body: &B) -> Result<T, LlmError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self
            .http
            .post(url)
            .header(reqwest::header::AUTHORIZATION, &self.auth_header)
            .json(body)
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        let text = response.text().await.map_err(map_transport_error)?;

        if !status.is_success() {
            return Err(LlmError::Status {
                status: status.as_u16(),
                body: truncate(&text, MAX_ERROR_BODY_CHARS),
            });
        }

        serde_json::from_str(&text).map_err(|e| LlmError::InvalidResponse(e.to_string()))
    }
}

#[async_trait]
impl LlmClient for AiProxyClient {
    async fn chat_completion(&self, request: &ChatRequest) -> Result<ChatResponse, LlmError> {
        tracing::debug!(model = %request.model, messages = request.messages.len(), "chat completion");

        let envelope: CompletionEnvelope = self.post_json("chat/completions", request).await?;
        let choice = envelope
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::InvalidResponse("response contained no choices".to_string()))?;

        Ok(ChatResponse {
            content: choice.message.content,
            tool_calls: choice.message.tool_calls,
        })
    }

    async fn embeddings(&self, model: &str, input: &[String]) -> Result<Vec<Vec<f32>>, LlmError> {
        let body = json!({ "model": model, "input": input });
        let envelope: EmbeddingEnvelope = self.post_json("embeddings", &body).await?;

        if envelope.data.len() != input.len() {
            return Err(LlmError::InvalidResponse(format!(
                "expected {} embeddings, got {}",
                input.len(),
                envelope.data.len()
            )));
        }

        let mut items = envelope.data;
        items.sort_by_key(|item| item.index);
        Ok(items.into_iter().map(|item| item.embedding).collect())
    }
}

fn map_transport_error(e: reqwest::Error) -> LlmError {
    if e.is_timeout() {
        LlmError::Timeout
    } else {
        LlmError::Transport(e.to_string())
    }
}
