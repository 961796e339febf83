use async_trait::async_trait;
use backoff::{future::retry, ExponentialBackoff};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum GenerationError {
    #[error("Connection error: {0}")]
    Connection(String),
    #[error("API error ({status}): {body}")]
    Api { status: u16, body: String },
    #[error("Failed to parse response: {0}")]
    Parse(String),
    #[error("No text content in completion")]
    EmptyCompletion,
}

/// Anything that can turn a conversation into a single assistant reply.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn complete(&self, messages: Vec<ChatCompletionMessage>) -> Result<String, GenerationError>;
}

#[derive(Debug, Clone)]
pub struct OpenAiClient {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatCompletionMessage {
    pub role: String,
    pub content: String,
}

impl ChatCompletionMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: "system".to_string(), content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: "user".to_string(), content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: "assistant".to_string(), content: content.into() }
    }
}

#[derive(Debug, Serialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<ChatCompletionMessage>,
    pub temperature: f32,
    pub max_tokens: u32,
}

#[derive(Debug, Deserialize)]
pub struct ChatCompletionResponse {
    pub id: Option<String>,
    pub model: Option<String>,
    pub choices: Vec<Choice>,
    pub usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
pub struct Choice {
    pub message: ResponseMessage,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ResponseMessage {
    pub role: String,
    pub content: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl ChatCompletionResponse {
    /// Trimmed text of the first choice, if any.
    pub fn first_text(&self) -> Option<String> {
        self.choices
            .first()
            .and_then(|choice| choice.message.content.as_deref())
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty())
    }
}

fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503)
}

impl OpenAiClient {
    pub fn new(api_key: String, base_url: String, model: String) -> Self {
        Self {
            client: Client::new(),
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
            temperature: 0.8,
            max_tokens: 2000,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub async fn create_chat_completion(
        &self,
        messages: Vec<ChatCompletionMessage>,
    ) -> Result<ChatCompletionResponse, GenerationError> {
        let request = ChatCompletionRequest {
            model: self.model.clone(),
            messages,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        tracing::debug!("OpenAI request: model={}, messages={}", request.model, request.messages.len());

        let backoff_config = ExponentialBackoff {
            initial_interval: Duration::from_secs(1),
            max_interval: Duration::from_secs(20),
            multiplier: 2.0,
            max_elapsed_time: Some(Duration::from_secs(90)),
            ..Default::default()
        };

        // Connection failures, timeouts, 429 and 5xx are retried
        let operation = || async {
            let response = self
                .client
                .post(format!("{}/chat/completions", self.base_url))
                .bearer_auth(&self.api_key)
                .timeout(Duration::from_secs(120))
                .json(&request)
                .send()
                .await
                .map_err(|e| {
                    if e.is_connect() || e.is_timeout() {
                        tracing::warn!("OpenAI connection error (retrying): {}", e);
                        backoff::Error::transient(GenerationError::Connection(e.to_string()))
                    } else {
                        tracing::error!("OpenAI request error: {}", e);
                        backoff::Error::permanent(GenerationError::Connection(e.to_string()))
                    }
                })?;

            let status = response.status().as_u16();
            let body = response
                .text()
                .await
                .map_err(|e| backoff::Error::permanent(GenerationError::Connection(e.to_string())))?;

            if is_retryable_status(status) {
                tracing::warn!("OpenAI returned {} (retrying)", status);
                return Err(backoff::Error::transient(GenerationError::Api { status, body }));
            }

            if !(200..300).contains(&status) {
                tracing::error!("OpenAI permanent error ({}): {}", status, body);
                return Err(backoff::Error::permanent(GenerationError::Api { status, body }));
            }

            serde_json::from_str::<ChatCompletionResponse>(&body)
                .map_err(|e| backoff::Error::permanent(GenerationError::Parse(e.to_string())))
        };

        let response = retry(backoff_config, operation).await?;

        if let Some(usage) = &response.usage {
            tracing::info!(
                "OpenAI usage: {} prompt + {} completion = {} tokens",
                usage.prompt_tokens,
                usage.completion_tokens,
                usage.total_tokens
            );
        }

        Ok(response)
    }
}

#[async_trait]
impl TextGenerator for OpenAiClient {
    async fn complete(&self, messages: Vec<ChatCompletionMessage>) -> Result<String, GenerationError> {
        let response = self.create_chat_completion(messages).await?;
        response.first_text().ok_or(GenerationError::EmptyCompletion)
    }
}
