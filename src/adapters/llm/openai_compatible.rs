//! Chat completions over an OpenAI-compatible HTTP API.
//!
//! Covers OpenAI itself, vLLM and Ollama's `/v1` endpoint. Every request asks
//! for a JSON object reply.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::domain::errors::BackendError;
use crate::domain::models::LlmConfig;
use crate::domain::ports::{Completion, CompletionRequest, LanguageModel};

/// Chat client for one model behind an OpenAI-compatible endpoint.
pub struct OpenAiCompatibleModel {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
}

impl OpenAiCompatibleModel {
    /// Client for `model` at `base_url`, which must include the API version
    /// (e.g. `http://localhost:11434/v1`).
    pub fn new(
        base_url: &str,
        model: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, BackendError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BackendError::Permanent(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            model: model.into(),
            api_key,
        })
    }

    /// Build from configuration, reading the key from `api_key_env` when set.
    /// Local servers accept requests without a key.
    pub fn from_config(config: &LlmConfig) -> Result<Self, BackendError> {
        let api_key = std::env::var(&config.api_key_env).ok().filter(|k| !k.is_empty());
        Self::new(
            &config.base_url,
            config.model.clone(),
            api_key,
            Duration::from_secs(config.timeout_secs),
        )
    }
}

#[async_trait]
impl LanguageModel for OpenAiCompatibleModel {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, BackendError> {
        let body = ChatRequest {
            model: &self.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: &request.system,
                },
                ChatMessage {
                    role: "user",
                    content: &request.user,
                },
            ],
            temperature: request.temperature,
            response_format: ResponseFormat { kind: "json_object" },
        };

        let mut http = self.client.post(&self.endpoint).json(&body);
        if let Some(key) = &self.api_key {
            http = http.bearer_auth(key);
        }

        let response = http.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unable to read response body".to_string());
            return Err(BackendError::from_status(status.as_u16(), body));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| BackendError::Malformed(format!("chat response: {e}")))?;

        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| BackendError::Malformed("chat response has no choices".to_string()))?;
        let content = choice.message.content.unwrap_or_default();
        if content.trim().is_empty() {
            return Err(BackendError::Malformed("chat response content is empty".to_string()));
        }

        debug!(task = %request.task, chars = content.len(), "chat completion received");
        Ok(Completion {
            content,
            model: parsed.model.unwrap_or_else(|| self.model.clone()),
        })
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    temperature: f32,
    response_format: ResponseFormat,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    model: Option<String>,
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}
