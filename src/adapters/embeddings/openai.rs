//! OpenAI-compatible embedding provider.
//!
//! Calls `{base_url}/embeddings`. Works against OpenAI itself and local
//! servers exposing the same endpoint.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::domain::errors::BackendError;
use crate::domain::ports::EmbeddingProvider;

/// Settings for [`OpenAiEmbeddingProvider`].
#[derive(Debug, Clone)]
pub struct OpenAiEmbeddingConfig {
    /// API root including the version, e.g. `https://api.openai.com/v1`.
    pub base_url: String,
    /// Encoder model name.
    pub model: String,
    /// Vector length the model produces.
    pub dimension: usize,
    /// Bearer token; omitted from requests when `None`.
    pub api_key: Option<String>,
    /// Per-request timeout.
    pub timeout_secs: u64,
    /// Maximum texts per request.
    pub max_batch_size: usize,
}

impl Default for OpenAiEmbeddingConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            model: "text-embedding-3-small".to_string(),
            dimension: 1536,
            api_key: None,
            timeout_secs: 30,
            max_batch_size: 256,
        }
    }
}

/// Embedding client for an OpenAI-compatible `/embeddings` endpoint.
pub struct OpenAiEmbeddingProvider {
    config: OpenAiEmbeddingConfig,
    client: reqwest::Client,
}

impl OpenAiEmbeddingProvider {
    /// Provider with its own HTTP client.
    pub fn new(config: OpenAiEmbeddingConfig) -> Result<Self, BackendError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| BackendError::Permanent(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { config, client })
    }

    async fn request(&self, input: Vec<String>) -> Result<Vec<Vec<f32>>, BackendError> {
        let expected = input.len();
        let url = format!("{}/embeddings", self.config.base_url.trim_end_matches('/'));
        let body = EmbeddingsRequest {
            model: &self.config.model,
            input,
        };

        let mut request = self.client.post(&url).json(&body);
        if let Some(key) = &self.config.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unable to read response body".to_string());
            return Err(BackendError::from_status(status.as_u16(), body));
        }

        let parsed: EmbeddingsResponse = response
            .json()
            .await
            .map_err(|e| BackendError::Malformed(format!("embedding response: {e}")))?;

        let mut data = parsed.data;
        if data.len() != expected {
            return Err(BackendError::Malformed(format!(
                "expected {expected} embeddings, got {}",
                data.len()
            )));
        }
        data.sort_by_key(|d| d.index);
        Ok(data.into_iter().map(|d| d.embedding).collect())
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbeddingProvider {
    fn name(&self) -> &'static str {
        "openai"
    }

    fn dimension(&self) -> usize {
        self.config.dimension
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, BackendError> {
        self.request(vec![text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| BackendError::Malformed("empty embedding response".to_string()))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, BackendError> {
        let mut vectors = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(self.config.max_batch_size.max(1)) {
            vectors.extend(self.request(chunk.to_vec()).await?);
        }
        Ok(vectors)
    }
}

#[derive(Debug, Serialize)]
struct EmbeddingsRequest<'a> {
    model: &'a str,
    input: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}
