//! Ollama HTTP backend for completions (`/api/generate`) and embeddings (`/api/embed`).

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::service::{
    Completion, CompletionRequest, CompletionService, EmbeddingService, OutputMode, ServiceError,
};
use crate::vector;

/// Completion client for an Ollama server.
pub struct OllamaClient {
    client: reqwest::Client,
    base_url: String,
    model: String,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<Value>,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

impl OllamaClient {
    /// Create a client for the given base URL (e.g. `http://localhost:11434`) and model.
    pub fn new(base_url: &str, model: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.into(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl CompletionService for OllamaClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, ServiceError> {
        let url = format!("{}/api/generate", self.base_url);
        let format = match &request.mode {
            OutputMode::Freeform => None,
            OutputMode::Json => Some(Value::String("json".into())),
            OutputMode::Schema(schema) => Some(schema.clone()),
        };
        let body = GenerateRequest {
            model: &self.model,
            prompt: &request.prompt,
            stream: false,
            format,
        };

        debug!(url = %url, model = %self.model, prompt_chars = request.prompt.len(), "requesting completion");
        let text = post_json(&self.client, &url, &body, request.timeout).await?;
        let parsed: GenerateResponse = serde_json::from_str(&text)
            .map_err(|e| ServiceError::Malformed(format!("generate response: {e}")))?;
        Ok(Completion {
            text: parsed.response,
        })
    }
}

/// Embedding client for an Ollama server.
///
/// Returned vectors are checked against `dim` and L2-normalized before use.
pub struct OllamaEmbedder {
    client: reqwest::Client,
    base_url: String,
    model: String,
    dim: usize,
    timeout: Duration,
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

impl OllamaEmbedder {
    pub fn new(base_url: &str, model: impl Into<String>, dim: usize, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.into(),
            dim,
            timeout,
        }
    }
}

#[async_trait]
impl EmbeddingService for OllamaEmbedder {
    fn model_id(&self) -> &str {
        &self.model
    }

    fn dim(&self) -> usize {
        self.dim
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, ServiceError> {
        let url = format!("{}/api/embed", self.base_url);
        let body = EmbedRequest {
            model: &self.model,
            input: text,
        };

        let raw = post_json(&self.client, &url, &body, self.timeout).await?;
        let parsed: EmbedResponse = serde_json::from_str(&raw)
            .map_err(|e| ServiceError::Malformed(format!("embed response: {e}")))?;
        let mut embedding = parsed
            .embeddings
            .into_iter()
            .next()
            .ok_or_else(|| ServiceError::Malformed("embed response has no vectors".into()))?;

        if embedding.len() != self.dim {
            return Err(ServiceError::Dimension {
                expected: self.dim,
                actual: embedding.len(),
            });
        }
        vector::normalize(&mut embedding);
        Ok(embedding)
    }
}

/// POST a JSON body and return the response text of a successful reply.
async fn post_json<B: Serialize>(
    client: &reqwest::Client,
    url: &str,
    body: &B,
    timeout: Duration,
) -> Result<String, ServiceError> {
    let classify = |e: reqwest::Error| {
        if e.is_timeout() {
            ServiceError::Timeout(timeout)
        } else {
            ServiceError::Http(e)
        }
    };

    let resp = client
        .post(url)
        .timeout(timeout)
        .json(body)
        .send()
        .await
        .map_err(classify)?;

    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(ServiceError::Status {
            status: status.as_u16(),
            body,
        });
    }

    resp.text().await.map_err(classify)
}
