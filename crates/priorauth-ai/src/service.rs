use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("request timed out after {}s", .0.as_secs_f32())]
    Timeout(Duration),
    #[error("server returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("malformed service payload: {0}")]
    Malformed(String),
    #[error("embedding has {actual} dimensions, expected {expected}")]
    Dimension { expected: usize, actual: usize },
    #[error("backend error: {0}")]
    Backend(String),
}

impl ServiceError {
    /// Network, timeout and non-success failures that may succeed on a later run.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Http(_) | Self::Timeout(_) | Self::Status { .. })
    }
}

/// How the completion service should shape its output.
#[derive(Debug, Clone, PartialEq)]
pub enum OutputMode {
    Freeform,
    /// Any syntactically valid JSON.
    Json,
    /// JSON constrained to the given JSON schema.
    Schema(Value),
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub prompt: String,
    pub mode: OutputMode,
    pub timeout: Duration,
}

impl CompletionRequest {
    pub fn new(prompt: impl Into<String>, mode: OutputMode, timeout: Duration) -> Self {
        Self {
            prompt: prompt.into(),
            mode,
            timeout,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub text: String,
}

/// A text-generation backend.
#[async_trait]
pub trait CompletionService: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, ServiceError>;
}

/// A text-to-vector backend producing unit-normalized vectors.
///
/// `model_id` and `dim` identify the vector space: vectors from services that disagree on
/// either are not comparable.
#[async_trait]
pub trait EmbeddingService: Send + Sync {
    fn model_id(&self) -> &str;

    fn dim(&self) -> usize;

    async fn embed(&self, text: &str) -> Result<Vec<f32>, ServiceError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(ServiceError::Timeout(Duration::from_secs(60)).is_transient());
        assert!(
            ServiceError::Status {
                status: 503,
                body: String::new()
            }
            .is_transient()
        );
        assert!(!ServiceError::Malformed("no field".into()).is_transient());
        assert!(
            !ServiceError::Dimension {
                expected: 384,
                actual: 768
            }
            .is_transient()
        );
    }

    #[test]
    fn timeout_message_in_seconds() {
        let msg = ServiceError::Timeout(Duration::from_secs(120)).to_string();
        assert_eq!(msg, "request timed out after 120s");
    }
}
