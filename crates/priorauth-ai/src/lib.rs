//! AI service layer: completion and embedding backends behind async traits.
//!
//! Backends: Ollama over HTTP for both completion and embedding, and ONNX Runtime for
//! local sentence embeddings (feature `onnx`).

mod ollama;
mod service;
pub mod vector;

pub use ollama::{OllamaClient, OllamaEmbedder};
pub use service::{
    Completion, CompletionRequest, CompletionService, EmbeddingService, OutputMode, ServiceError,
};

#[cfg(feature = "onnx")]
mod embedder;
#[cfg(feature = "onnx")]
pub use embedder::Embedder;
