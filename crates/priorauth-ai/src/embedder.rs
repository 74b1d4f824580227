//! ONNX Runtime embedding backend for sentence-transformers models.
//!
//! Implements mean-pooled embeddings using all-MiniLM-L6-v2 (384 dimensions).
//! The model directory must contain `model.onnx` and `tokenizer.json`.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use ort::session::Session;
use ort::value::Tensor;
use tokenizers::Tokenizer;
use tracing::info;

use crate::service::{EmbeddingService, ServiceError};
use crate::vector::normalize;

/// Sentence embedding generator using ONNX Runtime.
///
/// Produces `dim`-wide unit vectors suitable for inner-product search. Async callers get
/// inference on the blocking thread pool; the session is serialised behind a mutex.
pub struct Embedder {
    model: Arc<Model>,
    model_id: String,
    dim: usize,
}

struct Model {
    session: Mutex<Session>,
    tokenizer: Tokenizer,
    dim: usize,
}

impl Embedder {
    /// Load an embedding model from a directory containing `model.onnx` and `tokenizer.json`.
    ///
    /// The model id recorded in built indexes is the directory name.
    pub fn load(model_dir: &Path) -> anyhow::Result<Self> {
        let model_path = model_dir.join("model.onnx");
        let tokenizer_path = model_dir.join("tokenizer.json");

        anyhow::ensure!(model_path.exists(), "model.onnx not found in {model_dir:?}");
        anyhow::ensure!(
            tokenizer_path.exists(),
            "tokenizer.json not found in {model_dir:?}"
        );

        let session = Session::builder()?.commit_from_file(&model_path)?;

        // Infer embedding dimension from model output shape.
        let dim = infer_dim(session.outputs()[0].dtype()).unwrap_or(384);

        let mut tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| anyhow::anyhow!("load tokenizer: {e}"))?;

        // MiniLM was trained on sequences up to 256 tokens.
        tokenizer
            .with_truncation(Some(tokenizers::TruncationParams {
                max_length: 256,
                ..Default::default()
            }))
            .map_err(|e| anyhow::anyhow!("set truncation: {e}"))?;

        let model_id = model_dir
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("onnx")
            .to_string();

        info!(dim, model = %model_id, path = %model_path.display(), "loaded embedding model");
        Ok(Self {
            model: Arc::new(Model {
                session: Mutex::new(session),
                tokenizer,
                dim,
            }),
            model_id,
            dim,
        })
    }

    /// Embed a single text string on the current thread, returning a normalized vector.
    pub fn embed_text(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        self.model.embed(text)
    }
}

impl Model {
    fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        let encoding = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| anyhow::anyhow!("tokenize: {e}"))?;

        let seq_len = encoding.get_ids().len();
        let to_i64 = |xs: &[u32]| xs.iter().map(|&x| x as i64).collect::<Vec<i64>>();
        let input_ids = to_i64(encoding.get_ids());
        let attention_mask = to_i64(encoding.get_attention_mask());
        let token_type_ids = to_i64(encoding.get_type_ids());

        let shape = [1i64, seq_len as i64];
        let ids_tensor = Tensor::from_array((shape, input_ids.into_boxed_slice()))?;
        let mask_tensor = Tensor::from_array((shape, attention_mask.clone().into_boxed_slice()))?;
        let type_tensor = Tensor::from_array((shape, token_type_ids.into_boxed_slice()))?;

        let mut session = self
            .session
            .lock()
            .map_err(|e| anyhow::anyhow!("session lock poisoned: {e}"))?;
        let outputs = session.run(ort::inputs![
            "input_ids" => ids_tensor,
            "attention_mask" => mask_tensor,
            "token_type_ids" => type_tensor,
        ])?;

        // Token embeddings: [1, seq_len, dim].
        let (output_shape, output_data) = outputs[0].try_extract_tensor::<f32>()?;
        let dims: &[i64] = output_shape;
        anyhow::ensure!(
            dims.len() == 3 && dims[0] == 1 && dims[2] as usize == self.dim,
            "unexpected output shape: {dims:?}, expected [1, {seq_len}, {}]",
            self.dim
        );

        // Mean pooling over attended tokens.
        let mut pooled = vec![0.0f32; self.dim];
        let mut token_count = 0.0f32;
        for (j, &mask) in attention_mask.iter().enumerate().take(dims[1] as usize) {
            if mask > 0 {
                let offset = j * self.dim;
                for (d, p) in pooled.iter_mut().enumerate() {
                    *p += output_data[offset + d];
                }
                token_count += 1.0;
            }
        }
        if token_count > 0.0 {
            for p in &mut pooled {
                *p /= token_count;
            }
        }
        normalize(&mut pooled);
        Ok(pooled)
    }
}

#[async_trait]
impl EmbeddingService for Embedder {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn dim(&self) -> usize {
        self.dim
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, ServiceError> {
        let model = Arc::clone(&self.model);
        let text = text.to_string();
        tokio::task::spawn_blocking(move || model.embed(&text))
            .await
            .map_err(|e| ServiceError::Backend(format!("embedding task: {e}")))?
            .map_err(|e| ServiceError::Backend(e.to_string()))
    }
}

/// Try to infer the embedding dimension from the ONNX model output type.
fn infer_dim(output_type: &ort::value::ValueType) -> Option<usize> {
    match output_type {
        ort::value::ValueType::Tensor { shape, .. } => {
            // Last dimension is the embedding dim.
            shape
                .last()
                .and_then(|&d| if d > 0 { Some(d as usize) } else { None })
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector::inner_product;
    use std::path::PathBuf;

    fn model_dir() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR"))
            .join("..")
            .join("..")
            .join("models")
            .join("all-MiniLM-L6-v2")
    }

    fn require_model() -> PathBuf {
        let dir = model_dir();
        if !dir.join("model.onnx").exists() {
            panic!(
                "Model not found. Download from HuggingFace:\n  \
                 curl -L -o models/all-MiniLM-L6-v2/model.onnx \
                 https://huggingface.co/sentence-transformers/all-MiniLM-L6-v2/resolve/main/onnx/model.onnx"
            );
        }
        dir
    }

    #[test]
    #[ignore = "requires models/all-MiniLM-L6-v2"]
    fn load_model() {
        let embedder = Embedder::load(&require_model()).unwrap();
        assert_eq!(embedder.dim(), 384);
        assert_eq!(embedder.model_id(), "all-MiniLM-L6-v2");
    }

    #[tokio::test]
    #[ignore = "requires models/all-MiniLM-L6-v2"]
    async fn embed_is_unit_and_deterministic() {
        let embedder = Embedder::load(&require_model()).unwrap();
        let a = embedder.embed("Lumbar disc herniation with radiculopathy").await.unwrap();
        let b = embedder.embed("Lumbar disc herniation with radiculopathy").await.unwrap();
        assert_eq!(a.len(), 384);
        assert_eq!(a, b);
        let norm: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4, "expected unit norm, got {norm}");
    }

    #[tokio::test(flavor = "current_thread")]
    #[ignore = "requires models/all-MiniLM-L6-v2"]
    async fn async_embed_matches_blocking_embed() {
        let embedder = Embedder::load(&require_model()).unwrap();
        let text = "Torn meniscus, knee arthroscopy";
        let sync = embedder.embed_text(text).unwrap();
        let (a, b) = tokio::join!(embedder.embed(text), embedder.embed(text));
        assert_eq!(a.unwrap(), sync);
        assert_eq!(b.unwrap(), sync);
    }

    #[tokio::test]
    #[ignore = "requires models/all-MiniLM-L6-v2"]
    async fn similar_texts_closer() {
        let embedder = Embedder::load(&require_model()).unwrap();
        let back = embedder.embed("lower back pain surgery").await.unwrap();
        let lumbar = embedder.embed("Diagnosis: lumbar spinal stenosis Procedure: laminectomy").await.unwrap();
        let knee = embedder.embed("Diagnosis: torn meniscus Procedure: knee arthroscopy").await.unwrap();
        let sim_lumbar = inner_product(&back, &lumbar);
        let sim_knee = inner_product(&back, &knee);
        assert!(
            sim_lumbar > sim_knee,
            "back<->lumbar ({sim_lumbar:.4}) should beat back<->knee ({sim_knee:.4})"
        );
    }
}
