use std::path::Path;

use priorauth_ai::EmbeddingService;
use priorauth_ai::vector::{is_unit, normalize};
use priorauth_store::{IndexSnapshot, StoreError};
use serde::Serialize;
use tracing::debug;

use crate::RetrievalError;
use crate::indexer::UNIT_TOLERANCE;

/// A precedent case returned by search.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimilarCase {
    pub case_id: String,
    pub diagnosis: Option<String>,
    pub procedure: Option<String>,
    pub specialty: Option<String>,
    /// Inner product of unit vectors, in [-1, 1].
    pub similarity: f32,
}

/// Nearest-precedent search over a loaded index snapshot.
pub struct Retriever<'a> {
    snapshot: IndexSnapshot,
    embedder: &'a dyn EmbeddingService,
}

impl<'a> Retriever<'a> {
    /// Load the published snapshot under `dir` for querying with `embedder`.
    pub fn open(dir: &Path, embedder: &'a dyn EmbeddingService) -> Result<Self, RetrievalError> {
        Self::new(IndexSnapshot::load(dir)?, embedder)
    }

    /// Refuses a snapshot built in a different vector space than `embedder` produces.
    pub fn new(
        snapshot: IndexSnapshot,
        embedder: &'a dyn EmbeddingService,
    ) -> Result<Self, RetrievalError> {
        let index = snapshot.index();
        if index.model_id() != embedder.model_id() {
            return Err(StoreError::ModelMismatch {
                indexed: index.model_id().to_string(),
                active: embedder.model_id().to_string(),
            }
            .into());
        }
        if index.dim() != embedder.dim() {
            return Err(StoreError::DimensionMismatch {
                expected: index.dim(),
                actual: embedder.dim(),
            }
            .into());
        }
        Ok(Self { snapshot, embedder })
    }

    pub fn len(&self) -> usize {
        self.snapshot.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot.is_empty()
    }

    /// The `k` cases most similar to `text`, best first. Equal scores keep index order.
    pub async fn search(&self, text: &str, k: usize) -> Result<Vec<SimilarCase>, RetrievalError> {
        if k == 0 {
            return Ok(Vec::new());
        }
        let mut query = self.embedder.embed(text).await?;
        normalize(&mut query);
        if !is_unit(&query, UNIT_TOLERANCE) {
            return Err(RetrievalError::ZeroQuery);
        }

        let hits = self.snapshot.index().search(&query, k)?;
        let metadata = self.snapshot.metadata();
        let results: Vec<SimilarCase> = hits
            .into_iter()
            .filter_map(|hit| {
                metadata.get(hit.position).map(|m| SimilarCase {
                    case_id: m.case_id.clone(),
                    diagnosis: m.diagnosis.clone(),
                    procedure: m.procedure.clone(),
                    specialty: m.specialty.clone(),
                    similarity: hit.score,
                })
            })
            .collect();
        debug!(k, returned = results.len(), "search complete");
        Ok(results)
    }
}
