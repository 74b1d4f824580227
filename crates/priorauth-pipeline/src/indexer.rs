//! Full rebuild of the vector index from the persisted cases.

use std::path::{Path, PathBuf};

use priorauth_ai::vector::{is_unit, normalize};
use priorauth_ai::{EmbeddingService, ServiceError};
use priorauth_core::{EmbeddingRecord, MIN_CANONICAL_LEN, canonical_text};
use priorauth_store::{CaseStore, FlatIndex, IndexSnapshot, StoredCase};
use tracing::{debug, info, warn};

use crate::IndexError;

/// Allowed deviation from unit length after normalisation.
pub(crate) const UNIT_TOLERANCE: f32 = 1e-3;

/// Counts for one index build.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexOutcome {
    pub indexed: usize,
    /// Cases whose canonical text was too short to embed.
    pub too_short: usize,
    pub failed: usize,
}

pub struct Indexer<'a> {
    embedder: &'a dyn EmbeddingService,
}

impl<'a> Indexer<'a> {
    pub fn new(embedder: &'a dyn EmbeddingService) -> Self {
        Self { embedder }
    }

    /// Embed every case with a usable canonical text, in the order given.
    ///
    /// Vector `i` of the returned snapshot belongs to `metadata()[i]`.
    pub async fn build(
        &self,
        cases: &[StoredCase],
    ) -> Result<(IndexSnapshot, IndexOutcome), IndexError> {
        let dim = self.embedder.dim();
        let mut index = FlatIndex::new(dim, self.embedder.model_id());
        let mut metadata = Vec::new();
        let mut outcome = IndexOutcome::default();

        info!(cases = cases.len(), model = %self.embedder.model_id(), dim, "building index");
        for stored in cases {
            let case = &stored.case;
            let text = canonical_text(case);
            if text.chars().count() < MIN_CANONICAL_LEN {
                debug!(case_id = %case.case_id, chars = text.chars().count(), "canonical text too short, skipped");
                outcome.too_short += 1;
                continue;
            }

            let mut vector = match self.embed(&text).await {
                Ok(v) => v,
                Err(e) => {
                    warn!(case_id = %case.case_id, error = %e, "embedding failed, case skipped");
                    outcome.failed += 1;
                    continue;
                }
            };
            normalize(&mut vector);
            if !is_unit(&vector, UNIT_TOLERANCE) {
                warn!(case_id = %case.case_id, "embedding has zero norm, case skipped");
                outcome.failed += 1;
                continue;
            }
            index.add(&vector)?;
            metadata.push(EmbeddingRecord::for_case(case, stored.filename.as_str()));
            outcome.indexed += 1;

            if outcome.indexed % 500 == 0 {
                info!(indexed = outcome.indexed, "indexing progress");
            }
        }

        if index.is_empty() {
            return Err(IndexError::NothingToIndex);
        }
        let snapshot = IndexSnapshot::new(index, metadata)?;
        info!(
            indexed = outcome.indexed,
            too_short = outcome.too_short,
            failed = outcome.failed,
            "index built"
        );
        Ok((snapshot, outcome))
    }

    /// Rebuild from every case in `store` and publish the result under `dir`.
    pub async fn rebuild(
        &self,
        store: &CaseStore,
        dir: &Path,
    ) -> Result<(PathBuf, IndexOutcome), IndexError> {
        let cases = store.load_all()?;
        let (snapshot, outcome) = self.build(&cases).await?;
        let published = snapshot.publish(dir)?;
        Ok((published, outcome))
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, ServiceError> {
        let vector = self.embedder.embed(text).await?;
        if vector.len() != self.embedder.dim() {
            return Err(ServiceError::Dimension {
                expected: self.embedder.dim(),
                actual: vector.len(),
            });
        }
        Ok(vector)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{KeywordEmbedder, ZeroEmbedder, case};
    use priorauth_core::Case;
    use tempfile::TempDir;

    fn stored(case: Case) -> StoredCase {
        StoredCase {
            filename: format!("{}.json", case.case_id),
            case,
        }
    }

    fn corpus() -> Vec<StoredCase> {
        vec![
            stored(case(1, Some("Lumbar disc herniation"), Some("Lumbar discectomy"), "Orthopedic")),
            stored(case(2, Some("Flu"), None, "")),
            stored(case(3, Some("Torn meniscus of the knee"), Some("Knee arthroscopy"), "Orthopedic")),
            stored(case(4, None, None, "")),
        ]
    }

    #[tokio::test]
    async fn short_canonical_text_excluded() {
        let embedder = KeywordEmbedder::new();
        let (snapshot, outcome) = Indexer::new(&embedder).build(&corpus()).await.unwrap();

        assert_eq!(outcome, IndexOutcome { indexed: 2, too_short: 2, failed: 0 });
        assert_eq!(embedder.calls(), 2);
        let ids: Vec<_> = snapshot.metadata().iter().map(|m| m.case_id.as_str()).collect();
        assert_eq!(ids, ["case_0001", "case_0003"]);
    }

    #[tokio::test]
    async fn metadata_aligned_with_vectors() {
        let embedder = KeywordEmbedder::new();
        let cases = corpus();
        let (snapshot, _) = Indexer::new(&embedder).build(&cases).await.unwrap();

        assert_eq!(snapshot.index().len(), snapshot.metadata().len());
        for (i, meta) in snapshot.metadata().iter().enumerate() {
            let case = &cases.iter().find(|c| c.case.case_id == meta.case_id).unwrap().case;
            let expected = embedder.embed(&canonical_text(case)).await.unwrap();
            let stored = snapshot.index().vector(i).unwrap();
            assert!(is_unit(stored, 1e-5));
            assert_eq!(stored, expected.as_slice());
            assert_eq!(meta.source_filename, format!("{}.json", meta.case_id));
        }
    }

    #[tokio::test]
    async fn embedding_failure_skips_case() {
        let embedder = KeywordEmbedder::failing_on("meniscus");
        let (snapshot, outcome) = Indexer::new(&embedder).build(&corpus()).await.unwrap();
        assert_eq!(outcome.failed, 1);
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot.metadata()[0].case_id, "case_0001");
    }

    #[tokio::test]
    async fn zero_vectors_are_not_indexed() {
        let embedder = ZeroEmbedder::new(4);
        let err = Indexer::new(&embedder).build(&corpus()).await.unwrap_err();
        assert!(matches!(err, IndexError::NothingToIndex));
    }

    #[tokio::test]
    async fn every_indexed_vector_is_unit() {
        let embedder = KeywordEmbedder::failing_on("meniscus");
        let (snapshot, outcome) = Indexer::new(&embedder).build(&corpus()).await.unwrap();
        assert_eq!(outcome.indexed, snapshot.len());
        assert!(snapshot.index().vectors().all(|v| is_unit(v, UNIT_TOLERANCE)));
    }

    #[tokio::test]
    async fn nothing_embeddable_is_an_error() {
        let embedder = KeywordEmbedder::new();
        let cases = vec![stored(case(9, Some("Flu"), None, ""))];
        let err = Indexer::new(&embedder).build(&cases).await.unwrap_err();
        assert!(matches!(err, IndexError::NothingToIndex));
    }

    #[tokio::test]
    async fn rebuild_publishes_snapshot() {
        let tmp = TempDir::new().unwrap();
        let store = CaseStore::open(&tmp.path().join("cases")).unwrap();
        for c in corpus() {
            store.write(&c.case).unwrap();
        }
        let embeddings = tmp.path().join("embeddings");
        let embedder = KeywordEmbedder::new();

        let (published, outcome) = Indexer::new(&embedder).rebuild(&store, &embeddings).await.unwrap();
        assert!(published.starts_with(&embeddings));
        assert_eq!(outcome.indexed, 2);

        let loaded = IndexSnapshot::load(&embeddings).unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded.index().model_id(), "keyword-test");
        assert_eq!(loaded.metadata()[0].source_filename, "case_0001.json");
    }
}
