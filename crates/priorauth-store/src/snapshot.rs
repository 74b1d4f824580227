//! Index snapshots: the flat index, the float32 matrix and the metadata list, published
//! together.
//!
//! Each build is written to its own generation directory:
//!
//! ```text
//! <dir>/CURRENT                       -> "snapshot-20260101T120000123456789"
//! <dir>/snapshot-.../patient_cases.index
//! <dir>/snapshot-.../embeddings.arrow
//! <dir>/snapshot-.../metadata.json
//! ```
//!
//! A generation is complete before `CURRENT` is atomically switched to it, so readers only
//! ever see a whole triple. The previous generation is kept for readers still holding it.

use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow::array::{Array, FixedSizeListArray, FixedSizeListBuilder, Float32Array, Float32Builder, StringArray};
use arrow::ipc::reader::FileReader;
use arrow::ipc::writer::FileWriter;
use arrow::record_batch::RecordBatch;
use priorauth_core::EmbeddingRecord;
use priorauth_core::schema::matrix::embedding_matrix_schema;
use tracing::{info, warn};

use crate::atomic::{write_atomic, write_json_atomic};
use crate::{FlatIndex, StoreError};

const CURRENT: &str = "CURRENT";
const GENERATION_PREFIX: &str = "snapshot-";
const STAGING_SUFFIX: &str = ".staging";
const INDEX_FILE: &str = "patient_cases.index";
const MATRIX_FILE: &str = "embeddings.arrow";
const METADATA_FILE: &str = "metadata.json";
const KEEP_GENERATIONS: usize = 2;

/// A position-aligned index and metadata list: `metadata[i]` describes vector `i`.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexSnapshot {
    index: FlatIndex,
    metadata: Vec<EmbeddingRecord>,
}

/// Summary of the published snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotInfo {
    pub generation: String,
    pub count: usize,
    pub dim: usize,
    pub model_id: String,
}

impl IndexSnapshot {
    pub fn new(index: FlatIndex, metadata: Vec<EmbeddingRecord>) -> Result<Self, StoreError> {
        if index.len() != metadata.len() {
            return Err(StoreError::Consistency(format!(
                "{} vectors but {} metadata records",
                index.len(),
                metadata.len()
            )));
        }
        Ok(Self { index, metadata })
    }

    pub fn index(&self) -> &FlatIndex {
        &self.index
    }

    pub fn metadata(&self) -> &[EmbeddingRecord] {
        &self.metadata
    }

    pub fn len(&self) -> usize {
        self.metadata.len()
    }

    pub fn is_empty(&self) -> bool {
        self.metadata.is_empty()
    }

    /// Write a new generation under `dir` and switch `CURRENT` to it.
    pub fn publish(&self, dir: &Path) -> Result<PathBuf, StoreError> {
        std::fs::create_dir_all(dir).map_err(|e| StoreError::io(dir, e))?;

        let generation = next_generation_name(dir);
        let staging = dir.join(format!("{generation}{STAGING_SUFFIX}"));
        std::fs::create_dir(&staging).map_err(|e| StoreError::io(&staging, e))?;

        write_atomic(&staging.join(INDEX_FILE), &self.index.to_bytes())?;
        write_atomic(&staging.join(MATRIX_FILE), &self.matrix_ipc()?)?;
        write_json_atomic(&staging.join(METADATA_FILE), &self.metadata)?;

        let final_dir = dir.join(&generation);
        std::fs::rename(&staging, &final_dir).map_err(|e| StoreError::io(&final_dir, e))?;
        write_atomic(&dir.join(CURRENT), generation.as_bytes())?;

        info!(
            generation = %generation,
            vectors = self.len(),
            dim = self.index.dim(),
            model = %self.index.model_id(),
            "published index snapshot"
        );
        prune(dir, &generation);
        Ok(final_dir)
    }

    /// Load the published snapshot, verifying that all three artifacts agree.
    pub fn load(dir: &Path) -> Result<Self, StoreError> {
        let generation_dir = dir.join(current_generation(dir)?);

        let index_path = generation_dir.join(INDEX_FILE);
        let index = FlatIndex::from_bytes(&read(&index_path)?)?;

        let metadata_path = generation_dir.join(METADATA_FILE);
        let metadata: Vec<EmbeddingRecord> = serde_json::from_slice(&read(&metadata_path)?)
            .map_err(|e| StoreError::json(&metadata_path, e))?;

        let snapshot = Self::new(index, metadata)?;
        snapshot.verify_matrix(&read(&generation_dir.join(MATRIX_FILE))?)?;

        info!(
            dir = %generation_dir.display(),
            vectors = snapshot.len(),
            model = %snapshot.index.model_id(),
            "loaded index snapshot"
        );
        Ok(snapshot)
    }

    /// Describe the published snapshot, if any.
    pub fn info(dir: &Path) -> Result<Option<SnapshotInfo>, StoreError> {
        let generation = match current_generation(dir) {
            Ok(g) => g,
            Err(StoreError::NoSnapshot(_)) => return Ok(None),
            Err(e) => return Err(e),
        };
        let index = FlatIndex::from_bytes(&read(&dir.join(&generation).join(INDEX_FILE))?)?;
        Ok(Some(SnapshotInfo {
            generation,
            count: index.len(),
            dim: index.dim(),
            model_id: index.model_id().to_string(),
        }))
    }

    /// Encode the vectors as an Arrow IPC file: `case_id` plus a fixed-size float32 list.
    fn matrix_ipc(&self) -> Result<Vec<u8>, StoreError> {
        let dim = self.index.dim();
        let schema = Arc::new(embedding_matrix_schema(dim as i32));

        let ids = StringArray::from(
            self.metadata
                .iter()
                .map(|m| m.case_id.as_str())
                .collect::<Vec<_>>(),
        );
        let mut builder =
            FixedSizeListBuilder::new(Float32Builder::with_capacity(self.len() * dim), dim as i32);
        for v in self.index.vectors() {
            builder.values().append_slice(v);
            builder.append(true);
        }
        let batch = RecordBatch::try_new(
            schema.clone(),
            vec![Arc::new(ids), Arc::new(builder.finish())],
        )?;

        let mut buf = Vec::new();
        {
            let mut writer = FileWriter::try_new(&mut buf, &schema)?;
            writer.write(&batch)?;
            writer.finish()?;
        }
        Ok(buf)
    }

    /// Check the stored matrix against the index and metadata, row by row.
    fn verify_matrix(&self, bytes: &[u8]) -> Result<(), StoreError> {
        let reader = FileReader::try_new(Cursor::new(bytes), None)?;
        let mut row = 0usize;

        for batch in reader {
            let batch = batch?;
            let ids = batch
                .column_by_name("case_id")
                .and_then(|c| c.as_any().downcast_ref::<StringArray>())
                .ok_or_else(|| StoreError::Consistency("matrix missing case_id column".into()))?;
            let fsl = batch
                .column_by_name("embedding")
                .and_then(|c| c.as_any().downcast_ref::<FixedSizeListArray>())
                .ok_or_else(|| StoreError::Consistency("matrix missing embedding column".into()))?;

            let dim = fsl.value_length() as usize;
            if dim != self.index.dim() {
                return Err(StoreError::DimensionMismatch {
                    expected: self.index.dim(),
                    actual: dim,
                });
            }
            let values = fsl
                .values()
                .as_any()
                .downcast_ref::<Float32Array>()
                .ok_or_else(|| StoreError::Consistency("matrix values are not float32".into()))?;

            for i in 0..batch.num_rows() {
                let meta = self.metadata.get(row).ok_or_else(|| {
                    StoreError::Consistency(format!("matrix has more than {} rows", self.len()))
                })?;
                if ids.value(i) != meta.case_id {
                    return Err(StoreError::Consistency(format!(
                        "row {row}: matrix case {} but metadata case {}",
                        ids.value(i),
                        meta.case_id
                    )));
                }
                let offset = (fsl.offset() + i) * dim;
                let stored = &values.values()[offset..offset + dim];
                if Some(stored) != self.index.vector(row) {
                    return Err(StoreError::Consistency(format!(
                        "row {row}: matrix vector differs from index"
                    )));
                }
                row += 1;
            }
        }

        if row != self.len() {
            return Err(StoreError::Consistency(format!(
                "matrix has {row} rows, index has {}",
                self.len()
            )));
        }
        Ok(())
    }
}

fn read(path: &Path) -> Result<Vec<u8>, StoreError> {
    std::fs::read(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            StoreError::Consistency(format!("missing snapshot artifact {}", path.display()))
        } else {
            StoreError::io(path, e)
        }
    })
}

fn current_generation(dir: &Path) -> Result<String, StoreError> {
    let pointer = dir.join(CURRENT);
    match std::fs::read_to_string(&pointer) {
        Ok(text) => {
            let generation = text.trim();
            if generation.starts_with(GENERATION_PREFIX) && !generation.contains(['/', '\\']) {
                Ok(generation.to_string())
            } else {
                Err(StoreError::Corrupt(format!("CURRENT points at {generation:?}")))
            }
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(StoreError::NoSnapshot(dir.to_path_buf()))
        }
        Err(e) => Err(StoreError::io(pointer, e)),
    }
}

/// Generation names sort chronologically; a counter breaks same-instant collisions.
fn next_generation_name(dir: &Path) -> String {
    let stamp = chrono::Utc::now().format("%Y%m%dT%H%M%S%9f").to_string();
    let mut name = format!("{GENERATION_PREFIX}{stamp}");
    let mut n = 1;
    while dir.join(&name).exists() || dir.join(format!("{name}{STAGING_SUFFIX}")).exists() {
        name = format!("{GENERATION_PREFIX}{stamp}-{n}");
        n += 1;
    }
    name
}

/// Remove all but the newest generations and any abandoned staging directories.
fn prune(dir: &Path, current: &str) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    let mut generations = Vec::new();
    for entry in entries.flatten() {
        let Some(name) = entry.file_name().to_str().map(str::to_string) else {
            continue;
        };
        if !name.starts_with(GENERATION_PREFIX) {
            continue;
        }
        if name.ends_with(STAGING_SUFFIX) {
            remove(&entry.path());
        } else {
            generations.push(name);
        }
    }

    generations.sort();
    let keep_from = generations.len().saturating_sub(KEEP_GENERATIONS);
    for name in &generations[..keep_from] {
        if name != current {
            remove(&dir.join(name));
        }
    }
}

fn remove(path: &Path) {
    if let Err(e) = std::fs::remove_dir_all(path) {
        warn!(path = %path.display(), error = %e, "failed to prune snapshot directory");
    }
}
