//! Shared runtime configuration.
//!
//! Every field has a default, so a settings file only needs the keys it overrides.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read settings {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parse settings {path:?}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Root of the artifact store.
    pub data_dir: PathBuf,
    /// Source CSV of clinical narratives.
    pub raw_records: PathBuf,
    /// Base URL of the completion/embedding service.
    pub service_url: String,
    pub completion_model: String,
    /// Embedding model id; recorded in the index and checked at query time.
    pub embedding_model: String,
    /// Vector width produced by the embedding model.
    pub embedding_dim: usize,
    /// Directory holding `model.onnx` and `tokenizer.json` for local embeddings.
    pub model_dir: PathBuf,
    pub extraction: ExtractionSettings,
    pub indexing: IndexSettings,
    pub decision: DecisionSettings,
    pub policies: PolicySettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionSettings {
    /// Narratives are truncated to this many characters before prompting.
    pub narrative_limit: usize,
    /// Narratives shorter than this are never sent for extraction.
    pub min_narrative_len: usize,
    pub timeout_secs: u64,
    pub delay_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexSettings {
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecisionSettings {
    pub top_k: usize,
    /// Characters of policy text included in the synthesis prompt.
    pub policy_excerpt: usize,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicySettings {
    pub timeout_secs: u64,
    pub delay_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            raw_records: PathBuf::from("data/raw/mtsamples.csv"),
            service_url: "http://localhost:11434".into(),
            completion_model: "llama3.2".into(),
            embedding_model: "all-MiniLM-L6-v2".into(),
            embedding_dim: 384,
            model_dir: PathBuf::from("models/all-MiniLM-L6-v2"),
            extraction: ExtractionSettings::default(),
            indexing: IndexSettings::default(),
            decision: DecisionSettings::default(),
            policies: PolicySettings::default(),
        }
    }
}

impl Default for ExtractionSettings {
    fn default() -> Self {
        Self {
            narrative_limit: 5000,
            min_narrative_len: 100,
            timeout_secs: 60,
            delay_ms: 200,
        }
    }
}

impl Default for IndexSettings {
    fn default() -> Self {
        Self { timeout_secs: 60 }
    }
}

impl Default for DecisionSettings {
    fn default() -> Self {
        Self {
            top_k: 3,
            policy_excerpt: 3000,
            timeout_secs: 120,
        }
    }
}

impl Default for PolicySettings {
    fn default() -> Self {
        Self {
            timeout_secs: 120,
            delay_ms: 500,
        }
    }
}

impl Settings {
    /// Load settings from a JSON file, filling unspecified keys with defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let settings = serde_json::from_str(&text).map_err(|source| ConfigError::Json {
            path: path.to_path_buf(),
            source,
        })?;
        info!(path = %path.display(), "loaded settings");
        Ok(settings)
    }

    pub fn cases_dir(&self) -> PathBuf {
        self.data_dir.join("processed").join("cases")
    }

    pub fn policies_dir(&self) -> PathBuf {
        self.data_dir.join("processed").join("policies")
    }

    pub fn embeddings_dir(&self) -> PathBuf {
        self.data_dir.join("embeddings")
    }

    pub fn summary_path(&self) -> PathBuf {
        self.data_dir.join("processing_summary.json")
    }
}

impl ExtractionSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

impl IndexSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl DecisionSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl PolicySettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}
