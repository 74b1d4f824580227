use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("file not found: {0}")]
    NotFound(PathBuf),

    #[error("io error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("json error in {path:?}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("case {0} already stored")]
    AlreadyStored(String),

    #[error("no index snapshot published in {0:?}")]
    NoSnapshot(PathBuf),

    #[error("inconsistent index snapshot: {0}")]
    Consistency(String),

    #[error("vector has {actual} dimensions, index expects {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("index built with embedding model {indexed:?}, query service uses {active:?}")]
    ModelMismatch { indexed: String, active: String },

    #[error("malformed index file: {0}")]
    Corrupt(String),

    #[error("{0}")]
    Other(String),
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn json(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        Self::Json {
            path: path.into(),
            source,
        }
    }

    /// Errors that mean the index artifacts cannot be trusted.
    pub fn is_consistency(&self) -> bool {
        matches!(
            self,
            Self::Consistency(_)
                | Self::DimensionMismatch { .. }
                | Self::ModelMismatch { .. }
                | Self::Corrupt(_)
        )
    }
}
