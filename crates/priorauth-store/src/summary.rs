use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::StoreError;
use crate::atomic::write_json_atomic;

/// Outcome of one extraction run, written next to the case directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub timestamp: String,
    pub newly_processed: usize,
    pub skipped: usize,
    pub total_processed: usize,
    pub errors: usize,
    pub output_directory: String,
}

impl RunSummary {
    pub fn write(&self, path: &Path) -> Result<(), StoreError> {
        write_json_atomic(path, self)
    }

    pub fn load(path: &Path) -> Result<Option<Self>, StoreError> {
        match std::fs::read(path) {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|e| StoreError::json(path, e)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::io(path, e)),
        }
    }
}
