//! Write-once case files and the ledger of completed case ids.
//!
//! Each case lives in `<dir>/<case_id>.json`. A file exists only once its case has been
//! fully extracted and validated, so the set of file stems is exactly the set of
//! completed ids.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use priorauth_core::Case;
use tracing::{info, warn};

use crate::StoreError;
use crate::atomic::create_atomic;

/// Directory of persisted cases.
pub struct CaseStore {
    dir: PathBuf,
}

/// A case together with the file it was loaded from.
#[derive(Debug, Clone)]
pub struct StoredCase {
    pub filename: String,
    pub case: Case,
}

/// Queryable set of case ids whose extraction has completed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CaseLedger {
    ids: BTreeSet<String>,
}

impl CaseLedger {
    pub fn contains(&self, case_id: &str) -> bool {
        self.ids.contains(case_id)
    }

    /// Record a completed id. Returns `false` if it was already recorded.
    pub fn insert(&mut self, case_id: impl Into<String>) -> bool {
        self.ids.insert(case_id.into())
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.ids.iter().map(String::as_str)
    }
}

impl FromIterator<String> for CaseLedger {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        Self {
            ids: iter.into_iter().collect(),
        }
    }
}

impl CaseStore {
    /// Open the case directory, creating it if needed.
    pub fn open(dir: &Path) -> Result<Self, StoreError> {
        std::fs::create_dir_all(dir).map_err(|e| StoreError::io(dir, e))?;
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, case_id: &str) -> PathBuf {
        self.dir.join(format!("{case_id}.json"))
    }

    /// Build the ledger of completed ids from the files present.
    pub fn ledger(&self) -> Result<CaseLedger, StoreError> {
        let ledger: CaseLedger = self
            .json_files()?
            .into_iter()
            .filter_map(|name| name.strip_suffix(".json").map(str::to_string))
            .collect();
        info!(dir = %self.dir.display(), completed = ledger.len(), "loaded case ledger");
        Ok(ledger)
    }

    /// Persist a case. Fails with [`StoreError::AlreadyStored`] if its file already exists.
    pub fn write(&self, case: &Case) -> Result<PathBuf, StoreError> {
        let path = self.path_for(&case.case_id);
        let bytes = serde_json::to_vec_pretty(case).map_err(|e| StoreError::json(&path, e))?;
        create_atomic(&path, &bytes).map_err(|e| {
            if e.kind() == std::io::ErrorKind::AlreadyExists {
                StoreError::AlreadyStored(case.case_id.clone())
            } else {
                StoreError::io(&path, e)
            }
        })?;
        Ok(path)
    }

    pub fn load(&self, case_id: &str) -> Result<Case, StoreError> {
        let path = self.path_for(case_id);
        read_case(&path)
    }

    /// Load every case in file-name order. Unreadable files are logged and skipped.
    pub fn load_all(&self) -> Result<Vec<StoredCase>, StoreError> {
        let mut cases = Vec::new();
        for filename in self.json_files()? {
            let path = self.dir.join(&filename);
            match read_case(&path) {
                Ok(case) => cases.push(StoredCase { filename, case }),
                Err(e) => warn!(file = %filename, error = %e, "skipping unreadable case file"),
            }
        }
        Ok(cases)
    }

    pub fn count(&self) -> Result<usize, StoreError> {
        Ok(self.json_files()?.len())
    }

    /// Sorted names of `*.json` files in the directory.
    fn json_files(&self) -> Result<Vec<String>, StoreError> {
        let entries = std::fs::read_dir(&self.dir).map_err(|e| StoreError::io(&self.dir, e))?;
        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| StoreError::io(&self.dir, e))?;
            if let Some(name) = entry.file_name().to_str() {
                if name.ends_with(".json") && !name.starts_with('.') {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }
}

fn read_case(path: &Path) -> Result<Case, StoreError> {
    let text = std::fs::read_to_string(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            StoreError::NotFound(path.to_path_buf())
        } else {
            StoreError::io(path, e)
        }
    })?;
    serde_json::from_str(&text).map_err(|e| StoreError::json(path, e))
}
