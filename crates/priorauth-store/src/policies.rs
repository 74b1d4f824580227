//! Coverage policy files, one per procedure: `<dir>/<slug>_policy.txt`.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use priorauth_core::{Policy, PolicyError, policy};
use tracing::{debug, warn};

use crate::StoreError;
use crate::atomic::write_atomic;

const SUFFIX: &str = "_policy.txt";

/// Directory of policy documents.
pub struct PolicyStore {
    dir: PathBuf,
}

impl PolicyStore {
    /// Open the policy directory, creating it if needed.
    pub fn open(dir: &Path) -> Result<Self, StoreError> {
        std::fs::create_dir_all(dir).map_err(|e| StoreError::io(dir, e))?;
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write (or replace) a policy file.
    pub fn write(&self, policy: &Policy) -> Result<PathBuf, StoreError> {
        let path = self.dir.join(policy.file_name());
        write_atomic(&path, policy.render().as_bytes())?;
        Ok(path)
    }

    /// Slugs of every policy file present.
    pub fn existing_slugs(&self) -> Result<BTreeSet<String>, StoreError> {
        Ok(self
            .policy_files()?
            .into_iter()
            .filter_map(|name| name.strip_suffix(SUFFIX).map(str::to_string))
            .collect())
    }

    pub fn count(&self) -> Result<usize, StoreError> {
        Ok(self.policy_files()?.len())
    }

    /// Load every policy in file-name order.
    ///
    /// Files without the standard header are named after their slug. Unreadable files are
    /// logged and skipped.
    pub fn load_all(&self) -> Result<Vec<Policy>, StoreError> {
        let mut policies = Vec::new();
        for name in self.policy_files()? {
            let path = self.dir.join(&name);
            let text = match std::fs::read_to_string(&path) {
                Ok(text) => text,
                Err(e) => {
                    warn!(file = %name, error = %e, "skipping unreadable policy file");
                    continue;
                }
            };
            let policy = match Policy::parse(&text) {
                Ok(p) => p,
                Err(PolicyError::MissingHeader(line)) => {
                    debug!(file = %name, missing = line, "policy without header, naming from file");
                    let slug = name.strip_suffix(SUFFIX).unwrap_or(&name);
                    Policy::from_slug(slug, text)
                }
            };
            policies.push(policy);
        }
        Ok(policies)
    }

    /// The stored policy best matching `requested`, if any.
    pub fn find(&self, requested: &str) -> Result<Option<Policy>, StoreError> {
        let policies = self.load_all()?;
        Ok(policy::select(&policies, requested).cloned())
    }

    fn policy_files(&self) -> Result<Vec<String>, StoreError> {
        let entries = std::fs::read_dir(&self.dir).map_err(|e| StoreError::io(&self.dir, e))?;
        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| StoreError::io(&self.dir, e))?;
            if let Some(name) = entry.file_name().to_str() {
                if name.ends_with(SUFFIX) && !name.starts_with('.') {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }
}
