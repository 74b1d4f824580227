use priorauth_core::Settings;
use priorauth_store::{
    CaseStore, IndexSnapshot, PolicyStore, RunSummary, SnapshotInfo, StoreError, read_raw_records,
};

use crate::CATALOGUE;

/// Read-only view of how far each stage has progressed.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusReport {
    pub policies: usize,
    pub policy_catalogue: usize,
    pub cases: usize,
    /// Raw records long enough to extract; `None` when the source file is absent.
    pub eligible_records: Option<usize>,
    pub snapshot: Option<SnapshotInfo>,
    pub last_run: Option<RunSummary>,
}

impl StatusReport {
    pub fn policies_complete(&self) -> bool {
        self.policies >= self.policy_catalogue
    }

    pub fn cases_complete(&self) -> bool {
        self.eligible_records.is_some_and(|n| self.cases >= n)
    }
}

/// Inspect the artifact store described by `settings` without modifying it.
pub fn status(settings: &Settings) -> Result<StatusReport, StoreError> {
    let policies_dir = settings.policies_dir();
    let policies = if policies_dir.is_dir() {
        PolicyStore::open(&policies_dir)?.count()?
    } else {
        0
    };

    let cases_dir = settings.cases_dir();
    let cases = if cases_dir.is_dir() {
        CaseStore::open(&cases_dir)?.count()?
    } else {
        0
    };

    let eligible_records = if settings.raw_records.is_file() {
        let min = settings.extraction.min_narrative_len;
        Some(
            read_raw_records(&settings.raw_records)?
                .iter()
                .filter(|r| r.narrative_len() >= min)
                .count(),
        )
    } else {
        None
    };

    Ok(StatusReport {
        policies,
        policy_catalogue: CATALOGUE.len(),
        cases,
        eligible_records,
        snapshot: IndexSnapshot::info(&settings.embeddings_dir())?,
        last_run: RunSummary::load(&settings.summary_path())?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::case;
    use priorauth_core::Policy;
    use tempfile::TempDir;

    fn settings(tmp: &TempDir) -> Settings {
        Settings {
            data_dir: tmp.path().to_path_buf(),
            raw_records: tmp.path().join("raw").join("mtsamples.csv"),
            ..Settings::default()
        }
    }

    #[test]
    fn empty_store() {
        let tmp = TempDir::new().unwrap();
        let report = status(&settings(&tmp)).unwrap();
        assert_eq!(report.policies, 0);
        assert_eq!(report.policy_catalogue, 50);
        assert_eq!(report.cases, 0);
        assert_eq!(report.eligible_records, None);
        assert!(report.snapshot.is_none());
        assert!(report.last_run.is_none());
        assert!(!report.cases_complete());
        // Inspection creates nothing.
        assert!(!settings(&tmp).cases_dir().exists());
    }

    #[test]
    fn counts_artifacts() {
        let tmp = TempDir::new().unwrap();
        let s = settings(&tmp);

        PolicyStore::open(&s.policies_dir())
            .unwrap()
            .write(&Policy::new("Lumbar Fusion", "22612", "body"))
            .unwrap();
        let cases = CaseStore::open(&s.cases_dir()).unwrap();
        cases.write(&case(0, Some("Stenosis"), None, "Orthopedic")).unwrap();

        std::fs::create_dir_all(s.raw_records.parent().unwrap()).unwrap();
        let long = "x".repeat(150);
        std::fs::write(
            &s.raw_records,
            format!("description,medical_specialty,sample_name,transcription\nd,Ortho,s,{long}\nd,Ortho,s,short\n"),
        )
        .unwrap();

        let report = status(&s).unwrap();
        assert_eq!(report.policies, 1);
        assert_eq!(report.cases, 1);
        assert_eq!(report.eligible_records, Some(1));
        assert!(report.cases_complete());
        assert!(!report.policies_complete());
    }
}
