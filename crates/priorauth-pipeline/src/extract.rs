//! Resumable extraction of structured cases from raw narratives.
//!
//! Records are processed one at a time. A case file is written only after its extraction
//! validated, so stopping between records loses nothing and a re-run skips every id
//! already in the ledger without calling the completion service.

use std::path::PathBuf;

use priorauth_ai::{CompletionRequest, CompletionService, OutputMode};
use priorauth_core::config::ExtractionSettings;
use priorauth_core::schema::json::extraction_schema;
use priorauth_core::{Case, ExtractedCase, RawRecord, decode_response};
use priorauth_store::{CaseLedger, CaseStore, RunSummary, StoreError};
use tracing::{debug, info, warn};

use crate::{Confirm, ExtractionError, Pacer};

/// Seconds per record observed against a local model; used for the run estimate only.
const SECONDS_PER_RECORD: f64 = 3.5;

const PROMPT_HEADER: &str = "\
Extract clinical information from this medical document. Return ONLY valid JSON, no other text.";

const PROMPT_SHAPE: &str = r#"Return JSON with this exact structure:
{
    "patient_demographics": {
        "age": "patient age or null",
        "gender": "patient gender or null",
        "chief_complaint": "main presenting problem"
    },
    "clinical_information": {
        "diagnosis": "primary diagnosis",
        "symptoms": "key symptoms",
        "symptom_duration": "duration or null",
        "physical_exam_findings": "key findings"
    },
    "diagnostic_tests": {
        "imaging": "imaging studies or null",
        "labs": "lab tests or null",
        "other_tests": "other tests or null"
    },
    "treatment": {
        "procedure_performed": "procedure done or null",
        "procedure_planned": "procedure planned or null",
        "medications": "medications or null",
        "conservative_treatments": "non-surgical treatments or null"
    },
    "clinical_assessment": {
        "severity": "mild/moderate/severe or null",
        "urgency": "elective/urgent/emergent or null",
        "prognosis": "expected outcome or null"
    }
}

Extract only explicitly stated information. Use null for missing data."#;

/// Counts for one extraction run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtractionOutcome {
    pub processed: usize,
    pub skipped: usize,
    pub errors: usize,
    /// Records below the narrative floor; never sent for extraction.
    pub ineligible: usize,
}

/// What a run would do, computed before any external call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtractionPlan {
    pub eligible: usize,
    pub ineligible: usize,
    pub already_done: usize,
    pub pending: usize,
}

impl ExtractionPlan {
    pub fn estimated_hours(&self) -> f64 {
        self.pending as f64 * SECONDS_PER_RECORD / 3600.0
    }
}

pub struct ExtractionPipeline<'a> {
    completion: &'a dyn CompletionService,
    store: &'a CaseStore,
    pacer: &'a dyn Pacer,
    settings: ExtractionSettings,
    summary_path: PathBuf,
    limit: Option<usize>,
}

impl<'a> ExtractionPipeline<'a> {
    pub fn new(
        completion: &'a dyn CompletionService,
        store: &'a CaseStore,
        pacer: &'a dyn Pacer,
        settings: ExtractionSettings,
        summary_path: PathBuf,
    ) -> Self {
        Self {
            completion,
            store,
            pacer,
            settings,
            summary_path,
            limit: None,
        }
    }

    /// Stop after this many completion calls.
    pub fn with_limit(mut self, limit: Option<usize>) -> Self {
        self.limit = limit;
        self
    }

    fn is_eligible(&self, record: &RawRecord) -> bool {
        record.narrative_len() >= self.settings.min_narrative_len
    }

    pub fn plan(&self, records: &[RawRecord], ledger: &CaseLedger) -> ExtractionPlan {
        let eligible: Vec<&RawRecord> = records.iter().filter(|r| self.is_eligible(r)).collect();
        let already_done = eligible
            .iter()
            .filter(|r| ledger.contains(&r.case_id()))
            .count();
        let mut pending = eligible.len() - already_done;
        if let Some(limit) = self.limit {
            pending = pending.min(limit);
        }
        ExtractionPlan {
            eligible: eligible.len(),
            ineligible: records.len() - eligible.len(),
            already_done,
            pending,
        }
    }

    /// Plan, ask for confirmation, then process. `None` when the run was declined.
    ///
    /// With nothing pending no confirmation is asked; a summary of zero new cases is
    /// still written.
    pub async fn run(
        &self,
        records: &[RawRecord],
        ledger: &mut CaseLedger,
        confirm: &dyn Confirm,
    ) -> Result<Option<ExtractionOutcome>, ExtractionError> {
        let plan = self.plan(records, ledger);
        info!(
            eligible = plan.eligible,
            ineligible = plan.ineligible,
            already_done = plan.already_done,
            pending = plan.pending,
            "extraction plan"
        );
        if plan.pending == 0 {
            info!("all eligible records already extracted");
            let outcome = ExtractionOutcome {
                skipped: plan.already_done,
                ineligible: plan.ineligible,
                ..Default::default()
            };
            self.write_summary(&outcome)?;
            return Ok(Some(outcome));
        }
        if !confirm.confirm(&format!("Process {} cases?", plan.pending)) {
            info!("extraction cancelled");
            return Ok(None);
        }
        self.process(records, ledger).await.map(Some)
    }

    /// Extract every eligible record not yet in `ledger`, then write the run summary.
    pub async fn process(
        &self,
        records: &[RawRecord],
        ledger: &mut CaseLedger,
    ) -> Result<ExtractionOutcome, ExtractionError> {
        let mut outcome = ExtractionOutcome::default();
        let mut calls = 0usize;

        for record in records {
            if !self.is_eligible(record) {
                outcome.ineligible += 1;
                continue;
            }
            let case_id = record.case_id();
            if ledger.contains(&case_id) {
                outcome.skipped += 1;
                continue;
            }
            if self.limit.is_some_and(|limit| calls >= limit) {
                info!(limit = calls, "call limit reached, stopping");
                break;
            }

            calls += 1;
            let extracted = self.extract(record).await;
            self.pacer.pause().await;

            let stored = extracted.and_then(|case| self.store.write(&case).map_err(Into::into));
            match stored {
                Ok(path) => {
                    ledger.insert(case_id.as_str());
                    outcome.processed += 1;
                    debug!(case_id = %case_id, path = %path.display(), "case stored");
                }
                Err(ExtractionError::Store(StoreError::AlreadyStored(_))) => {
                    // Written by a concurrent or earlier run since the ledger was loaded.
                    ledger.insert(case_id.as_str());
                    outcome.skipped += 1;
                }
                Err(e) => {
                    outcome.errors += 1;
                    warn!(case_id = %case_id, kind = e.kind(), error = %e, "extraction failed, record dropped");
                }
            }

            if calls % 100 == 0 {
                info!(calls, processed = outcome.processed, errors = outcome.errors, "extraction progress");
            }
        }

        self.write_summary(&outcome)?;

        info!(
            processed = outcome.processed,
            skipped = outcome.skipped,
            errors = outcome.errors,
            ineligible = outcome.ineligible,
            summary = %self.summary_path.display(),
            "extraction complete"
        );
        Ok(outcome)
    }

    fn write_summary(&self, outcome: &ExtractionOutcome) -> Result<(), StoreError> {
        RunSummary {
            timestamp: chrono::Utc::now().to_rfc3339(),
            newly_processed: outcome.processed,
            skipped: outcome.skipped,
            total_processed: outcome.processed + outcome.skipped,
            errors: outcome.errors,
            output_directory: self.store.dir().display().to_string(),
        }
        .write(&self.summary_path)
    }

    async fn extract(&self, record: &RawRecord) -> Result<Case, ExtractionError> {
        let prompt = extraction_prompt(record, self.settings.narrative_limit);
        debug!(case_id = %record.case_id(), prompt_chars = prompt.len(), "requesting extraction");

        let request = CompletionRequest::new(
            prompt,
            OutputMode::Schema(extraction_schema()),
            self.settings.timeout(),
        );
        let completion = self.completion.complete(&request).await?;
        let extracted: ExtractedCase = decode_response(&completion.text)?;
        Ok(Case::from_extraction(
            extracted,
            record,
            chrono::Utc::now().to_rfc3339(),
        ))
    }
}

fn extraction_prompt(record: &RawRecord, narrative_limit: usize) -> String {
    format!(
        "{PROMPT_HEADER}\n\nSPECIALTY: {specialty}\n\nDOCUMENT:\n{document}\n\n{PROMPT_SHAPE}",
        specialty = record.specialty,
        document = truncate_chars(&record.narrative, narrative_limit),
    )
}

/// The first `max` characters of `s`.
fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((i, _)) => &s[..i],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ScriptedCompletion, extraction_reply, raw_record};
    use crate::{AutoConfirm, Decline, NoDelay};
    use priorauth_ai::ServiceError;
    use std::time::Duration;
    use tempfile::TempDir;

    struct Fixture {
        _tmp: TempDir,
        store: CaseStore,
        summary: PathBuf,
    }

    fn fixture() -> Fixture {
        let tmp = TempDir::new().unwrap();
        let store = CaseStore::open(&tmp.path().join("cases")).unwrap();
        let summary = tmp.path().join("processing_summary.json");
        Fixture {
            _tmp: tmp,
            store,
            summary,
        }
    }

    fn pipeline<'a>(f: &'a Fixture, completion: &'a ScriptedCompletion) -> ExtractionPipeline<'a> {
        ExtractionPipeline::new(
            completion,
            &f.store,
            &NoDelay,
            ExtractionSettings::default(),
            f.summary.clone(),
        )
    }

    fn records() -> Vec<RawRecord> {
        vec![
            raw_record(0, "lumbar disc herniation", 200),
            raw_record(1, "knee pain", 200),
            raw_record(2, "short", 40),
            raw_record(3, "chest pain", 200),
        ]
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("abc", 10), "abc");
        assert_eq!(truncate_chars("abc", 0), "");
    }

    #[test]
    fn prompt_truncates_narrative() {
        let mut record = raw_record(7, "x", 200);
        record.narrative = "a".repeat(6000);
        let prompt = extraction_prompt(&record, 5000);
        assert!(prompt.contains(&"a".repeat(5000)));
        assert!(!prompt.contains(&"a".repeat(5001)));
        assert!(prompt.contains("SPECIALTY: Orthopedic"));
    }

    #[tokio::test]
    async fn processes_eligible_records() {
        let f = fixture();
        let completion = ScriptedCompletion::always(extraction_reply("Lumbar stenosis", "Laminectomy"));
        let mut ledger = f.store.ledger().unwrap();

        let outcome = pipeline(&f, &completion).process(&records(), &mut ledger).await.unwrap();
        assert_eq!(
            outcome,
            ExtractionOutcome {
                processed: 3,
                skipped: 0,
                errors: 0,
                ineligible: 1
            }
        );
        // The short narrative never reached the service.
        assert_eq!(completion.calls(), 3);
        assert!(ledger.contains("case_0000") && ledger.contains("case_0003"));
        assert!(!ledger.contains("case_0002"));

        let stored = f.store.load("case_0001").unwrap();
        assert_eq!(stored.clinical_information.diagnosis.as_deref(), Some("Lumbar stenosis"));
        assert_eq!(stored.original_data.index, 1);
        assert_eq!(stored.meta.specialty, "Orthopedic");

        let requests = completion.requests();
        assert!(requests.iter().all(|r| r.mode == OutputMode::Schema(extraction_schema())));
        assert!(requests.iter().all(|r| r.timeout == Duration::from_secs(60)));
    }

    #[tokio::test]
    async fn rerun_makes_no_calls_and_no_writes() {
        let f = fixture();
        let first = ScriptedCompletion::always(extraction_reply("Meniscal tear", "Arthroscopy"));
        let mut ledger = f.store.ledger().unwrap();
        pipeline(&f, &first).process(&records(), &mut ledger).await.unwrap();
        let before: Vec<_> = f.store.load_all().unwrap().into_iter().map(|c| c.case).collect();

        let second = ScriptedCompletion::always(extraction_reply("changed", "changed"));
        let mut reloaded = f.store.ledger().unwrap();
        let outcome = pipeline(&f, &second).process(&records(), &mut reloaded).await.unwrap();

        assert_eq!(second.calls(), 0);
        assert_eq!(outcome.processed, 0);
        assert_eq!(outcome.skipped, 3);
        let after: Vec<_> = f.store.load_all().unwrap().into_iter().map(|c| c.case).collect();
        assert_eq!(before, after);

        let summary = RunSummary::load(&f.summary).unwrap().unwrap();
        assert_eq!(summary.newly_processed, 0);
        assert_eq!(summary.total_processed, 3);
    }

    #[tokio::test]
    async fn failures_drop_record_and_continue() {
        let f = fixture();
        let completion = ScriptedCompletion::new([
            Err(ServiceError::Timeout(Duration::from_secs(60))),
            Ok("```json\nnot json at all\n```".to_string()),
            Ok(r#"{"patient_demographics": {}}"#.to_string()),
        ]);
        let mut ledger = f.store.ledger().unwrap();

        let outcome = pipeline(&f, &completion).process(&records(), &mut ledger).await.unwrap();
        assert_eq!(outcome.errors, 3);
        assert_eq!(outcome.processed, 0);
        assert!(ledger.is_empty());
        assert_eq!(f.store.count().unwrap(), 0);

        let summary = RunSummary::load(&f.summary).unwrap().unwrap();
        assert_eq!(summary.errors, 3);
    }

    #[tokio::test]
    async fn fenced_reply_is_accepted() {
        let f = fixture();
        let fenced = format!("```json\n{}\n```", extraction_reply("Carpal tunnel", "Release"));
        let completion = ScriptedCompletion::always(fenced);
        let mut ledger = CaseLedger::default();
        let outcome = pipeline(&f, &completion)
            .process(&records()[..1], &mut ledger)
            .await
            .unwrap();
        assert_eq!(outcome.processed, 1);
    }

    #[tokio::test]
    async fn limit_bounds_calls() {
        let f = fixture();
        let completion = ScriptedCompletion::always(extraction_reply("Stenosis", "Fusion"));
        let mut ledger = CaseLedger::default();
        let pipeline = pipeline(&f, &completion).with_limit(Some(2));

        let plan = pipeline.plan(&records(), &ledger);
        assert_eq!(plan.pending, 2);

        let outcome = pipeline.process(&records(), &mut ledger).await.unwrap();
        assert_eq!(completion.calls(), 2);
        assert_eq!(outcome.processed, 2);
    }

    #[tokio::test]
    async fn existing_file_counts_as_skipped() {
        let f = fixture();
        let completion = ScriptedCompletion::always(extraction_reply("Stenosis", "Fusion"));
        // Ledger loaded before another run wrote case_0000.
        let mut stale = CaseLedger::default();
        let mut fresh = CaseLedger::default();
        pipeline(&f, &completion)
            .process(&records()[..1], &mut fresh)
            .await
            .unwrap();

        let outcome = pipeline(&f, &completion)
            .process(&records()[..1], &mut stale)
            .await
            .unwrap();
        assert_eq!(outcome.skipped, 1);
        assert_eq!(outcome.errors, 0);
        assert!(stale.contains("case_0000"));
    }

    #[tokio::test]
    async fn plan_and_confirmation() {
        let f = fixture();
        let completion = ScriptedCompletion::always(extraction_reply("Stenosis", "Fusion"));
        let mut ledger: CaseLedger = ["case_0000".to_string()].into_iter().collect();
        let pipeline = pipeline(&f, &completion);

        let plan = pipeline.plan(&records(), &ledger);
        assert_eq!(
            plan,
            ExtractionPlan {
                eligible: 3,
                ineligible: 1,
                already_done: 1,
                pending: 2
            }
        );
        assert!(plan.estimated_hours() > 0.0);

        assert_eq!(pipeline.run(&records(), &mut ledger, &Decline).await.unwrap(), None);
        assert_eq!(completion.calls(), 0);
        assert!(!f.summary.exists());

        let outcome = pipeline.run(&records(), &mut ledger, &AutoConfirm).await.unwrap().unwrap();
        assert_eq!(outcome.processed, 2);
        assert_eq!(outcome.skipped, 1);

        // Nothing left: no prompt, no calls, and the summary reports zero new cases.
        let rerun = pipeline.run(&records(), &mut ledger, &Decline).await.unwrap();
        assert_eq!(
            rerun,
            Some(ExtractionOutcome {
                processed: 0,
                skipped: 3,
                errors: 0,
                ineligible: 1
            })
        );
        assert_eq!(completion.calls(), 2);
        let summary = RunSummary::load(&f.summary).unwrap().unwrap();
        assert_eq!(summary.newly_processed, 0);
        assert_eq!(summary.total_processed, 3);
    }
}
