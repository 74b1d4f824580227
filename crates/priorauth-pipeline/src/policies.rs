//! Drafting of the policy library: one coverage policy per catalogued procedure.

use priorauth_ai::{CompletionRequest, CompletionService, OutputMode};
use priorauth_core::config::PolicySettings;
use priorauth_core::{Policy, procedure_slug};
use priorauth_store::{PolicyStore, StoreError};
use tracing::{debug, info, warn};

use crate::Pacer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Procedure {
    pub name: &'static str,
    pub cpt_code: &'static str,
}

const fn procedure(name: &'static str, cpt_code: &'static str) -> Procedure {
    Procedure { name, cpt_code }
}

/// Procedures that commonly require prior authorization, with their CPT codes.
pub const CATALOGUE: &[Procedure] = &[
    // Spine
    procedure("Lumbar Discectomy", "63030"),
    procedure("Lumbar Fusion", "22612"),
    procedure("Cervical Discectomy", "63075"),
    procedure("Spinal Decompression", "63047"),
    // Knee
    procedure("Knee Arthroscopy", "29881"),
    procedure("Total Knee Replacement", "27447"),
    procedure("Partial Knee Replacement", "27446"),
    procedure("ACL Reconstruction", "29888"),
    // Hip
    procedure("Total Hip Replacement", "27130"),
    procedure("Hip Arthroscopy", "29914"),
    procedure("Hip Resurfacing", "27132"),
    // Shoulder
    procedure("Rotator Cuff Repair", "29827"),
    procedure("Shoulder Arthroscopy", "29806"),
    procedure("Shoulder Replacement", "23472"),
    // Hand
    procedure("Carpal Tunnel Release", "64721"),
    procedure("Trigger Finger Release", "26055"),
    // Cardiac
    procedure("Cardiac Catheterization", "93458"),
    procedure("Coronary Artery Bypass", "33533"),
    procedure("Pacemaker Insertion", "33206"),
    procedure("Angioplasty with Stent", "92928"),
    procedure("Echocardiogram", "93306"),
    procedure("Stress Test", "93015"),
    // Imaging
    procedure("MRI Brain", "70551"),
    procedure("MRI Spine Lumbar", "72148"),
    procedure("MRI Knee", "73721"),
    procedure("CT Scan Abdomen", "74177"),
    procedure("CT Scan Chest", "71250"),
    procedure("PET Scan", "78815"),
    // Gastrointestinal
    procedure("Colonoscopy", "45378"),
    procedure("Upper Endoscopy", "43235"),
    procedure("Hemorrhoid Banding", "46221"),
    // General surgery
    procedure("Hernia Repair Inguinal", "49505"),
    procedure("Gallbladder Removal", "47562"),
    procedure("Appendectomy", "44970"),
    procedure("Bariatric Surgery", "43644"),
    // Other
    procedure("Cataract Surgery", "66984"),
    procedure("Sleep Study", "95810"),
    procedure("Physical Therapy", "97110"),
    procedure("Epidural Steroid Injection", "62311"),
    procedure("Trigger Point Injections", "20552"),
    procedure("Varicose Vein Treatment", "37700"),
    procedure("Carotid Endarterectomy", "35301"),
    procedure("Prostate Biopsy", "55700"),
    procedure("Cystoscopy", "52000"),
    procedure("Septoplasty", "30520"),
    procedure("Tonsillectomy", "42825"),
    procedure("Facet Joint Injection", "64493"),
    procedure("Radiofrequency Ablation", "64635"),
    procedure("Hysterectomy", "58150"),
    procedure("Breast Biopsy", "19083"),
];

/// Counts for one generation run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GenerationOutcome {
    pub generated: usize,
    pub skipped: usize,
    pub errors: usize,
}

pub struct PolicyGenerator<'a> {
    completion: &'a dyn CompletionService,
    store: &'a PolicyStore,
    pacer: &'a dyn Pacer,
    settings: PolicySettings,
}

impl<'a> PolicyGenerator<'a> {
    pub fn new(
        completion: &'a dyn CompletionService,
        store: &'a PolicyStore,
        pacer: &'a dyn Pacer,
        settings: PolicySettings,
    ) -> Self {
        Self {
            completion,
            store,
            pacer,
            settings,
        }
    }

    /// Procedures from `catalogue` that have no policy file yet.
    pub fn pending<'c>(&self, catalogue: &'c [Procedure]) -> Result<Vec<&'c Procedure>, StoreError> {
        let existing = self.store.existing_slugs()?;
        Ok(catalogue
            .iter()
            .filter(|p| !existing.contains(&procedure_slug(p.name)))
            .collect())
    }

    /// Draft a policy for every catalogued procedure without one. Per-procedure failures
    /// are logged and counted.
    pub async fn generate(&self, catalogue: &[Procedure]) -> Result<GenerationOutcome, StoreError> {
        let pending = self.pending(catalogue)?;
        let mut outcome = GenerationOutcome {
            skipped: catalogue.len() - pending.len(),
            ..Default::default()
        };
        info!(pending = pending.len(), skipped = outcome.skipped, "generating policies");

        for procedure in pending {
            let request = CompletionRequest::new(
                policy_prompt(procedure),
                OutputMode::Freeform,
                self.settings.timeout(),
            );
            let result = self.completion.complete(&request).await;
            self.pacer.pause().await;

            let body = match result {
                Ok(completion) if !completion.text.trim().is_empty() => completion.text,
                Ok(_) => {
                    warn!(procedure = procedure.name, "empty policy draft");
                    outcome.errors += 1;
                    continue;
                }
                Err(e) => {
                    warn!(procedure = procedure.name, error = %e, "policy generation failed");
                    outcome.errors += 1;
                    continue;
                }
            };

            let policy = Policy::new(procedure.name, procedure.cpt_code, body.trim());
            match self.store.write(&policy) {
                Ok(path) => {
                    outcome.generated += 1;
                    debug!(procedure = procedure.name, path = %path.display(), "policy written");
                }
                Err(e) => {
                    warn!(procedure = procedure.name, error = %e, "failed to write policy");
                    outcome.errors += 1;
                }
            }
        }

        info!(
            generated = outcome.generated,
            skipped = outcome.skipped,
            errors = outcome.errors,
            "policy generation complete"
        );
        Ok(outcome)
    }
}

fn policy_prompt(procedure: &Procedure) -> String {
    format!(
        "Generate a detailed, realistic insurance prior authorization policy.

PROCEDURE: {name}
CPT CODE: {cpt}

Create a comprehensive policy document including:

1. PROCEDURE OVERVIEW
   - Procedure name and CPT code
   - Clinical description

2. COVERAGE CRITERIA (Must meet ALL)
   - Conservative treatment requirements (be specific: \"12 weeks of physical therapy\")
   - Symptom duration requirements (e.g., \"minimum 6 weeks\")
   - Clinical documentation required
   - Imaging requirements (type, recency)
   - Severity criteria (pain scales, functional assessments)

3. MEDICAL NECESSITY CRITERIA
   - Patient selection criteria
   - Failed prior treatments
   - Contraindications to conservative care

4. EXCLUSION CRITERIA
   - Active infections
   - Pregnancy (if applicable)
   - Severe comorbidities
   - Lack of conservative treatment
   - Cosmetic indications

5. DOCUMENTATION REQUIREMENTS
   - History and physical examination
   - Diagnostic test results
   - Treatment logs
   - Specialist consultations

6. AUTHORIZATION DETAILS
   - Valid for: 90 days
   - Requires peer-to-peer if denied

Make it detailed and realistic, with specific numbers and durations.",
        name = procedure.name,
        cpt = procedure.cpt_code,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::NoDelay;
    use crate::testing::ScriptedCompletion;
    use priorauth_ai::ServiceError;
    use std::collections::HashSet;
    use std::time::Duration;
    use tempfile::TempDir;

    #[test]
    fn catalogue_is_complete_and_unique() {
        assert_eq!(CATALOGUE.len(), 50);
        let slugs: HashSet<_> = CATALOGUE.iter().map(|p| procedure_slug(p.name)).collect();
        assert_eq!(slugs.len(), 50);
        assert!(CATALOGUE.iter().all(|p| p.cpt_code.len() == 5));
    }

    #[tokio::test]
    async fn generates_missing_and_skips_existing() {
        let tmp = TempDir::new().unwrap();
        let store = PolicyStore::open(tmp.path()).unwrap();
        store
            .write(&Policy::new("Lumbar Discectomy", "63030", "existing"))
            .unwrap();
        let completion = ScriptedCompletion::new([
            Ok("1. PROCEDURE OVERVIEW\nKnee scope.".to_string()),
            Err(ServiceError::Timeout(Duration::from_secs(120))),
            Ok("   ".to_string()),
        ]);
        let generator = PolicyGenerator::new(&completion, &store, &NoDelay, PolicySettings::default());
        let catalogue = [
            procedure("Lumbar Discectomy", "63030"),
            procedure("Knee Arthroscopy", "29881"),
            procedure("Hip Arthroscopy", "29914"),
            procedure("MRI Knee", "73721"),
        ];

        let outcome = generator.generate(&catalogue).await.unwrap();
        assert_eq!(
            outcome,
            GenerationOutcome {
                generated: 1,
                skipped: 1,
                errors: 2
            }
        );
        assert_eq!(completion.calls(), 3);

        let requests = completion.requests();
        assert!(requests[0].prompt.contains("PROCEDURE: Knee Arthroscopy\nCPT CODE: 29881"));
        assert!(requests.iter().all(|r| r.mode == OutputMode::Freeform));

        let knee = store.find("Knee Arthroscopy").unwrap().unwrap();
        assert_eq!(knee.cpt_code, "29881");
        assert_eq!(knee.body, "1. PROCEDURE OVERVIEW\nKnee scope.");
        assert_eq!(store.find("lumbar").unwrap().unwrap().body, "existing");

        // Failed procedures stay pending for the next run.
        let pending: Vec<_> = generator.pending(&catalogue).unwrap().iter().map(|p| p.name).collect();
        assert_eq!(pending, ["Hip Arthroscopy", "MRI Knee"]);
    }
}
