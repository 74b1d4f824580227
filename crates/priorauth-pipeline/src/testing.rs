//! Scripted service doubles and fixtures shared by the pipeline tests.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use priorauth_ai::vector::normalize;
use priorauth_ai::{
    Completion, CompletionRequest, CompletionService, EmbeddingService, ServiceError,
};
use priorauth_core::{Case, ExtractedCase, RawRecord};
use serde_json::json;

/// Completion service replaying a fixed script of replies, recording every request.
pub struct ScriptedCompletion {
    replies: Mutex<VecDeque<Result<String, ServiceError>>>,
    repeat: Option<String>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedCompletion {
    pub fn new(replies: impl IntoIterator<Item = Result<String, ServiceError>>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().collect()),
            repeat: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Answer every request with the same text.
    pub fn always(text: impl Into<String>) -> Self {
        Self {
            repeat: Some(text.into()),
            ..Self::new([])
        }
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompletionService for ScriptedCompletion {
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, ServiceError> {
        self.requests.lock().unwrap().push(request.clone());
        let next = self.replies.lock().unwrap().pop_front();
        match (next, &self.repeat) {
            (Some(reply), _) => reply.map(|text| Completion { text }),
            (None, Some(text)) => Ok(Completion { text: text.clone() }),
            (None, None) => Err(ServiceError::Backend("script exhausted".into())),
        }
    }
}

/// Concept axes: each dimension counts the occurrences of any of its words.
const AXES: &[&[&str]] = &[
    &["lumbar", "spine", "spinal", "back", "disc", "sciatica"],
    &["radiculopathy"],
    &["discectomy", "laminectomy", "fusion"],
    &["knee", "patellar"],
    &["meniscus", "meniscectomy"],
    &["arthroscopy"],
    &["ligament", "cruciate"],
    &["cardiac", "chest", "coronary"],
];

/// Bag-of-concepts embedder: one dimension per concept axis plus a constant bias
/// dimension, so texts sharing clinical terms land close together.
pub struct KeywordEmbedder {
    model_id: String,
    fail_on: Option<String>,
    calls: Mutex<usize>,
}

impl KeywordEmbedder {
    pub fn new() -> Self {
        Self {
            model_id: "keyword-test".into(),
            fail_on: None,
            calls: Mutex::new(0),
        }
    }

    pub fn with_model(model_id: &str) -> Self {
        Self {
            model_id: model_id.into(),
            ..Self::new()
        }
    }

    /// Fail with a timeout for any text containing `needle`.
    pub fn failing_on(needle: &str) -> Self {
        Self {
            fail_on: Some(needle.to_lowercase()),
            ..Self::new()
        }
    }

    pub fn calls(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl EmbeddingService for KeywordEmbedder {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn dim(&self) -> usize {
        AXES.len() + 1
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, ServiceError> {
        *self.calls.lock().unwrap() += 1;
        let lower = text.to_lowercase();
        if self.fail_on.as_deref().is_some_and(|n| lower.contains(n)) {
            return Err(ServiceError::Timeout(Duration::from_secs(60)));
        }
        let mut v: Vec<f32> = AXES
            .iter()
            .map(|words| words.iter().map(|w| lower.matches(w).count()).sum::<usize>() as f32)
            .collect();
        v.push(0.1);
        normalize(&mut v);
        Ok(v)
    }
}

/// Embedder that returns the zero vector for every text.
pub struct ZeroEmbedder {
    model_id: String,
    dim: usize,
}

impl ZeroEmbedder {
    pub fn new(dim: usize) -> Self {
        Self {
            model_id: "zero-test".into(),
            dim,
        }
    }

    pub fn with_model(mut self, model_id: &str) -> Self {
        self.model_id = model_id.into();
        self
    }
}

#[async_trait]
impl EmbeddingService for ZeroEmbedder {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn dim(&self) -> usize {
        self.dim
    }

    async fn embed(&self, _text: &str) -> Result<Vec<f32>, ServiceError> {
        Ok(vec![0.0; self.dim])
    }
}

/// A raw record with a generated narrative of at least `len` characters.
pub fn raw_record(index: usize, topic: &str, len: usize) -> RawRecord {
    let mut narrative = format!("HISTORY: {topic}.");
    while narrative.chars().count() < len {
        narrative.push_str(" Patient reports ongoing symptoms.");
    }
    RawRecord {
        index,
        narrative,
        specialty: "Orthopedic".into(),
        sample_name: format!("Sample {index}"),
        description: format!("{topic} note"),
    }
}

/// A well-formed extraction reply.
pub fn extraction_reply(diagnosis: &str, procedure: &str) -> String {
    json!({
        "patient_demographics": {"age": "54", "gender": "male", "chief_complaint": "pain"},
        "clinical_information": {
            "diagnosis": diagnosis,
            "symptoms": "pain with activity",
            "symptom_duration": "6 months",
            "physical_exam_findings": null
        },
        "diagnostic_tests": {"imaging": "MRI", "labs": null, "other_tests": null},
        "treatment": {
            "procedure_performed": procedure,
            "procedure_planned": null,
            "medications": "NSAIDs",
            "conservative_treatments": "physical therapy"
        },
        "clinical_assessment": {"severity": "moderate", "urgency": "elective", "prognosis": null}
    })
    .to_string()
}

/// A persisted-shape case with the given clinical fields.
pub fn case(index: usize, diagnosis: Option<&str>, procedure: Option<&str>, specialty: &str) -> Case {
    let extracted: ExtractedCase = serde_json::from_value(json!({
        "patient_demographics": {},
        "clinical_information": {"diagnosis": diagnosis},
        "diagnostic_tests": {},
        "treatment": {"procedure_performed": procedure},
        "clinical_assessment": {}
    }))
    .unwrap();
    let record = RawRecord {
        index,
        narrative: String::new(),
        specialty: specialty.into(),
        sample_name: String::new(),
        description: String::new(),
    };
    Case::from_extraction(extracted, &record, "2026-10-18T09:00:00+00:00".into())
}

/// A well-formed decision reply.
pub fn decision_reply(verdict: &str) -> String {
    json!({
        "decision": verdict,
        "confidence": "HIGH",
        "criteria_met": [
            {"criterion": "Conservative therapy for 6 weeks", "status": "MET", "evidence": "PT for 12 weeks"},
            {"criterion": "MRI confirmation", "status": "NOT_MET", "evidence": "no imaging on file"}
        ],
        "reasoning": "Findings are consistent with policy criteria.",
        "missing_documentation": [],
        "recommendation": "Proceed"
    })
    .to_string()
}
