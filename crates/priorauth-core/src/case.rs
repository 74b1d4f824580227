//! Clinical case records: the raw narrative input, the structured case extracted from it,
//! and the metadata row that accompanies each case vector in the index.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Canonical texts shorter than this are too thin to embed.
pub const MIN_CANONICAL_LEN: usize = 20;

/// One row of the source dataset. Read-only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRecord {
    /// Zero-based data row position in the source file.
    pub index: usize,
    pub narrative: String,
    pub specialty: String,
    pub sample_name: String,
    pub description: String,
}

impl RawRecord {
    /// Stable case identifier derived from the row position (`case_0042`).
    pub fn case_id(&self) -> String {
        format!("case_{:04}", self.index)
    }

    /// Narrative length in characters, surrounding whitespace included.
    pub fn narrative_len(&self) -> usize {
        self.narrative.chars().count()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Demographics {
    #[serde(default, deserialize_with = "text")]
    pub age: Option<String>,
    #[serde(default, deserialize_with = "text")]
    pub gender: Option<String>,
    #[serde(default, deserialize_with = "text")]
    pub chief_complaint: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClinicalInformation {
    #[serde(default, deserialize_with = "text")]
    pub diagnosis: Option<String>,
    #[serde(default, deserialize_with = "text")]
    pub symptoms: Option<String>,
    #[serde(rename = "symptom_duration", default, deserialize_with = "text")]
    pub duration: Option<String>,
    #[serde(rename = "physical_exam_findings", default, deserialize_with = "text")]
    pub findings: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticTests {
    #[serde(default, deserialize_with = "text")]
    pub imaging: Option<String>,
    #[serde(default, deserialize_with = "text")]
    pub labs: Option<String>,
    #[serde(default, deserialize_with = "text")]
    pub other_tests: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Treatment {
    #[serde(default, deserialize_with = "text")]
    pub procedure_performed: Option<String>,
    #[serde(default, deserialize_with = "text")]
    pub procedure_planned: Option<String>,
    #[serde(default, deserialize_with = "text")]
    pub medications: Option<String>,
    #[serde(default, deserialize_with = "text")]
    pub conservative_treatments: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClinicalAssessment {
    #[serde(default, deserialize_with = "text")]
    pub severity: Option<String>,
    #[serde(default, deserialize_with = "text")]
    pub urgency: Option<String>,
    #[serde(default, deserialize_with = "text")]
    pub prognosis: Option<String>,
}

/// The structured payload a completion model returns for one narrative.
///
/// All five sections are required; a response missing any of them is rejected.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ExtractedCase {
    pub patient_demographics: Demographics,
    pub clinical_information: ClinicalInformation,
    pub diagnostic_tests: DiagnosticTests,
    pub treatment: Treatment,
    pub clinical_assessment: ClinicalAssessment,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseMeta {
    pub case_id: String,
    #[serde(rename = "original_specialty")]
    pub specialty: String,
    /// RFC 3339 timestamp of extraction.
    #[serde(rename = "processing_timestamp")]
    pub timestamp: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OriginalData {
    pub index: usize,
    pub specialty: String,
    pub sample_name: String,
    pub description: String,
}

/// A persisted, write-once clinical case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Case {
    pub case_id: String,
    #[serde(rename = "patient_demographics")]
    pub demographics: Demographics,
    pub clinical_information: ClinicalInformation,
    pub diagnostic_tests: DiagnosticTests,
    pub treatment: Treatment,
    pub clinical_assessment: ClinicalAssessment,
    pub meta: CaseMeta,
    pub original_data: OriginalData,
}

impl Case {
    /// Merge an extracted payload with the metadata of the record it came from.
    pub fn from_extraction(extracted: ExtractedCase, record: &RawRecord, timestamp: String) -> Self {
        let case_id = record.case_id();
        Self {
            case_id: case_id.clone(),
            demographics: extracted.patient_demographics,
            clinical_information: extracted.clinical_information,
            diagnostic_tests: extracted.diagnostic_tests,
            treatment: extracted.treatment,
            clinical_assessment: extracted.clinical_assessment,
            meta: CaseMeta {
                case_id,
                specialty: record.specialty.clone(),
                timestamp,
            },
            original_data: OriginalData {
                index: record.index,
                specialty: record.specialty.clone(),
                sample_name: record.sample_name.clone(),
                description: record.description.clone(),
            },
        }
    }

    /// Procedure performed, or the planned one when nothing was performed.
    pub fn procedure(&self) -> Option<&str> {
        self.treatment
            .procedure_performed
            .as_deref()
            .or(self.treatment.procedure_planned.as_deref())
    }
}

/// Build the deterministic text projection of a case that gets embedded.
///
/// Present fields are emitted in a fixed order, each with a label, joined by single spaces.
pub fn canonical_text(case: &Case) -> String {
    let clin = &case.clinical_information;
    let treat = &case.treatment;
    let fields: [(&str, Option<&str>); 6] = [
        ("Diagnosis", clin.diagnosis.as_deref()),
        ("Symptoms", clin.symptoms.as_deref()),
        ("Findings", clin.findings.as_deref()),
        ("Procedure", treat.procedure_performed.as_deref()),
        ("Planned", treat.procedure_planned.as_deref()),
        ("Specialty", Some(case.meta.specialty.as_str())),
    ];

    fields
        .iter()
        .filter_map(|(label, value)| {
            value
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(|v| format!("{label}: {v}"))
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Metadata for one indexed case. Position `i` in the metadata list describes vector `i`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbeddingRecord {
    pub case_id: String,
    pub diagnosis: Option<String>,
    pub procedure: Option<String>,
    pub specialty: Option<String>,
    #[serde(rename = "filename")]
    pub source_filename: String,
}

impl EmbeddingRecord {
    pub fn for_case(case: &Case, source_filename: impl Into<String>) -> Self {
        let specialty = Some(case.meta.specialty.trim())
            .filter(|s| !s.is_empty())
            .map(str::to_string);
        Self {
            case_id: case.case_id.clone(),
            diagnosis: case.clinical_information.diagnosis.clone(),
            procedure: case.procedure().map(str::to_string),
            specialty,
            source_filename: source_filename.into(),
        }
    }
}

/// Accept a free-text leaf in whatever scalar shape a model produced it.
///
/// Strings are trimmed, with `""` and `"null"` read as absent. Numbers and booleans are
/// rendered as text, arrays of scalars are joined with `", "`. Objects are rejected.
fn text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    match value {
        None => Ok(None),
        Some(v) => scalar_text(&v).map_err(D::Error::custom),
    }
}

fn scalar_text(value: &Value) -> Result<Option<String>, String> {
    match value {
        Value::Null => Ok(None),
        Value::String(s) => {
            let s = s.trim();
            if s.is_empty() || s.eq_ignore_ascii_case("null") {
                Ok(None)
            } else {
                Ok(Some(s.to_string()))
            }
        }
        Value::Number(n) => Ok(Some(n.to_string())),
        Value::Bool(b) => Ok(Some(b.to_string())),
        Value::Array(items) => {
            let mut parts = Vec::with_capacity(items.len());
            for item in items {
                if item.is_array() {
                    return Err("expected text, found nested array".into());
                }
                if let Some(part) = scalar_text(item)? {
                    parts.push(part);
                }
            }
            Ok(if parts.is_empty() {
                None
            } else {
                Some(parts.join(", "))
            })
        }
        Value::Object(_) => Err("expected text, found object".into()),
    }
}
