/// Arrow schema for the persisted embedding matrix.
pub mod matrix {
    use arrow::datatypes::{DataType, Field, Schema};
    use std::sync::Arc;

    /// One row per indexed case: its id and its `dim`-wide float32 vector.
    pub fn embedding_matrix_schema(dim: i32) -> Schema {
        Schema::new(vec![
            Field::new("case_id", DataType::Utf8, false),
            Field::new(
                "embedding",
                DataType::FixedSizeList(Arc::new(Field::new("item", DataType::Float32, true)), dim),
                false,
            ),
        ])
    }
}

/// JSON schemas handed to the completion service for structured output.
pub mod json {
    use serde_json::{Value, json};

    fn text() -> Value {
        json!({ "type": ["string", "null"] })
    }

    fn section(fields: &[&str]) -> Value {
        let properties: serde_json::Map<String, Value> =
            fields.iter().map(|f| (f.to_string(), text())).collect();
        json!({
            "type": "object",
            "properties": properties,
            "required": fields,
        })
    }

    /// Target shape of a case extraction.
    pub fn extraction_schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "patient_demographics": section(&["age", "gender", "chief_complaint"]),
                "clinical_information": section(&[
                    "diagnosis",
                    "symptoms",
                    "symptom_duration",
                    "physical_exam_findings",
                ]),
                "diagnostic_tests": section(&["imaging", "labs", "other_tests"]),
                "treatment": section(&[
                    "procedure_performed",
                    "procedure_planned",
                    "medications",
                    "conservative_treatments",
                ]),
                "clinical_assessment": section(&["severity", "urgency", "prognosis"]),
            },
            "required": [
                "patient_demographics",
                "clinical_information",
                "diagnostic_tests",
                "treatment",
                "clinical_assessment",
            ],
        })
    }

    /// Target shape of an authorization decision.
    pub fn decision_schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "decision": { "type": "string", "enum": ["APPROVED", "DENIED", "ADDITIONAL_INFO_NEEDED"] },
                "confidence": { "type": "string", "enum": ["HIGH", "MEDIUM", "LOW"] },
                "criteria_met": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "criterion": { "type": "string" },
                            "status": { "type": "string", "enum": ["MET", "NOT_MET"] },
                            "evidence": { "type": "string" },
                        },
                        "required": ["criterion", "status", "evidence"],
                    },
                },
                "reasoning": { "type": "string" },
                "missing_documentation": { "type": "array", "items": { "type": "string" } },
                "recommendation": { "type": "string" },
            },
            "required": ["decision", "confidence", "criteria_met", "reasoning"],
        })
    }
}
