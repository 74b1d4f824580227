//! Authorization requests and the validated verdicts synthesized for them.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A new prior-authorization request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionRequest {
    pub narrative: String,
    pub procedure: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verdict {
    Approved,
    Denied,
    AdditionalInfoNeeded,
}

impl Verdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Approved => "APPROVED",
            Self::Denied => "DENIED",
            Self::AdditionalInfoNeeded => "ADDITIONAL_INFO_NEEDED",
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

impl Confidence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "HIGH",
            Self::Medium => "MEDIUM",
            Self::Low => "LOW",
        }
    }
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CriterionStatus {
    Met,
    NotMet,
}

impl CriterionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Met => "MET",
            Self::NotMet => "NOT_MET",
        }
    }
}

/// One policy criterion as evaluated against the request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Criterion {
    pub criterion: String,
    pub status: CriterionStatus,
    #[serde(default)]
    pub evidence: String,
}

/// A structured authorization verdict.
///
/// `decision`, `confidence`, `criteria_met` and `reasoning` are required when decoding;
/// the remaining fields default to empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    pub decision: Verdict,
    pub confidence: Confidence,
    pub criteria_met: Vec<Criterion>,
    pub reasoning: String,
    #[serde(default)]
    pub missing_documentation: Vec<String>,
    #[serde(default)]
    pub recommendation: String,
}

impl Decision {
    /// Number of criteria evaluated as met.
    pub fn met_count(&self) -> usize {
        self.criteria_met
            .iter()
            .filter(|c| c.status == CriterionStatus::Met)
            .count()
    }
}
