//! Coverage policies keyed by procedure.
//!
//! A policy file is plain text with a fixed header followed by free-form sections:
//!
//! ```text
//! PRIOR AUTHORIZATION POLICY
//! ======================================================================
//!
//! Procedure: Lumbar Discectomy
//! CPT Code: 63030
//!
//! ======================================================================
//!
//! 1. PROCEDURE OVERVIEW
//! ...
//! ```

use thiserror::Error;

const TITLE: &str = "PRIOR AUTHORIZATION POLICY";
const PROCEDURE_PREFIX: &str = "Procedure:";
const CPT_PREFIX: &str = "CPT Code:";

/// Body of the policy substituted when no stored policy matches a request.
pub const FALLBACK_POLICY_TEXT: &str = "Standard prior authorization criteria apply.";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PolicyError {
    #[error("policy header missing `{0}` line")]
    MissingHeader(&'static str),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Policy {
    pub procedure_name: String,
    pub cpt_code: String,
    pub body: String,
}

impl Policy {
    pub fn new(
        procedure_name: impl Into<String>,
        cpt_code: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            procedure_name: procedure_name.into(),
            cpt_code: cpt_code.into(),
            body: body.into(),
        }
    }

    /// The "standard criteria" policy used when lookup misses.
    pub fn fallback() -> Self {
        Self::new("Standard Criteria", "", FALLBACK_POLICY_TEXT)
    }

    pub fn is_fallback(&self) -> bool {
        self.cpt_code.is_empty() && self.body == FALLBACK_POLICY_TEXT
    }

    /// File name under the policy directory, e.g. `lumbar_discectomy_policy.txt`.
    pub fn file_name(&self) -> String {
        format!("{}_policy.txt", procedure_slug(&self.procedure_name))
    }

    /// Render the full file contents (header + body).
    pub fn render(&self) -> String {
        let rule = rule();
        format!(
            "{TITLE}\n{rule}\n\n{PROCEDURE_PREFIX} {}\n{CPT_PREFIX} {}\n\n{rule}\n\n{}",
            self.procedure_name, self.cpt_code, self.body
        )
    }

    /// Parse a rendered policy file.
    pub fn parse(text: &str) -> Result<Self, PolicyError> {
        let mut procedure = None;
        let mut cpt = None;
        let mut rules_seen = 0;
        let mut body_start = text.len();
        let mut offset = 0;

        for line in text.split_inclusive('\n') {
            let trimmed = line.trim();
            offset += line.len();
            if is_rule(trimmed) {
                rules_seen += 1;
                if rules_seen == 2 {
                    body_start = offset;
                    break;
                }
            } else if let Some(rest) = trimmed.strip_prefix(PROCEDURE_PREFIX) {
                procedure.get_or_insert_with(|| rest.trim().to_string());
            } else if let Some(rest) = trimmed.strip_prefix(CPT_PREFIX) {
                cpt.get_or_insert_with(|| rest.trim().to_string());
            }
        }

        let procedure_name = procedure.ok_or(PolicyError::MissingHeader(PROCEDURE_PREFIX))?;
        let cpt_code = cpt.ok_or(PolicyError::MissingHeader(CPT_PREFIX))?;
        let body = text[body_start..].trim_start_matches(['\n', '\r']).to_string();

        Ok(Self {
            procedure_name,
            cpt_code,
            body,
        })
    }

    /// Recover a policy from a headerless file by naming it after its slug
    /// (`lumbar_discectomy` -> `Lumbar Discectomy`).
    pub fn from_slug(slug: &str, body: impl Into<String>) -> Self {
        let name = slug
            .split('_')
            .filter(|w| !w.is_empty())
            .map(title_case)
            .collect::<Vec<_>>()
            .join(" ");
        Self::new(name, "", body)
    }

    /// The first `max_chars` characters of the rendered policy.
    pub fn excerpt(&self, max_chars: usize) -> String {
        if self.is_fallback() {
            return self.body.clone();
        }
        self.render().chars().take(max_chars).collect()
    }
}

/// Normalise a procedure name into the slug used for policy file names.
///
/// Lowercases and replaces spaces and `/` with `_`: "Angioplasty with Stent" becomes
/// "angioplasty_with_stent".
pub fn procedure_slug(name: &str) -> String {
    name.trim()
        .to_lowercase()
        .chars()
        .map(|c| if c == ' ' || c == '/' { '_' } else { c })
        .collect()
}

/// Select the policy governing `requested`.
///
/// Candidates are policies whose CPT code equals the request, or whose name contains it
/// case-insensitively. Among candidates: CPT match first, then exact name match, then the
/// shortest name, then alphabetical order.
pub fn select<'a>(policies: &'a [Policy], requested: &str) -> Option<&'a Policy> {
    let wanted = requested.trim().to_lowercase();
    if wanted.is_empty() {
        return None;
    }

    policies
        .iter()
        .filter_map(|p| {
            let name = p.procedure_name.to_lowercase();
            let cpt_match = !p.cpt_code.is_empty() && p.cpt_code.eq_ignore_ascii_case(&wanted);
            if cpt_match || name.contains(&wanted) {
                let rank = (!cpt_match, name != wanted, name.chars().count());
                Some((rank, name, p))
            } else {
                None
            }
        })
        .min_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)))
        .map(|(_, _, p)| p)
}

fn rule() -> String {
    "=".repeat(70)
}

fn is_rule(line: &str) -> bool {
    line.len() >= 10 && line.chars().all(|c| c == '=')
}

fn title_case(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
