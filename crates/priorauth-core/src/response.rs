//! Strict decoding of model responses.
//!
//! Completion models often wrap JSON in markdown code fences. Responses are unwrapped and
//! then decoded straight into a typed target; any shape mismatch is an error carrying an
//! excerpt of the raw text.

use serde::de::DeserializeOwned;
use thiserror::Error;

const EXCERPT_CHARS: usize = 200;

#[derive(Debug, Error)]
pub enum ResponseError {
    #[error("empty response")]
    Empty,

    #[error("malformed response: {source}\nraw: {excerpt}")]
    Malformed {
        #[source]
        source: serde_json::Error,
        excerpt: String,
    },
}

/// Remove a surrounding markdown code fence (with optional language tag) and whitespace.
pub fn strip_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(inner) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the language tag line (```json).
    let inner = match inner.find('\n') {
        Some(nl) if inner[..nl].chars().all(|c| c.is_ascii_alphanumeric()) => &inner[nl + 1..],
        _ => inner,
    };
    inner.strip_suffix("```").unwrap_or(inner).trim()
}

/// Unwrap and decode a model response into `T`.
pub fn decode_response<T: DeserializeOwned>(raw: &str) -> Result<T, ResponseError> {
    let body = strip_fences(raw);
    if body.is_empty() {
        return Err(ResponseError::Empty);
    }
    serde_json::from_str(body).map_err(|source| ResponseError::Malformed {
        source,
        excerpt: excerpt(raw),
    })
}

/// First characters of a raw payload, for diagnostics.
pub fn excerpt(raw: &str) -> String {
    let mut out: String = raw.chars().take(EXCERPT_CHARS).collect();
    if raw.chars().count() > EXCERPT_CHARS {
        out.push_str("...");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Probe {
        ok: bool,
    }

    #[test]
    fn strips_json_fence() {
        assert_eq!(strip_fences("```json\n{\"ok\": true}\n```"), "{\"ok\": true}");
        assert_eq!(strip_fences("  ```\n{}\n```  "), "{}");
    }

    #[test]
    fn unfenced_text_is_trimmed_only() {
        assert_eq!(strip_fences("  {\"ok\": true}\n"), "{\"ok\": true}");
    }

    #[test]
    fn single_line_fence() {
        assert_eq!(strip_fences("```{\"ok\": false}```"), "{\"ok\": false}");
    }

    #[test]
    fn decodes_fenced_payload() {
        let p: Probe = decode_response("```json\n{\"ok\": true}\n```").unwrap();
        assert_eq!(p, Probe { ok: true });
    }

    #[test]
    fn empty_payload_is_error() {
        assert!(matches!(
            decode_response::<Probe>("```json\n```"),
            Err(ResponseError::Empty)
        ));
    }

    #[test]
    fn malformed_payload_keeps_excerpt() {
        let raw = format!("Sure! Here is the JSON: {}", "x".repeat(500));
        let err = decode_response::<Probe>(&raw).unwrap_err();
        match err {
            ResponseError::Malformed { excerpt, .. } => {
                assert!(excerpt.starts_with("Sure! Here is"));
                assert!(excerpt.ends_with("..."));
                assert_eq!(excerpt.chars().count(), 203);
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
