pub mod case;
pub mod config;
pub mod decision;
pub mod policy;
pub mod response;
pub mod schema;

pub use case::{Case, EmbeddingRecord, ExtractedCase, MIN_CANONICAL_LEN, RawRecord, canonical_text};
pub use config::{ConfigError, Settings};
pub use decision::{Confidence, Criterion, CriterionStatus, Decision, DecisionRequest, Verdict};
pub use policy::{Policy, PolicyError, procedure_slug};
pub use response::{ResponseError, decode_response, strip_fences};
