//! The three pipeline stages and their supporting batch jobs.
//!
//! - [`ExtractionPipeline`]: raw narratives to persisted [`Case`](priorauth_core::Case)s, resumably.
//! - [`Indexer`]: persisted cases to a published index snapshot.
//! - [`Retriever`]: nearest-precedent search over the published snapshot.
//! - [`DecisionSynthesizer`]: request + precedents + policy to a validated decision.
//! - [`PolicyGenerator`]: drafts the policy library for the procedure catalogue.

mod confirm;
mod decision;
mod error;
mod extract;
mod indexer;
mod pacing;
mod policies;
mod retrieval;
mod status;
#[cfg(test)]
mod testing;

pub use confirm::{AutoConfirm, Confirm, Decline};
pub use decision::{DecisionOutcome, DecisionSynthesizer, Stage};
pub use error::{DecisionSynthesisError, ExtractionError, IndexError, RetrievalError};
pub use extract::{ExtractionOutcome, ExtractionPipeline, ExtractionPlan};
pub use indexer::{IndexOutcome, Indexer};
pub use pacing::{FixedDelay, NoDelay, Pacer};
pub use policies::{CATALOGUE, GenerationOutcome, PolicyGenerator, Procedure};
pub use retrieval::{Retriever, SimilarCase};
pub use status::{StatusReport, status};
