//! Policy-grounded authorization decisions.
//!
//! A request moves through fixed stages: retrieve precedent cases, retrieve the governing
//! policy, synthesize with the completion service, validate the reply. A request either
//! yields a fully validated [`Decision`] or an error carrying the raw reply; nothing in
//! between.

use std::fmt;

use priorauth_ai::{CompletionRequest, CompletionService, OutputMode};
use priorauth_core::config::DecisionSettings;
use priorauth_core::response::excerpt;
use priorauth_core::schema::json::decision_schema;
use priorauth_core::{Decision, DecisionRequest, Policy, decode_response};
use priorauth_store::PolicyStore;
use tracing::{debug, info, warn};

use crate::{DecisionSynthesisError, Retriever, SimilarCase};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    RetrieveCases,
    RetrievePolicy,
    Synthesize,
    Validate,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::RetrieveCases => "retrieve_cases",
            Self::RetrievePolicy => "retrieve_policy",
            Self::Synthesize => "synthesize",
            Self::Validate => "validate",
        })
    }
}

/// A validated decision with the context it was grounded on.
#[derive(Debug, Clone)]
pub struct DecisionOutcome {
    pub decision: Decision,
    pub similar_cases: Vec<SimilarCase>,
    pub policy: Policy,
}

pub struct DecisionSynthesizer<'a> {
    retriever: &'a Retriever<'a>,
    policies: &'a PolicyStore,
    completion: &'a dyn CompletionService,
    settings: DecisionSettings,
}

impl<'a> DecisionSynthesizer<'a> {
    pub fn new(
        retriever: &'a Retriever<'a>,
        policies: &'a PolicyStore,
        completion: &'a dyn CompletionService,
        settings: DecisionSettings,
    ) -> Self {
        Self {
            retriever,
            policies,
            completion,
            settings,
        }
    }

    pub async fn decide(
        &self,
        request: &DecisionRequest,
    ) -> Result<DecisionOutcome, DecisionSynthesisError> {
        debug!(stage = %Stage::RetrieveCases, k = self.settings.top_k);
        let similar_cases = self
            .retriever
            .search(&request.narrative, self.settings.top_k)
            .await?;

        debug!(stage = %Stage::RetrievePolicy, procedure = %request.procedure);
        let policy = match self.policies.find(&request.procedure)? {
            Some(policy) => {
                info!(procedure = %request.procedure, policy = %policy.procedure_name, "matched policy");
                policy
            }
            None => {
                warn!(procedure = %request.procedure, "no policy matches procedure, using standard criteria");
                Policy::fallback()
            }
        };

        debug!(stage = %Stage::Synthesize);
        let prompt = decision_prompt(
            request,
            &policy.excerpt(self.settings.policy_excerpt),
            &serde_json::to_string_pretty(&similar_cases)?,
        );
        let completion = self
            .completion
            .complete(&CompletionRequest::new(
                prompt,
                OutputMode::Schema(decision_schema()),
                self.settings.timeout(),
            ))
            .await?;

        debug!(stage = %Stage::Validate, response_chars = completion.text.len());
        let decision: Decision = decode_response(&completion.text).map_err(|source| {
            DecisionSynthesisError::Malformed {
                source,
                excerpt: excerpt(&completion.text),
            }
        })?;

        info!(
            decision = %decision.decision,
            confidence = %decision.confidence,
            criteria_met = decision.met_count(),
            criteria = decision.criteria_met.len(),
            "decision synthesized"
        );
        Ok(DecisionOutcome {
            decision,
            similar_cases,
            policy,
        })
    }
}

fn decision_prompt(request: &DecisionRequest, policy: &str, similar_cases: &str) -> String {
    format!(
        "You are a prior authorization specialist. Review this case against the policy.

PATIENT CASE:
{narrative}

PROCEDURE: {procedure}

POLICY:
{policy}

SIMILAR APPROVED CASES:
{similar_cases}

Evaluate if criteria are met. Return ONLY valid JSON:

{{
    \"decision\": \"APPROVED or DENIED or ADDITIONAL_INFO_NEEDED\",
    \"confidence\": \"HIGH or MEDIUM or LOW\",
    \"criteria_met\": [
        {{\"criterion\": \"name\", \"status\": \"MET or NOT_MET\", \"evidence\": \"evidence from case\"}}
    ],
    \"reasoning\": \"detailed explanation\",
    \"missing_documentation\": [\"list items or empty\"],
    \"recommendation\": \"clinical recommendation\"
}}",
        narrative = request.narrative,
        procedure = request.procedure,
    )
}
