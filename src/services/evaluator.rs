//! Information evaluator: judges whether the cumulative evidence suffices.

use serde::Deserialize;
use tracing::info;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{Article, FrozenLedger, SufficiencyDecision};
use crate::domain::ports::{CompletionRequest, PromptTask};

use super::budget::RunBudget;
use super::prompts;
use super::structured::{CallError, StructuredCaller};

#[derive(Debug, Deserialize)]
struct Evaluation {
    #[serde(default)]
    evaluation_reasoning: String,
    has_sufficient_information: bool,
}

/// Judges whether the ledger is sufficient.
#[derive(Debug, Clone)]
pub struct InformationEvaluator {
    caller: StructuredCaller,
    temperature: f32,
}

impl InformationEvaluator {
    /// Evaluator sampling at `temperature`.
    pub fn new(caller: StructuredCaller, temperature: f32) -> Self {
        Self { caller, temperature }
    }

    /// Verdict over every record in `ledger`, not only the latest batch. The
    /// request is a pure function of the article and the snapshot.
    pub async fn evaluate(
        &self,
        article: &Article,
        ledger: &FrozenLedger,
        budget: &RunBudget,
    ) -> DomainResult<SufficiencyDecision> {
        let request = CompletionRequest {
            task: PromptTask::Sufficiency,
            system: prompts::sufficiency_system(),
            user: prompts::sufficiency_user(
                &article.context_json(),
                &prompts::render_evidence_for_evaluation(ledger),
            ),
            temperature: self.temperature,
        };

        let evaluation = self
            .caller
            .call(&request, budget, |reply: Evaluation| Ok(reply))
            .await
            .map_err(|err| match err {
                CallError::Budget(reason) => DomainError::BudgetExceeded(reason.to_string()),
                CallError::Backend(err) => DomainError::Evaluation(err.to_string()),
            })?;

        info!(
            article_id = %article.id,
            iteration = ledger.iteration(),
            records = ledger.len(),
            sufficient = evaluation.has_sufficient_information,
            "evaluated evidence"
        );

        Ok(SufficiencyDecision::new(
            ledger.iteration(),
            evaluation.has_sufficient_information,
            evaluation.evaluation_reasoning,
        ))
    }
}
