//! Investigative question generation from a frozen ledger.

use serde::Deserialize;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{Article, FrozenLedger, InvestigativeQuestion, OutputConfig};
use crate::domain::ports::{CompletionRequest, PromptTask};

use super::budget::RunBudget;
use super::prompts;
use super::structured::{CallError, StructuredCaller};

#[derive(Debug, Deserialize)]
struct Questions {
    questions: Vec<ProposedQuestion>,
}

#[derive(Debug, Deserialize)]
struct ProposedQuestion {
    #[serde(default)]
    rationale: String,
    question_text: String,
}

/// Writes investigative questions from the frozen ledger.
#[derive(Debug, Clone)]
pub struct QuestionGenerator {
    caller: StructuredCaller,
    count: usize,
    max_chars: usize,
    temperature: f32,
}

impl QuestionGenerator {
    /// Generator bounded by the `output` limits.
    pub fn new(caller: StructuredCaller, output: &OutputConfig, temperature: f32) -> Self {
        Self {
            caller,
            count: output.question_count,
            max_chars: output.question_max_chars,
            temperature,
        }
    }

    /// Exactly `question_count` ranked questions, each within the length
    /// limit. Anything else is a malformed reply and is retried.
    pub async fn generate(
        &self,
        article: &Article,
        ledger: &FrozenLedger,
        budget: &RunBudget,
    ) -> DomainResult<Vec<InvestigativeQuestion>> {
        let request = CompletionRequest {
            task: PromptTask::Questions,
            system: prompts::questions_system(self.count, self.max_chars),
            user: prompts::questions_user(&article.context_json(), &prompts::render_history(ledger)),
            temperature: self.temperature,
        };

        self.caller
            .call(&request, budget, |reply: Questions| self.validate(reply))
            .await
            .map_err(|err| match err {
                CallError::Budget(reason) => DomainError::BudgetExceeded(reason.to_string()),
                CallError::Backend(err) => DomainError::Generation(format!("questions: {err}")),
            })
    }

    fn validate(&self, reply: Questions) -> Result<Vec<InvestigativeQuestion>, String> {
        if reply.questions.len() != self.count {
            return Err(format!(
                "expected {} questions, got {}",
                self.count,
                reply.questions.len()
            ));
        }

        reply
            .questions
            .into_iter()
            .enumerate()
            .map(|(idx, q)| {
                let text = q.question_text.trim().to_string();
                let length = text.chars().count();
                if text.is_empty() {
                    Err(format!("question {} is empty", idx + 1))
                } else if length > self.max_chars {
                    Err(format!(
                        "question {} has {length} characters, limit is {}",
                        idx + 1,
                        self.max_chars
                    ))
                } else {
                    Ok(InvestigativeQuestion {
                        rank: idx + 1,
                        text,
                        rationale: q.rationale,
                    })
                }
            })
            .collect()
    }
}
