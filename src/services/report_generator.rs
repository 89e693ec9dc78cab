//! Attributed report generation from a frozen ledger.
//!
//! The first call drafts sentences with citations. Every citation must be a
//! segment selected somewhere in the ledger. Drafts over the word limit go
//! through shortening passes that rewrite sentence text only; sentence count
//! and citations are preserved by position.

use serde::Deserialize;
use std::collections::HashSet;
use tracing::{debug, warn};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    Article, FrozenLedger, InvestigativeQuestion, OutputConfig, Report, ReportSentence,
};
use crate::domain::ports::{CompletionRequest, PromptTask};

use super::budget::RunBudget;
use super::prompts;
use super::structured::{CallError, StructuredCaller};

#[derive(Debug, Deserialize)]
struct Draft {
    sentences: Vec<DraftSentence>,
}

#[derive(Debug, Deserialize)]
struct DraftSentence {
    #[serde(default)]
    rationale: String,
    sentence_text: String,
    #[serde(default)]
    citations: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct Shortened {
    sentences: Vec<String>,
}

/// Writes the cited trustworthiness report.
#[derive(Debug, Clone)]
pub struct ReportGenerator {
    caller: StructuredCaller,
    word_limit: usize,
    max_citations: usize,
    max_shorten_passes: u32,
    temperature: f32,
}

impl ReportGenerator {
    /// Generator bounded by the `output` limits.
    pub fn new(caller: StructuredCaller, output: &OutputConfig, temperature: f32) -> Self {
        Self {
            caller,
            word_limit: output.report_word_limit,
            max_citations: output.max_citations_per_sentence,
            max_shorten_passes: output.max_shorten_passes,
            temperature,
        }
    }

    /// Report over the frozen ledger and questions, shortened when over the word limit.
    pub async fn generate(
        &self,
        article: &Article,
        ledger: &FrozenLedger,
        questions: &[InvestigativeQuestion],
        budget: &RunBudget,
    ) -> DomainResult<Report> {
        let citable = ledger.selected_ids();
        let mut citable_sorted: Vec<&str> = citable.iter().copied().collect();
        citable_sorted.sort_unstable();

        let request = CompletionRequest {
            task: PromptTask::Report,
            system: prompts::report_system(self.word_limit, self.max_citations),
            user: prompts::report_user(
                &article.context_json(),
                &prompts::render_history(ledger),
                questions,
                &citable_sorted,
            ),
            temperature: self.temperature,
        };

        let mut report = self
            .caller
            .call(&request, budget, |draft: Draft| self.validate_draft(draft, &citable))
            .await
            .map_err(|err| match err {
                CallError::Budget(reason) => DomainError::BudgetExceeded(reason.to_string()),
                CallError::Backend(err) => DomainError::Generation(format!("report: {err}")),
            })?;

        let mut pass = 0;
        while report.word_count() > self.word_limit && pass < self.max_shorten_passes {
            pass += 1;
            debug!(pass, words = report.word_count(), limit = self.word_limit, "shortening report");
            match self.shorten(&report, budget).await {
                Ok(texts) => {
                    for (sentence, text) in report.sentences.iter_mut().zip(texts) {
                        sentence.text = text;
                    }
                }
                Err(err) => {
                    warn!(article_id = %article.id, error = %err, "report shortening failed, keeping longer draft");
                    break;
                }
            }
        }

        if report.word_count() > self.word_limit {
            warn!(
                article_id = %article.id,
                words = report.word_count(),
                limit = self.word_limit,
                "report still exceeds word limit"
            );
        }
        Ok(report)
    }

    async fn shorten(&self, report: &Report, budget: &RunBudget) -> Result<Vec<String>, CallError> {
        let texts: Vec<&str> = report.sentences.iter().map(|s| s.text.as_str()).collect();
        let expected = texts.len();
        let request = CompletionRequest {
            task: PromptTask::ReportShortening,
            system: prompts::shortening_system(self.word_limit),
            user: prompts::shortening_user(&texts, report.word_count()),
            temperature: self.temperature,
        };

        self.caller
            .call(&request, budget, |reply: Shortened| {
                if reply.sentences.len() == expected {
                    Ok(reply.sentences.into_iter().map(|s| s.trim().to_string()).collect())
                } else {
                    Err(format!(
                        "shortened report has {} sentences, expected {expected}",
                        reply.sentences.len()
                    ))
                }
            })
            .await
    }

    fn validate_draft(&self, draft: Draft, citable: &HashSet<&str>) -> Result<Report, String> {
        let mut sentences = Vec::with_capacity(draft.sentences.len());
        for (idx, sentence) in draft.sentences.into_iter().enumerate() {
            let text = sentence.sentence_text.trim().to_string();
            if text.is_empty() {
                return Err(format!("sentence {} is empty", idx + 1));
            }

            let mut citations: Vec<String> = Vec::with_capacity(sentence.citations.len());
            for citation in sentence.citations {
                if !citable.contains(citation.as_str()) {
                    return Err(format!("citation {citation} is not a selected segment"));
                }
                if !citations.contains(&citation) {
                    citations.push(citation);
                }
            }
            if citations.len() > self.max_citations {
                return Err(format!(
                    "sentence {} has {} citations, limit is {}",
                    idx + 1,
                    citations.len(),
                    self.max_citations
                ));
            }

            sentences.push(ReportSentence {
                text,
                rationale: sentence.rationale,
                citations,
            });
        }
        Ok(Report { sentences })
    }
}
