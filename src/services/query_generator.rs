//! Query generation.
//!
//! Produces the next batch of search queries from the article and a ledger
//! snapshot. Near-duplicates of queries already in the ledger (or earlier in
//! the same batch) are dropped here; the orchestrator never filters queries.

use serde::Deserialize;
use tracing::{debug, info};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::similarity::jaccard_similarity;
use crate::domain::models::{Article, FrozenLedger, Provenance, Query};
use crate::domain::ports::{CompletionRequest, PromptTask};

use super::budget::RunBudget;
use super::prompts;
use super::structured::{CallError, StructuredCaller};

#[derive(Debug, Deserialize)]
struct ProposedQueries {
    #[serde(default)]
    queries_with_rationale: Vec<ProposedQuery>,
}

#[derive(Debug, Deserialize)]
struct ProposedQuery {
    #[serde(default)]
    rationale: String,
    query: String,
}

/// Produces the next batch of search queries.
#[derive(Debug, Clone)]
pub struct QueryGenerator {
    caller: StructuredCaller,
    similarity_threshold: f32,
    temperature: f32,
}

impl QueryGenerator {
    /// Generator dropping queries at or above `similarity_threshold` to an earlier one.
    pub fn new(caller: StructuredCaller, similarity_threshold: f32, temperature: f32) -> Self {
        Self {
            caller,
            similarity_threshold,
            temperature,
        }
    }

    /// Produce up to `batch_size` new queries for the ledger's current
    /// iteration. An empty result means the model found no further angle.
    ///
    /// `feedback` is the latest evaluator justification, passed to follow-up
    /// batches.
    pub async fn generate(
        &self,
        article: &Article,
        ledger: &FrozenLedger,
        batch_size: usize,
        feedback: Option<&str>,
        budget: &RunBudget,
    ) -> DomainResult<Vec<Query>> {
        let iteration = ledger.iteration();
        let provenance = Provenance::for_iteration(iteration);
        let follow_up = !ledger.is_empty();
        let history = follow_up.then(|| prompts::render_history(ledger));

        let request = CompletionRequest {
            task: PromptTask::QueryGeneration,
            system: prompts::query_generation_system(batch_size, follow_up),
            user: prompts::query_generation_user(&article.context_json(), history.as_deref(), feedback),
            temperature: self.temperature,
        };

        let proposed: Vec<ProposedQuery> = self
            .caller
            .call(&request, budget, |reply: ProposedQueries| Ok(reply.queries_with_rationale))
            .await
            .map_err(|err| match err {
                CallError::Budget(reason) => DomainError::BudgetExceeded(reason.to_string()),
                CallError::Backend(err) => DomainError::Generation(err.to_string()),
            })?;

        let proposed_count = proposed.len();
        let mut accepted: Vec<(String, String)> = Vec::with_capacity(batch_size);
        for candidate in proposed {
            let text = candidate.query.trim();
            if text.is_empty() {
                continue;
            }
            if let Some(similar) = self.near_duplicate(text, ledger, &accepted) {
                debug!(query = text, similar_to = similar, "dropping near-duplicate query");
                continue;
            }
            accepted.push((text.to_string(), candidate.rationale));
            if accepted.len() == batch_size {
                break;
            }
        }

        let queries: Vec<Query> = accepted
            .into_iter()
            .enumerate()
            .map(|(offset, (text, rationale))| Query {
                id: ledger.next_query_id(offset),
                text,
                rationale,
                iteration,
                provenance,
            })
            .collect();

        info!(
            article_id = %article.id,
            iteration,
            proposed = proposed_count,
            accepted = queries.len(),
            "generated queries"
        );
        Ok(queries)
    }

    fn near_duplicate<'a>(
        &self,
        text: &str,
        ledger: &'a FrozenLedger,
        accepted: &'a [(String, String)],
    ) -> Option<&'a str> {
        ledger
            .queries()
            .map(|q| q.text.as_str())
            .chain(accepted.iter().map(|(t, _)| t.as_str()))
            .find(|existing| jaccard_similarity(text, existing) >= self.similarity_threshold)
    }
}
