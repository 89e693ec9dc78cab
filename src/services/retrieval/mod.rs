//! Segment retrieval.
//!
//! Three stages, each narrowing or reordering the previous one:
//! 1. [`lexical`]: top-K candidates from the inverted index, with
//!    relevance-feedback query expansion
//! 2. [`dense`]: cosine re-rank of all K candidates (reorders only)
//! 3. [`semantic`]: the language model keeps at most `max_selected` of the
//!    top-N re-ranked candidates

pub mod dense;
pub mod lexical;
pub mod semantic;

use tracing::{debug, instrument};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{Article, EvidenceRecord, Query, Segment};

use super::budget::RunBudget;
use super::structured::CallError;

pub use dense::DenseReranker;
pub use lexical::LexicalStage;
pub use semantic::{FilterOutcome, SemanticFilter};

/// Result of retrieving evidence for one query.
#[derive(Debug, Clone, PartialEq)]
pub struct Retrieval {
    /// All lexical candidates in re-ranked order.
    pub candidates: Vec<Segment>,
    /// Subset of `candidates` kept by the semantic filter.
    pub selected: Vec<Segment>,
    /// Why the filter kept what it kept.
    pub rationale: Option<String>,
}

impl Retrieval {
    /// Ledger record for `query`.
    pub fn into_record(self, query: Query) -> EvidenceRecord {
        EvidenceRecord::new(query, self.candidates, self.selected, self.rationale)
    }
}

/// Lexical, dense and semantic stages chained for one query.
pub struct SegmentRetriever {
    lexical: LexicalStage,
    dense: DenseReranker,
    filter: SemanticFilter,
    rerank_top_n: usize,
}

impl SegmentRetriever {
    /// Retriever passing the top `rerank_top_n` dense results to the filter.
    pub fn new(lexical: LexicalStage, dense: DenseReranker, filter: SemanticFilter, rerank_top_n: usize) -> Self {
        Self {
            lexical,
            dense,
            filter,
            rerank_top_n,
        }
    }

    /// Retrieve evidence for `query`. Segments of the article itself are
    /// excluded. No lexical candidates is an empty selection, not an error.
    #[instrument(skip_all, fields(query_id = %query.id))]
    pub async fn retrieve(
        &self,
        article: &Article,
        query: &Query,
        already_selected: &[Segment],
        budget: &RunBudget,
    ) -> DomainResult<Retrieval> {
        let candidates = self
            .lexical
            .candidates(&query.text, &article.id)
            .await
            .map_err(|err| DomainError::Retrieval(format!("lexical stage: {err}")))?;

        if candidates.is_empty() {
            debug!("no lexical candidates");
            return Ok(Retrieval {
                candidates,
                selected: Vec::new(),
                rationale: None,
            });
        }

        let candidates = self
            .dense
            .rerank(&query.text, candidates)
            .await
            .map_err(|err| DomainError::Retrieval(format!("dense stage: {err}")))?;

        let shortlist = &candidates[..candidates.len().min(self.rerank_top_n)];
        let outcome = self
            .filter
            .select(&article.context_json(), &query.text, shortlist, already_selected, budget)
            .await
            .map_err(|err| match err {
                CallError::Budget(reason) => DomainError::BudgetExceeded(reason.to_string()),
                CallError::Backend(err) => DomainError::Retrieval(format!("semantic filter: {err}")),
            })?;

        debug!(
            candidates = candidates.len(),
            shortlisted = shortlist.len(),
            selected = outcome.selected.len(),
            encoder = self.dense.provider_name(),
            "retrieval complete"
        );

        Ok(Retrieval {
            candidates,
            selected: outcome.selected,
            rationale: outcome.rationale,
        })
    }
}
