//! Semantic filter: the language model picks the evidence worth keeping
//! from the top re-ranked candidates.

use serde::Deserialize;
use std::collections::HashSet;
use tracing::debug;

use crate::domain::models::similarity::jaccard_similarity;
use crate::domain::models::{DuplicatePolicy, Segment, MAX_SELECTED_PER_QUERY};
use crate::domain::ports::{CompletionRequest, PromptTask};
use crate::services::budget::RunBudget;
use crate::services::prompts;
use crate::services::structured::{CallError, StructuredCaller};

#[derive(Debug, Deserialize)]
struct Selection {
    #[serde(default)]
    segment_ids: Vec<String>,
    #[serde(default)]
    rationale: Option<String>,
}

/// Segments kept by the filter.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterOutcome {
    /// Kept segments in the order the model ranked them.
    pub selected: Vec<Segment>,
    /// The model's explanation of its choice, if it gave one.
    pub rationale: Option<String>,
}

/// Third retrieval stage.
pub struct SemanticFilter {
    caller: StructuredCaller,
    max_selected: usize,
    duplicate_policy: DuplicatePolicy,
    temperature: f32,
}

impl SemanticFilter {
    /// `max_selected` is capped at [`MAX_SELECTED_PER_QUERY`].
    pub fn new(
        caller: StructuredCaller,
        max_selected: usize,
        duplicate_policy: DuplicatePolicy,
        temperature: f32,
    ) -> Self {
        Self {
            caller,
            max_selected: max_selected.min(MAX_SELECTED_PER_QUERY),
            duplicate_policy,
            temperature,
        }
    }

    /// Ask the model to choose among `shortlist`. Ids outside the shortlist
    /// make the reply malformed. At most `max_selected` segments survive, and
    /// none that the duplicate policy matches against `already_selected`.
    pub async fn select(
        &self,
        article_context: &str,
        query: &str,
        shortlist: &[Segment],
        already_selected: &[Segment],
        budget: &RunBudget,
    ) -> Result<FilterOutcome, CallError> {
        if shortlist.is_empty() {
            return Ok(FilterOutcome {
                selected: Vec::new(),
                rationale: None,
            });
        }

        let request = CompletionRequest {
            task: PromptTask::SegmentSelection,
            system: prompts::selection_system(shortlist.len(), self.max_selected),
            user: prompts::selection_user(article_context, query, shortlist, already_selected),
            temperature: self.temperature,
        };

        let offered: HashSet<&str> = shortlist.iter().map(|s| s.id.as_str()).collect();
        let selection = self
            .caller
            .call(&request, budget, |reply: Selection| {
                match reply.segment_ids.iter().find(|id| !offered.contains(id.as_str())) {
                    Some(stray) => Err(format!("selected id {stray} was not among the candidates")),
                    None => Ok(reply),
                }
            })
            .await?;

        let mut selected: Vec<Segment> = Vec::new();
        for id in &selection.segment_ids {
            if selected.len() >= self.max_selected {
                debug!(extra = id.as_str(), "selection exceeds limit, dropping");
                break;
            }
            let Some(segment) = shortlist.iter().find(|s| &s.id == id) else {
                continue;
            };
            if selected.iter().any(|s| s.id == segment.id) {
                continue;
            }
            if self.is_duplicate(segment, already_selected.iter().chain(selected.iter())) {
                debug!(segment_id = segment.id.as_str(), "suppressing repeat evidence");
                continue;
            }
            selected.push(segment.clone());
        }

        Ok(FilterOutcome {
            selected,
            rationale: selection.rationale,
        })
    }

    fn is_duplicate<'a>(&self, segment: &Segment, mut earlier: impl Iterator<Item = &'a Segment>) -> bool {
        match self.duplicate_policy {
            DuplicatePolicy::ExactId => earlier.any(|s| s.id == segment.id),
            DuplicatePolicy::TextOverlap { threshold } => {
                earlier.any(|s| s.id == segment.id || jaccard_similarity(&s.text, &segment.text) >= threshold)
            }
        }
    }
}
