//! Evidence records and sufficiency decisions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::query::Query;
use super::segment::Segment;

/// Most segments a single retrieval may keep.
pub const MAX_SELECTED_PER_QUERY: usize = 3;

/// Outcome of retrieving evidence for one query.
///
/// `candidates` is the re-ranked lexical candidate list; `selected` is the
/// subset the semantic filter kept. A record is written once and never
/// revised.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceRecord {
    /// The query this record answers.
    pub query: Query,
    /// Lexical candidates in re-ranked order.
    pub candidates: Vec<Segment>,
    /// Segments kept by the semantic filter, at most
    /// [`MAX_SELECTED_PER_QUERY`].
    pub selected: Vec<Segment>,
    /// The filter's explanation of its choice.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selection_rationale: Option<String>,
    /// Set when retrieval failed for this query after retries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// When the record was created.
    pub recorded_at: DateTime<Utc>,
}

impl EvidenceRecord {
    /// Record of a completed retrieval.
    pub fn new(
        query: Query,
        candidates: Vec<Segment>,
        selected: Vec<Segment>,
        selection_rationale: Option<String>,
    ) -> Self {
        Self {
            query,
            candidates,
            selected,
            selection_rationale,
            error: None,
            recorded_at: Utc::now(),
        }
    }

    /// Empty record standing in for a query whose retrieval failed.
    pub fn failed(query: Query, error: impl Into<String>) -> Self {
        Self {
            query,
            candidates: Vec::new(),
            selected: Vec::new(),
            selection_rationale: None,
            error: Some(error.into()),
            recorded_at: Utc::now(),
        }
    }

    /// True when retrieval failed or was abandoned.
    pub fn is_flagged(&self) -> bool {
        self.error.is_some()
    }

    /// True when at least one segment was selected.
    pub fn has_evidence(&self) -> bool {
        !self.selected.is_empty()
    }

    /// Ids of the selected segments, in selection order.
    pub fn selected_ids(&self) -> impl Iterator<Item = &str> {
        self.selected.iter().map(|s| s.id.as_str())
    }
}

/// Per-iteration verdict of the information evaluator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SufficiencyDecision {
    /// Loop pass the decision closes.
    pub iteration: u32,
    /// True when the evidence suffices.
    pub verdict: bool,
    /// The evaluator's reasoning, fed back to the next generation step.
    pub justification: String,
    /// When the evaluator answered.
    pub decided_at: DateTime<Utc>,
}

impl SufficiencyDecision {
    /// Decision stamped with the current time.
    pub fn new(iteration: u32, verdict: bool, justification: impl Into<String>) -> Self {
        Self {
            iteration,
            verdict,
            justification: justification.into(),
            decided_at: Utc::now(),
        }
    }
}
