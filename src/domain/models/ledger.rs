//! Evidence ledger: the append-only state of one article's run.
//!
//! The ledger is owned by exactly one run. It only grows: records are
//! appended at batch barriers and never revised. Readers other than the
//! orchestrator get a [`FrozenLedger`], either as a snapshot copy (for the
//! evaluator and the query generator) or as the final frozen ledger handed to
//! the output stages.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use super::evidence::EvidenceRecord;
use super::query::{Query, QueryId};
use super::segment::Segment;
use crate::domain::errors::{DomainError, DomainResult};

/// Mutable, append-only evidence log for one article.
#[derive(Debug, Clone)]
pub struct Ledger {
    article_id: String,
    records: Vec<EvidenceRecord>,
    iteration: u32,
}

/// Result of merging one batch into the ledger.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AppendOutcome {
    /// Records merged.
    pub appended: usize,
    /// Selections dropped because an earlier query already selected the same segment.
    pub suppressed_selections: usize,
}

impl Ledger {
    /// Empty ledger before the first pass.
    pub fn new(article_id: impl Into<String>) -> Self {
        Self {
            article_id: article_id.into(),
            records: Vec::new(),
            iteration: 0,
        }
    }

    /// Passes started so far.
    pub fn iteration(&self) -> u32 {
        self.iteration
    }

    /// Records so far.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// True before any record is merged.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records in merge order.
    pub fn records(&self) -> &[EvidenceRecord] {
        &self.records
    }

    /// Start the next loop pass. Only the orchestrator calls this.
    pub(crate) fn begin_iteration(&mut self) -> u32 {
        self.iteration += 1;
        self.iteration
    }

    /// Merge a completed batch of records.
    ///
    /// Records are ordered by query id. Query ids must be new to the run. A
    /// segment may be selected by at most one query per run: when two
    /// retrievals of the same batch picked the same segment, the later query
    /// loses it. Nothing is appended if validation fails.
    pub fn append_batch(&mut self, mut batch: Vec<EvidenceRecord>) -> DomainResult<AppendOutcome> {
        batch.sort_by_key(|r| r.query.id);

        let mut seen_queries: HashSet<QueryId> = self.records.iter().map(|r| r.query.id).collect();
        for record in &batch {
            if !seen_queries.insert(record.query.id) {
                return Err(DomainError::InvariantViolation(format!(
                    "{} already recorded for article {}",
                    record.query.id, self.article_id
                )));
            }
            let candidate_ids: HashSet<&str> = record.candidates.iter().map(|c| c.id.as_str()).collect();
            if let Some(stray) = record.selected_ids().find(|id| !candidate_ids.contains(id)) {
                return Err(DomainError::InvariantViolation(format!(
                    "{} selects segment {stray} that is not among its candidates",
                    record.query.id
                )));
            }
        }

        let mut selected: HashSet<String> = self
            .records
            .iter()
            .flat_map(|r| r.selected_ids().map(str::to_string))
            .collect();
        let mut outcome = AppendOutcome::default();

        for mut record in batch {
            let before = record.selected.len();
            record.selected.retain(|s| selected.insert(s.id.clone()));
            outcome.suppressed_selections += before - record.selected.len();
            outcome.appended += 1;
            self.records.push(record);
        }

        Ok(outcome)
    }

    /// Read-only copy of the current state.
    pub fn snapshot(&self) -> FrozenLedger {
        FrozenLedger {
            article_id: self.article_id.clone(),
            iteration: self.iteration,
            records: self.records.clone(),
        }
    }

    /// Consume the ledger; no further writes are possible.
    pub fn freeze(self) -> FrozenLedger {
        FrozenLedger {
            article_id: self.article_id,
            iteration: self.iteration,
            records: self.records,
        }
    }
}

/// Immutable view of a ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrozenLedger {
    article_id: String,
    iteration: u32,
    records: Vec<EvidenceRecord>,
}

impl FrozenLedger {
    /// Passes started when the ledger was frozen.
    pub fn iteration(&self) -> u32 {
        self.iteration
    }

    /// Records in merge order.
    pub fn records(&self) -> &[EvidenceRecord] {
        &self.records
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// True when no query was ever retrieved.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Every issued query, in merge order.
    pub fn queries(&self) -> impl Iterator<Item = &Query> {
        self.records.iter().map(|r| &r.query)
    }

    /// Every selected segment; no id repeats.
    pub fn selected_segments(&self) -> impl Iterator<Item = &Segment> {
        self.records.iter().flat_map(|r| r.selected.iter())
    }

    /// Ids of [`Self::selected_segments`].
    pub fn selected_ids(&self) -> HashSet<&str> {
        self.selected_segments().map(|s| s.id.as_str()).collect()
    }

    /// Id for the `offset`-th (0-based) query of the next batch.
    pub fn next_query_id(&self, offset: usize) -> QueryId {
        let issued = self.queries().map(|q| q.id.0).max().unwrap_or(0);
        let offset = u32::try_from(offset).unwrap_or(u32::MAX);
        QueryId(issued.saturating_add(1).saturating_add(offset))
    }
}
