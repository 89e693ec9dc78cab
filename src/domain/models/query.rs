//! Search queries issued during a run.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a query, unique within one article's run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QueryId(pub u32);

impl fmt::Display for QueryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "query_{}", self.0)
    }
}

/// Whether a query came from the first batch or a later one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    /// Issued on the first pass.
    Initial,
    /// Issued on a later pass, after seeing evidence.
    FollowUp,
}

impl Provenance {
    /// Provenance of queries produced on pass `iteration`.
    pub const fn for_iteration(iteration: u32) -> Self {
        if iteration <= 1 {
            Self::Initial
        } else {
            Self::FollowUp
        }
    }
}

/// A search query produced by the query generator. Never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Query {
    /// Unique within the run; assigned in issue order.
    pub id: QueryId,
    /// Search text sent to the lexical index.
    pub text: String,
    /// Why the generator considered this query worth issuing.
    pub rationale: String,
    /// Loop pass (1-based) that produced the query.
    pub iteration: u32,
    /// First pass or later.
    pub provenance: Provenance,
}
