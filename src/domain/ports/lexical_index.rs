//! Inverted-index search port.

use async_trait::async_trait;
use std::collections::HashSet;

use crate::domain::errors::BackendError;
use crate::domain::models::similarity::tokenize;

/// A query term with its weight in the (possibly expanded) query.
#[derive(Debug, Clone, PartialEq)]
pub struct WeightedTerm {
    /// Normalized token.
    pub term: String,
    /// Relative importance in the query.
    pub weight: f32,
}

/// One lexical search.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchRequest {
    /// Distinct terms with their weights.
    pub terms: Vec<WeightedTerm>,
    /// Most hits to return.
    pub top_k: usize,
    /// Source documents whose segments must not be returned.
    pub exclude_documents: HashSet<String>,
}

impl SearchRequest {
    /// Plain keyword query: each occurrence of a term adds weight 1.
    pub fn from_text(text: &str, top_k: usize) -> Self {
        let mut terms: Vec<WeightedTerm> = Vec::new();
        for token in tokenize(text) {
            match terms.iter_mut().find(|t| t.term == token) {
                Some(existing) => existing.weight += 1.0,
                None => terms.push(WeightedTerm {
                    term: token,
                    weight: 1.0,
                }),
            }
        }
        Self {
            terms,
            top_k,
            exclude_documents: HashSet::new(),
        }
    }

    /// Also drop hits from `document_id`.
    #[must_use]
    pub fn excluding(mut self, document_id: impl Into<String>) -> Self {
        self.exclude_documents.insert(document_id.into());
        self
    }
}

/// A scored segment returned by the index.
#[derive(Debug, Clone, PartialEq)]
pub struct LexicalHit {
    /// Segment identifier.
    pub segment_id: String,
    /// Source document of the segment.
    pub document_id: String,
    /// Source document title.
    pub title: String,
    /// Source location.
    pub url: String,
    /// Passage text.
    pub text: String,
    /// Retrieval score; higher is better.
    pub score: f32,
}

/// Ranked keyword search over the segment corpus.
#[async_trait]
pub trait LexicalIndex: Send + Sync {
    /// Ranked hits, best first; ties broken by segment id ascending.
    async fn search(&self, request: &SearchRequest) -> Result<Vec<LexicalHit>, BackendError>;

    /// Number of indexed segments.
    fn len(&self) -> usize;

    /// True when nothing is indexed.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
