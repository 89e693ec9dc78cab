//! Lexical candidate generation with relevance-feedback query expansion.
//!
//! The first pass runs the plain query. The top `feedback_docs` hits are
//! treated as relevant; a term distribution estimated from them (each hit's
//! term frequencies weighted by its share of the feedback score mass) adds
//! `expansion_terms` new terms. The expanded query interpolates the original
//! term weights (`original_query_weight`) with the feedback distribution and
//! runs as the second pass.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use crate::domain::errors::BackendError;
use crate::domain::models::similarity::tokenize;
use crate::domain::models::{FeedbackConfig, Segment};
use crate::domain::ports::{LexicalHit, LexicalIndex, SearchRequest, WeightedTerm};
use crate::infrastructure::resilience::RetryPolicy;

const STOPWORDS: &[&str] = &[
    "an", "and", "are", "as", "at", "be", "but", "by", "for", "from", "has", "have", "he", "her",
    "his", "in", "is", "it", "its", "of", "on", "or", "she", "that", "the", "their", "they",
    "this", "to", "was", "were", "which", "who", "will", "with",
];

/// BM25 candidate stage with optional pseudo-relevance feedback.
pub struct LexicalStage {
    index: Arc<dyn LexicalIndex>,
    top_k: usize,
    feedback: FeedbackConfig,
    retry: RetryPolicy,
}

impl LexicalStage {
    /// Stage returning at most `top_k` candidates.
    pub fn new(index: Arc<dyn LexicalIndex>, top_k: usize, feedback: FeedbackConfig, retry: RetryPolicy) -> Self {
        Self {
            index,
            top_k,
            feedback,
            retry,
        }
    }

    /// Up to `top_k` candidates ordered by descending score, then document id
    /// and segment id ascending. Segments of `exclude_document` never appear.
    pub async fn candidates(&self, query: &str, exclude_document: &str) -> Result<Vec<Segment>, BackendError> {
        let initial = SearchRequest::from_text(query, self.top_k).excluding(exclude_document);
        if initial.terms.is_empty() {
            return Ok(Vec::new());
        }

        let mut hits = self.search(&initial).await?;

        if self.feedback.enabled && self.feedback.expansion_terms > 0 && !hits.is_empty() {
            let feedback_hits = &hits[..hits.len().min(self.feedback.feedback_docs.max(1))];
            let expanded = expand_query(&initial, feedback_hits, &self.feedback);
            debug!(
                original_terms = initial.terms.len(),
                expanded_terms = expanded.terms.len(),
                "running expanded lexical pass"
            );
            hits = self.search(&expanded).await?;
        }

        hits.retain(|h| h.document_id != exclude_document);
        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.document_id.cmp(&b.document_id))
                .then_with(|| a.segment_id.cmp(&b.segment_id))
        });
        hits.truncate(self.top_k);

        Ok(hits
            .into_iter()
            .enumerate()
            .map(|(rank, hit)| Segment {
                id: hit.segment_id,
                document_id: hit.document_id,
                title: hit.title,
                url: hit.url,
                text: hit.text,
                lexical_score: hit.score,
                lexical_rank: rank + 1,
                dense_score: None,
            })
            .collect())
    }

    async fn search(&self, request: &SearchRequest) -> Result<Vec<LexicalHit>, BackendError> {
        self.retry
            .execute("lexical_search", |_| self.index.search(request))
            .await
    }
}

/// Interpolate the original query with a relevance model estimated from the
/// feedback hits.
#[allow(clippy::cast_precision_loss)]
pub fn expand_query(original: &SearchRequest, feedback_hits: &[LexicalHit], config: &FeedbackConfig) -> SearchRequest {
    let score_mass: f32 = feedback_hits.iter().map(|h| h.score.max(0.0)).sum();
    let mut relevance: HashMap<String, f32> = HashMap::new();

    for hit in feedback_hits {
        let doc_weight = if score_mass > f32::EPSILON {
            hit.score.max(0.0) / score_mass
        } else {
            1.0 / feedback_hits.len() as f32
        };
        let terms = tokenize(&hit.text);
        if terms.is_empty() {
            continue;
        }
        let length = terms.len() as f32;
        let mut counts: HashMap<String, f32> = HashMap::new();
        for term in terms {
            *counts.entry(term).or_default() += 1.0;
        }
        for (term, count) in counts {
            *relevance.entry(term).or_default() += doc_weight * count / length;
        }
    }

    let mut expansion: Vec<(String, f32)> = relevance
        .into_iter()
        .filter(|(term, _)| !STOPWORDS.contains(&term.as_str()))
        .collect();
    expansion.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal).then_with(|| a.0.cmp(&b.0)));
    expansion.truncate(config.expansion_terms);

    let alpha = config.original_query_weight.clamp(0.0, 1.0);
    let original_mass: f32 = original.terms.iter().map(|t| t.weight).sum();
    let expansion_mass: f32 = expansion.iter().map(|(_, w)| w).sum();

    let mut weights: Vec<WeightedTerm> = Vec::new();
    let mut add = |term: &str, weight: f32| match weights.iter_mut().find(|w| w.term == term) {
        Some(existing) => existing.weight += weight,
        None => weights.push(WeightedTerm {
            term: term.to_string(),
            weight,
        }),
    };

    if original_mass > f32::EPSILON {
        for term in &original.terms {
            add(&term.term, alpha * term.weight / original_mass);
        }
    }
    if expansion_mass > f32::EPSILON && alpha < 1.0 {
        for (term, weight) in &expansion {
            add(term, (1.0 - alpha) * weight / expansion_mass);
        }
    }

    SearchRequest {
        terms: weights,
        top_k: original.top_k,
        exclude_documents: original.exclude_documents.clone(),
    }
}
