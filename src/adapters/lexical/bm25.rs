//! In-memory BM25 index over a JSONL segment corpus.
//!
//! Each corpus line is one segment:
//! `{"docid": "doc_1#0_0", "title": "...", "url": "...", "segment": "..."}`.
//! `id`/`segment_id` and `text`/`contents` are accepted as aliases. Title and
//! text are indexed together.

use async_trait::async_trait;
use serde::Deserialize;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::io::BufRead;
use std::path::Path;
use tracing::info;

use crate::domain::errors::{BackendError, DomainError, DomainResult};
use crate::domain::models::similarity::tokenize;
use crate::domain::models::{document_id_of, Bm25Config};
use crate::domain::ports::{LexicalHit, LexicalIndex, SearchRequest};

/// A corpus entry.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CorpusSegment {
    /// Segment id, `doc#suffix`.
    #[serde(alias = "docid", alias = "segment_id")]
    pub id: String,
    /// Document title; indexed with the text.
    #[serde(default)]
    pub title: String,
    /// Source location.
    #[serde(default)]
    pub url: String,
    /// Passage text.
    #[serde(alias = "segment", alias = "contents")]
    pub text: String,
}

#[derive(Debug, Clone, Copy)]
struct Posting {
    segment: u32,
    term_frequency: u32,
}

/// In-memory inverted index scored with Okapi BM25.
#[derive(Debug)]
pub struct Bm25Index {
    segments: Vec<CorpusSegment>,
    document_ids: Vec<String>,
    lengths: Vec<u32>,
    postings: HashMap<String, Vec<Posting>>,
    average_length: f32,
    params: Bm25Config,
}

impl Bm25Index {
    /// Index `segments` in corpus order.
    pub fn build(segments: Vec<CorpusSegment>, params: Bm25Config) -> Self {
        let mut postings: HashMap<String, Vec<Posting>> = HashMap::new();
        let mut lengths = Vec::with_capacity(segments.len());
        let mut document_ids = Vec::with_capacity(segments.len());

        for (position, segment) in segments.iter().enumerate() {
            let tokens = tokenize(&format!("{} {}", segment.title, segment.text));
            lengths.push(u32::try_from(tokens.len()).unwrap_or(u32::MAX));
            document_ids.push(document_id_of(&segment.id).to_string());

            let mut counts: HashMap<String, u32> = HashMap::new();
            for token in tokens {
                *counts.entry(token).or_default() += 1;
            }
            let position = u32::try_from(position).unwrap_or(u32::MAX);
            for (term, term_frequency) in counts {
                postings.entry(term).or_default().push(Posting {
                    segment: position,
                    term_frequency,
                });
            }
        }

        let total: u64 = lengths.iter().map(|l| u64::from(*l)).sum();
        let average_length = if lengths.is_empty() {
            0.0
        } else {
            total as f32 / lengths.len() as f32
        };

        Self {
            segments,
            document_ids,
            lengths,
            postings,
            average_length,
            params,
        }
    }

    /// Parse a JSONL corpus. Blank lines are skipped.
    pub fn from_reader<R: BufRead>(reader: R, params: Bm25Config) -> DomainResult<Self> {
        let mut segments = Vec::new();
        for (number, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let segment: CorpusSegment = serde_json::from_str(&line).map_err(|e| {
                DomainError::ValidationFailed(format!("corpus line {}: {e}", number + 1))
            })?;
            segments.push(segment);
        }
        Ok(Self::build(segments, params))
    }

    /// Read and index the JSONL corpus at `path`.
    pub async fn load(path: &Path, params: Bm25Config) -> DomainResult<Self> {
        let raw = tokio::fs::read(path)
            .await
            .map_err(|e| DomainError::NotFound(format!("corpus {}: {e}", path.display())))?;
        let index = Self::from_reader(raw.as_slice(), params)?;
        info!(
            path = %path.display(),
            segments = index.len(),
            terms = index.postings.len(),
            "loaded lexical index"
        );
        Ok(index)
    }

    fn idf(&self, document_frequency: usize) -> f32 {
        let n = self.segments.len() as f32;
        let df = document_frequency as f32;
        (1.0 + (n - df + 0.5) / (df + 0.5)).ln()
    }

    /// Scored hits for `request`, best first, ties by segment id ascending.
    pub fn rank(&self, request: &SearchRequest) -> Vec<LexicalHit> {
        let Bm25Config { k1, b } = self.params;
        let mut scores: HashMap<u32, f32> = HashMap::new();

        for term in &request.terms {
            if term.weight <= 0.0 {
                continue;
            }
            let Some(postings) = self.postings.get(&term.term) else {
                continue;
            };
            let idf = self.idf(postings.len());
            for posting in postings {
                let length = self.lengths[posting.segment as usize] as f32;
                let norm = if self.average_length > 0.0 {
                    1.0 - b + b * length / self.average_length
                } else {
                    1.0
                };
                let tf = posting.term_frequency as f32;
                let contribution = idf * tf * (k1 + 1.0) / (tf + k1 * norm);
                *scores.entry(posting.segment).or_default() += term.weight * contribution;
            }
        }

        let mut ranked: Vec<(u32, f32)> = scores
            .into_iter()
            .filter(|(position, _)| {
                !request
                    .exclude_documents
                    .contains(&self.document_ids[*position as usize])
            })
            .collect();
        ranked.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(Ordering::Equal)
                .then_with(|| self.segments[a.0 as usize].id.cmp(&self.segments[b.0 as usize].id))
        });
        ranked.truncate(request.top_k);

        ranked
            .into_iter()
            .map(|(position, score)| {
                let segment = &self.segments[position as usize];
                LexicalHit {
                    segment_id: segment.id.clone(),
                    document_id: self.document_ids[position as usize].clone(),
                    title: segment.title.clone(),
                    url: segment.url.clone(),
                    text: segment.text.clone(),
                    score,
                }
            })
            .collect()
    }
}

#[async_trait]
impl LexicalIndex for Bm25Index {
    async fn search(&self, request: &SearchRequest) -> Result<Vec<LexicalHit>, BackendError> {
        Ok(self.rank(request))
    }

    fn len(&self) -> usize {
        self.segments.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CORPUS: &str = r#"{"docid": "doc_a#0_0", "title": "Vaccine study", "url": "http://a", "segment": "The vaccine trial enrolled thousands of volunteers."}
{"docid": "doc_a#1_90", "title": "Vaccine study", "url": "http://a", "segment": "Side effects were mild in most volunteers."}

{"id": "doc_b#0_0", "title": "Budget", "url": "http://b", "text": "The city council approved the annual budget."}
{"docid": "doc_c#0_0", "title": "Vaccine news", "url": "http://c", "segment": "Critics questioned the vaccine trial design."}
"#;

    fn index() -> Bm25Index {
        Bm25Index::from_reader(CORPUS.as_bytes(), Bm25Config::default()).unwrap()
    }

    #[test]
    fn test_loads_all_segments_and_aliases() {
        let index = index();
        assert_eq!(index.len(), 4);
        assert_eq!(index.segments[2].text, "The city council approved the annual budget.");
    }

    #[test]
    fn test_matching_segments_rank_first() {
        let hits = index().rank(&SearchRequest::from_text("vaccine trial", 10));
        let ids: Vec<&str> = hits.iter().map(|h| h.segment_id.as_str()).collect();
        assert_eq!(hits.len(), 3);
        assert!(!ids.contains(&"doc_b#0_0"));
        assert!(hits.windows(2).all(|w| w[0].score >= w[1].score));
    }

    #[test]
    fn test_excluded_document_never_returned() {
        let request = SearchRequest::from_text("vaccine trial", 10).excluding("doc_a");
        let hits = index().rank(&request);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].document_id, "doc_c");
    }

    #[test]
    fn test_unknown_terms_return_nothing() {
        assert!(index().rank(&SearchRequest::from_text("zeppelin", 10)).is_empty());
    }

    #[test]
    fn test_top_k_truncates() {
        assert_eq!(index().rank(&SearchRequest::from_text("vaccine", 1)).len(), 1);
    }

    #[test]
    fn test_malformed_line_reports_line_number() {
        let err = Bm25Index::from_reader("{\"docid\": \"x\", \"segment\": \"ok\"}\nnot json\n".as_bytes(), Bm25Config::default())
            .unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }
}
