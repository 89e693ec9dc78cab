//! Text segments fetched from the lexical index.

use serde::{Deserialize, Serialize};

/// A passage of a source document, as returned by the lexical index and
/// scored by the dense re-ranker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    /// Segment identifier, e.g. `msmarco_v2.1_doc_04_420132660#3_1234`.
    pub id: String,
    /// Identifier of the document the segment was cut from.
    pub document_id: String,
    /// Title of the source document; may be empty.
    #[serde(default)]
    pub title: String,
    /// Source location; may be empty.
    #[serde(default)]
    pub url: String,
    /// Passage text.
    pub text: String,
    /// Score from the lexical (second, expanded) pass.
    pub lexical_score: f32,
    /// 1-based rank in the lexical candidate list.
    pub lexical_rank: usize,
    /// Cosine similarity to the query; `None` until the dense stage runs.
    #[serde(default)]
    pub dense_score: Option<f32>,
}

impl Segment {
    /// Text presented to the encoder and the semantic filter.
    pub fn passage(&self) -> String {
        if self.title.is_empty() {
            self.text.clone()
        } else {
            format!("{}\n\n{}", self.title, self.text)
        }
    }
}

/// Derive the source document id from a segment id (`doc#suffix` → `doc`).
pub fn document_id_of(segment_id: &str) -> &str {
    segment_id.split('#').next().unwrap_or(segment_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_id_of() {
        assert_eq!(document_id_of("msmarco_v2.1_doc_04_1#3_77"), "msmarco_v2.1_doc_04_1");
        assert_eq!(document_id_of("plain"), "plain");
    }
}
