//! Downstream outputs produced from a frozen ledger.

use serde::{Deserialize, Serialize};

/// A ranked question a reader should ask about the article.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvestigativeQuestion {
    /// 1 is most important.
    pub rank: usize,
    /// Question text.
    pub text: String,
    /// Why the question matters.
    pub rationale: String,
}

/// One sentence of the attributed report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportSentence {
    /// Sentence text.
    pub text: String,
    /// What the sentence is meant to convey.
    pub rationale: String,
    /// Ids of selected segments supporting the sentence.
    #[serde(default)]
    pub citations: Vec<String>,
}

/// Attributed report: ordered sentences, each with its citations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    /// Sentences in reading order.
    pub sentences: Vec<ReportSentence>,
}

impl Report {
    /// Words counted by whitespace split.
    pub fn word_count(&self) -> usize {
        self.sentences.iter().map(|s| s.text.split_whitespace().count()).sum()
    }

    /// Every citation, in sentence order, repeats included.
    pub fn citations(&self) -> impl Iterator<Item = &str> {
        self.sentences.iter().flat_map(|s| s.citations.iter().map(String::as_str))
    }
}
