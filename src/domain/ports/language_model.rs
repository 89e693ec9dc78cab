//! Chat model port.
//!
//! The pipeline talks to its language model through one request shape. The
//! [`PromptTask`] tag names which call shape a request belongs to, so
//! adapters can route or meter by task and test doubles can script replies
//! per task.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::errors::BackendError;

/// The call shapes the pipeline issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptTask {
    /// Propose the next batch of search queries.
    QueryGeneration,
    /// Pick evidence from re-ranked candidates.
    SegmentSelection,
    /// Judge whether the ledger suffices.
    Sufficiency,
    /// Write investigative questions.
    Questions,
    /// Write the attributed report.
    Report,
    /// Shorten an over-long report.
    ReportShortening,
}

impl fmt::Display for PromptTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::QueryGeneration => "query_generation",
            Self::SegmentSelection => "segment_selection",
            Self::Sufficiency => "sufficiency",
            Self::Questions => "questions",
            Self::Report => "report",
            Self::ReportShortening => "report_shortening",
        };
        f.write_str(name)
    }
}

/// A single-turn chat request expecting a JSON object in reply.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    /// Call shape, for routing and logging.
    pub task: PromptTask,
    /// Instructions and output contract.
    pub system: String,
    /// Article, evidence and the question at hand.
    pub user: String,
    /// Sampling temperature.
    pub temperature: f32,
}

/// Raw model output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    /// Reply text, expected to hold a JSON object.
    pub content: String,
    /// Model that actually answered.
    pub model: String,
}

/// Chat completion backend.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Model identifier, for logs and traces.
    fn model_name(&self) -> &str;

    /// Send one request. Failures are classified for the retry policy.
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, BackendError>;
}
