//! Trace store port.

use async_trait::async_trait;

use crate::domain::errors::DomainResult;
use crate::domain::models::RunTrace;

/// Append-only store of run traces, keyed by article id.
#[async_trait]
pub trait TraceRepository: Send + Sync {
    /// Persist a finished run. Fails with `TraceAlreadyRecorded` if the article
    /// already has a trace; existing traces are never rewritten.
    async fn append(&self, trace: &RunTrace) -> DomainResult<()>;

    /// The trace recorded for `article_id`, if any.
    async fn get(&self, article_id: &str) -> DomainResult<Option<RunTrace>>;

    /// Whether `article_id` already has a trace.
    async fn contains(&self, article_id: &str) -> DomainResult<bool>;

    /// Article ids in insertion order.
    async fn list_article_ids(&self) -> DomainResult<Vec<String>>;
}
