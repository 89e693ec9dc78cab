//! Batch runner: many articles in parallel, one trace each.
//!
//! Article runs share nothing but the collaborators and the trace store.
//! Articles whose trace already exists are skipped, so an interrupted batch
//! can be resumed without rewriting completed traces.

use futures::stream::{self, StreamExt};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, warn};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{Article, TerminationReason};
use crate::domain::ports::TraceRepository;

use super::orchestrator::LoopOrchestrator;

/// What happened to one article of a batch.
#[derive(Debug, Clone, PartialEq)]
pub enum ArticleOutcome {
    /// The loop ran and its trace was stored.
    Completed {
        /// Article the outcome belongs to.
        article_id: String,
        /// Why the loop stopped.
        termination: TerminationReason,
        /// Loop passes made.
        iterations: u32,
        /// Evidence records in the frozen ledger.
        records: usize,
    },
    /// The article was unusable and no loop ran.
    Skipped {
        /// Article that was skipped.
        article_id: String,
    },
    /// The run finished but its trace could not be stored.
    PersistFailed {
        /// Article whose trace was lost.
        article_id: String,
        /// Storage failure message.
        error: String,
    },
}

impl ArticleOutcome {
    /// Article the outcome belongs to.
    pub fn article_id(&self) -> &str {
        match self {
            Self::Completed { article_id, .. }
            | Self::Skipped { article_id }
            | Self::PersistFailed { article_id, .. } => article_id,
        }
    }
}

/// Outcomes of a batch, in input order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchSummary {
    /// One entry per input article.
    pub outcomes: Vec<ArticleOutcome>,
}

impl BatchSummary {
    /// Articles whose loop ran, including incomplete ones.
    pub fn completed(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, ArticleOutcome::Completed { .. }))
            .count()
    }

    /// Completed runs that stopped before sufficiency.
    pub fn incomplete(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, ArticleOutcome::Completed { termination, .. } if termination.is_incomplete()))
            .count()
    }

    /// Articles rejected before the loop.
    pub fn skipped(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, ArticleOutcome::Skipped { .. }))
            .count()
    }

    /// Runs whose trace could not be stored.
    pub fn persist_failures(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, ArticleOutcome::PersistFailed { .. }))
            .count()
    }
}

/// Runs the loop over many articles and stores each trace.
pub struct BatchRunner {
    orchestrator: Arc<LoopOrchestrator>,
    traces: Arc<dyn TraceRepository>,
    max_parallel_articles: usize,
}

impl BatchRunner {
    /// Runner processing up to `max_parallel_articles` at once.
    pub fn new(
        orchestrator: Arc<LoopOrchestrator>,
        traces: Arc<dyn TraceRepository>,
        max_parallel_articles: usize,
    ) -> Self {
        Self {
            orchestrator,
            traces,
            max_parallel_articles: max_parallel_articles.max(1),
        }
    }

    /// Run every article and persist its trace. `on_done` is called as each
    /// article finishes, in completion order.
    pub async fn run_all<F>(&self, articles: Vec<Article>, on_done: F) -> DomainResult<BatchSummary>
    where
        F: Fn(&ArticleOutcome) + Sync,
    {
        let mut seen = HashSet::new();
        let mut queue = Vec::with_capacity(articles.len());
        let mut outcomes = Vec::new();

        for article in articles {
            if !seen.insert(article.id.clone()) {
                warn!(article_id = %article.id, "duplicate article id in input, skipping");
                continue;
            }
            if self.traces.contains(&article.id).await? {
                info!(article_id = %article.id, "trace already recorded, skipping");
                let outcome = ArticleOutcome::Skipped {
                    article_id: article.id,
                };
                on_done(&outcome);
                outcomes.push(outcome);
                continue;
            }
            queue.push(article);
        }

        info!(
            queued = queue.len(),
            skipped = outcomes.len(),
            parallelism = self.max_parallel_articles,
            "starting batch"
        );

        let on_done = &on_done;
        let finished: Vec<ArticleOutcome> = stream::iter(queue)
            .map(|article| async move {
                let outcome = self.run_one(&article).await;
                on_done(&outcome);
                outcome
            })
            .buffer_unordered(self.max_parallel_articles)
            .collect()
            .await;

        outcomes.extend(finished);
        Ok(BatchSummary { outcomes })
    }

    /// Run a single article and persist its trace.
    pub async fn run_one(&self, article: &Article) -> ArticleOutcome {
        let trace = self.orchestrator.run(article).await;
        let termination = trace.termination.clone();
        let iterations = trace.iterations;
        let records = trace.ledger.len();

        match self.traces.append(&trace).await {
            Ok(()) => ArticleOutcome::Completed {
                article_id: article.id.clone(),
                termination,
                iterations,
                records,
            },
            Err(DomainError::TraceAlreadyRecorded(id)) => {
                warn!(article_id = %id, "trace recorded concurrently, keeping the existing one");
                ArticleOutcome::Skipped { article_id: id }
            }
            Err(err) => {
                warn!(article_id = %article.id, error = %err, "failed to persist trace");
                ArticleOutcome::PersistFailed {
                    article_id: article.id.clone(),
                    error: err.to_string(),
                }
            }
        }
    }
}
