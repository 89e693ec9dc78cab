//! Implementation of the `credence run` command.

use anyhow::{bail, Result};
use clap::Args;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::cli::output::{create_progress_bar, create_spinner, output, CommandOutput};
use crate::cli::service;
use crate::services::{ArticleOutcome, BatchRunner, BatchSummary, LoopOrchestrator};

/// Arguments of `run`.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// JSONL file with one article per line
    pub articles: PathBuf,

    /// Segment corpus (overrides retrieval.corpus_path)
    #[arg(long)]
    pub corpus: Option<PathBuf>,

    /// Trace output path (overrides trace.path)
    #[arg(long)]
    pub traces: Option<PathBuf>,

    /// Upper bound on loop passes per article (overrides run.max_iterations)
    #[arg(long)]
    pub max_iterations: Option<u32>,

    /// Articles processed concurrently (overrides run.max_parallel_articles)
    #[arg(long)]
    pub parallel: Option<usize>,

    /// Only process the first N articles of the file
    #[arg(long)]
    pub limit: Option<usize>,

    /// Stop after the evidence loop; skip questions and report
    #[arg(long)]
    pub skip_outputs: bool,
}

/// Summary of a batch run.
#[derive(Debug, Serialize)]
pub struct RunOutput {
    /// Articles read.
    pub articles: usize,
    /// Articles whose loop ran.
    pub completed: usize,
    /// Runs stopped before sufficiency.
    pub incomplete: usize,
    /// Articles rejected before the loop.
    pub skipped: usize,
    /// Traces that could not be stored.
    pub persist_failures: usize,
    /// Where traces were written.
    pub trace_path: PathBuf,
    /// Per-article results.
    pub outcomes: Vec<OutcomeLine>,
}

/// One article's result.
#[derive(Debug, Serialize)]
pub struct OutcomeLine {
    /// Article id.
    pub article_id: String,
    /// Termination label, `skipped` or `persist_failed`.
    pub status: String,
    /// Loop passes, when the loop ran.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iterations: Option<u32>,
    /// Ledger size, when the loop ran.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub records: Option<usize>,
    /// Termination reason or storage error.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl From<&ArticleOutcome> for OutcomeLine {
    fn from(outcome: &ArticleOutcome) -> Self {
        match outcome {
            ArticleOutcome::Completed {
                article_id,
                termination,
                iterations,
                records,
            } => Self {
                article_id: article_id.clone(),
                status: termination.label().to_string(),
                iterations: Some(*iterations),
                records: Some(*records),
                detail: termination.detail().map(str::to_string),
            },
            ArticleOutcome::Skipped { article_id } => Self {
                article_id: article_id.clone(),
                status: "skipped".to_string(),
                iterations: None,
                records: None,
                detail: Some("trace already recorded".to_string()),
            },
            ArticleOutcome::PersistFailed { article_id, error } => Self {
                article_id: article_id.clone(),
                status: "persist_failed".to_string(),
                iterations: None,
                records: None,
                detail: Some(error.clone()),
            },
        }
    }
}

impl RunOutput {
    fn new(summary: &BatchSummary, trace_path: &Path) -> Self {
        Self {
            articles: summary.outcomes.len(),
            completed: summary.completed(),
            incomplete: summary.incomplete(),
            skipped: summary.skipped(),
            persist_failures: summary.persist_failures(),
            trace_path: trace_path.to_path_buf(),
            outcomes: summary.outcomes.iter().map(OutcomeLine::from).collect(),
        }
    }
}

impl CommandOutput for RunOutput {
    fn to_human(&self) -> String {
        let mut lines = vec![format!(
            "Processed {} article(s): {} completed ({} incomplete), {} skipped, {} not persisted",
            self.articles, self.completed, self.incomplete, self.skipped, self.persist_failures
        )];
        for outcome in &self.outcomes {
            let mut line = format!("  {} {}", console::style(&outcome.status).bold(), outcome.article_id);
            if let (Some(iterations), Some(records)) = (outcome.iterations, outcome.records) {
                line.push_str(&format!(" ({iterations} iteration(s), {records} record(s))"));
            }
            if let Some(detail) = &outcome.detail {
                line.push_str(&format!(": {detail}"));
            }
            lines.push(line);
        }
        lines.push(format!("Traces written to {}", self.trace_path.display()));
        lines.join("\n")
    }
}

/// Run the loop over an article file.
pub async fn execute(args: RunArgs, config_path: Option<&Path>, json_mode: bool) -> Result<()> {
    let mut config = service::load_config(config_path)?;
    if let Some(corpus) = args.corpus {
        config.retrieval.corpus_path = corpus;
    }
    if let Some(traces) = args.traces {
        config.trace.path = traces;
    }
    if let Some(max_iterations) = args.max_iterations {
        if max_iterations == 0 {
            bail!("--max-iterations must be at least 1");
        }
        config.run.max_iterations = max_iterations;
    }
    if let Some(parallel) = args.parallel {
        config.run.max_parallel_articles = parallel.max(1);
    }

    let mut articles = service::read_articles(&args.articles).await?;
    if let Some(limit) = args.limit {
        articles.truncate(limit);
    }

    let spinner = create_spinner("loading segment corpus", !json_mode);
    let index = service::load_index(&config).await?;
    spinner.finish_and_clear();

    let model = service::build_model(&config)?;
    let embedder = service::build_embedder(&config)?;
    let traces = service::open_trace_repository(&config).await?;

    let mut orchestrator = LoopOrchestrator::from_config(&config, model, index, embedder);
    if args.skip_outputs {
        orchestrator = orchestrator.without_outputs();
    }
    let runner = BatchRunner::new(Arc::new(orchestrator), traces, config.run.max_parallel_articles);

    let progress = create_progress_bar(articles.len() as u64, !json_mode);
    let summary = runner
        .run_all(articles, |outcome| {
            progress.set_message(outcome.article_id().to_string());
            progress.inc(1);
        })
        .await?;
    progress.finish_and_clear();

    output(&RunOutput::new(&summary, &config.trace.path), json_mode);
    Ok(())
}
