//! Implementation of the `credence inspect` command.

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;
use std::path::Path;

use crate::cli::output::{output, CommandOutput, TableFormatter};
use crate::cli::service;
use crate::domain::models::RunTrace;

/// Arguments of `inspect`.
#[derive(Args, Debug)]
pub struct InspectArgs {
    /// Article to show in detail; lists every recorded trace when omitted
    pub article_id: Option<String>,
}

/// Every stored trace.
#[derive(Debug, Serialize)]
pub struct TraceListOutput {
    /// Traces in storage order.
    pub traces: Vec<RunTrace>,
}

impl CommandOutput for TraceListOutput {
    fn to_human(&self) -> String {
        if self.traces.is_empty() {
            return "No traces recorded.".to_string();
        }
        TableFormatter::new().format_traces(&self.traces)
    }

    // full traces are too large for a listing
    fn to_json(&self) -> serde_json::Value {
        let rows: Vec<serde_json::Value> = self
            .traces
            .iter()
            .map(|t| {
                serde_json::json!({
                    "article_id": t.article_id,
                    "run_id": t.run_id,
                    "termination": t.termination,
                    "incomplete": t.incomplete,
                    "iterations": t.iterations,
                    "records": t.ledger.len(),
                    "final_verdict": t.final_verdict(),
                })
            })
            .collect();
        serde_json::json!({ "traces": rows })
    }
}

/// One article's trace.
#[derive(Debug, Serialize)]
pub struct TraceDetailOutput {
    /// The stored trace.
    pub trace: RunTrace,
}

impl CommandOutput for TraceDetailOutput {
    fn to_human(&self) -> String {
        let trace = &self.trace;
        let formatter = TableFormatter::new();
        let mut sections = vec![format!(
            "Article {}\nRun {}\nTermination: {}{}\nIterations: {}",
            trace.article_id,
            trace.run_id,
            trace.termination.label(),
            trace
                .termination
                .detail()
                .map(|d| format!(" ({d})"))
                .unwrap_or_default(),
            trace.iterations,
        )];

        sections.push(format!("Evidence ledger:\n{}", formatter.format_ledger(&trace.ledger)));

        if !trace.decisions.is_empty() {
            let decisions: Vec<String> = trace
                .decisions
                .iter()
                .map(|d| {
                    let verdict = if d.verdict { "sufficient" } else { "insufficient" };
                    format!("  [{}] {verdict}: {}", d.iteration, d.justification)
                })
                .collect();
            sections.push(format!("Sufficiency decisions:\n{}", decisions.join("\n")));
        }

        if !trace.questions.is_empty() {
            sections.push(format!("Questions:\n{}", formatter.format_questions(&trace.questions)));
        }

        if let Some(report) = &trace.report {
            let sentences: Vec<String> = report
                .sentences
                .iter()
                .map(|s| {
                    if s.citations.is_empty() {
                        s.text.clone()
                    } else {
                        format!("{} [{}]", s.text, s.citations.join(", "))
                    }
                })
                .collect();
            sections.push(format!("Report ({} words):\n{}", report.word_count(), sentences.join("\n")));
        }

        if !trace.output_errors.is_empty() {
            sections.push(format!("Output errors:\n  {}", trace.output_errors.join("\n  ")));
        }

        sections.join("\n\n")
    }
}

/// Show stored traces.
pub async fn execute(args: InspectArgs, config_path: Option<&Path>, json_mode: bool) -> Result<()> {
    let config = service::load_config(config_path)?;
    let traces = service::open_trace_repository(&config).await?;

    match args.article_id {
        Some(article_id) => {
            let trace = traces
                .get(&article_id)
                .await?
                .with_context(|| format!("No trace recorded for article {article_id}"))?;
            output(&TraceDetailOutput { trace }, json_mode);
        }
        None => {
            let mut loaded = Vec::new();
            for article_id in traces.list_article_ids().await? {
                if let Some(trace) = traces.get(&article_id).await? {
                    loaded.push(trace);
                }
            }
            output(&TraceListOutput { traces: loaded }, json_mode);
        }
    }
    Ok(())
}
