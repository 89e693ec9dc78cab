//! Loop orchestrator.
//!
//! Drives one article through
//! `Init → Generating → Retrieving → Evaluating → (Generating | Done) → Output`.
//! The orchestrator is the only writer of the ledger and its iteration
//! counter, and the only component that decides when the loop stops.
//!
//! Retrievals of one batch run concurrently, each producing its own record;
//! records are merged into the ledger only once the whole batch is back. The
//! evaluator and the next generation step read detached snapshots.

use chrono::Utc;
use futures::stream::{self, StreamExt};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    Article, Config, EvidenceRecord, FrozenLedger, InvestigativeQuestion, Ledger, Query, Report,
    RunPhase, RunTrace, Segment, SufficiencyDecision, TerminationReason,
};
use crate::domain::ports::{EmbeddingProvider, LanguageModel, LexicalIndex};
use crate::infrastructure::resilience::{RequestThrottle, RetryPolicy};

use super::budget::RunBudget;
use super::evaluator::InformationEvaluator;
use super::query_generator::QueryGenerator;
use super::question_generator::QuestionGenerator;
use super::report_generator::ReportGenerator;
use super::retrieval::{DenseReranker, LexicalStage, SegmentRetriever, SemanticFilter};
use super::structured::StructuredCaller;

/// Loop bounds and budgets.
#[derive(Debug, Clone)]
pub struct RunSettings {
    /// Upper bound on loop passes.
    pub max_iterations: u32,
    /// Queries asked for on the first pass.
    pub initial_batch_size: usize,
    /// Queries asked for on later passes.
    pub follow_up_batch_size: usize,
    /// Retrievals in flight at once.
    pub max_parallel_retrievals: usize,
    /// Per-article time limit.
    pub wall_clock_budget: Option<Duration>,
    /// Per-article limit on model and encoder calls.
    pub max_backend_calls: Option<u32>,
    /// Skip question and report generation.
    pub skip_outputs: bool,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl RunSettings {
    /// Settings from the `run` section.
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_iterations: config.run.max_iterations,
            initial_batch_size: config.run.initial_batch_size,
            follow_up_batch_size: config.run.follow_up_batch_size,
            max_parallel_retrievals: config.run.max_parallel_retrievals,
            wall_clock_budget: config.run.wall_clock_budget_secs.map(Duration::from_secs),
            max_backend_calls: config.run.max_backend_calls,
            skip_outputs: false,
        }
    }
}

/// Mutable state of one run. Owned by a single `run` call.
struct RunState {
    phase: RunPhase,
    ledger: Ledger,
    decisions: Vec<SufficiencyDecision>,
}

impl RunState {
    fn advance(&mut self, next: RunPhase) {
        if !self.phase.can_transition_to(next) {
            error!(from = %self.phase, to = %next, "invalid run phase transition");
        }
        info!(from = %self.phase, to = %next, iteration = self.ledger.iteration(), "phase transition");
        self.phase = next;
    }
}

/// Drives one article through the evidence loop.
pub struct LoopOrchestrator {
    generator: QueryGenerator,
    retriever: SegmentRetriever,
    evaluator: InformationEvaluator,
    questions: QuestionGenerator,
    reports: ReportGenerator,
    settings: RunSettings,
}

impl LoopOrchestrator {
    /// Orchestrator over already built stages.
    pub fn new(
        generator: QueryGenerator,
        retriever: SegmentRetriever,
        evaluator: InformationEvaluator,
        questions: QuestionGenerator,
        reports: ReportGenerator,
        settings: RunSettings,
    ) -> Self {
        Self {
            generator,
            retriever,
            evaluator,
            questions,
            reports,
            settings,
        }
    }

    /// Wire every stage from configuration and the three collaborators.
    pub fn from_config(
        config: &Config,
        model: Arc<dyn LanguageModel>,
        index: Arc<dyn LexicalIndex>,
        embedder: Arc<dyn EmbeddingProvider>,
    ) -> Self {
        let retry = RetryPolicy::from_config(&config.retry);
        let llm = &config.llm;
        let caller = StructuredCaller::new(model, retry.clone(), RequestThrottle::from_config(&config.rate_limit))
            .with_retry_input_limit(llm.retry_input_max_chars);

        let retriever = SegmentRetriever::new(
            LexicalStage::new(
                index,
                config.retrieval.lexical_top_k,
                config.retrieval.feedback.clone(),
                retry.clone(),
            ),
            DenseReranker::new(embedder, retry),
            SemanticFilter::new(
                caller.clone(),
                config.retrieval.max_selected,
                config.retrieval.duplicate_policy,
                llm.judgement_temperature,
            ),
            config.retrieval.rerank_top_n,
        );

        Self::new(
            QueryGenerator::new(
                caller.clone(),
                config.run.query_similarity_threshold,
                llm.generation_temperature,
            ),
            retriever,
            InformationEvaluator::new(caller.clone(), llm.judgement_temperature),
            QuestionGenerator::new(caller.clone(), &config.output, llm.generation_temperature),
            ReportGenerator::new(caller, &config.output, llm.generation_temperature),
            RunSettings::from_config(config),
        )
    }

    /// Stop each run after the evidence loop.
    #[must_use]
    pub fn without_outputs(mut self) -> Self {
        self.settings.skip_outputs = true;
        self
    }

    /// Run one article to completion. Never fails: backend failures end the
    /// run early and are recorded on the returned trace.
    pub async fn run(&self, article: &Article) -> RunTrace {
        let run_id = Uuid::new_v4();
        let span = info_span!("article_run", article_id = %article.id, %run_id);
        self.run_inner(article, run_id).instrument(span).await
    }

    async fn run_inner(&self, article: &Article, run_id: Uuid) -> RunTrace {
        let started_at = Utc::now();
        let clock = Instant::now();
        let budget = RunBudget::new(self.settings.wall_clock_budget, self.settings.max_backend_calls);
        let mut state = RunState {
            phase: RunPhase::Init,
            ledger: Ledger::new(article.id.clone()),
            decisions: Vec::new(),
        };

        let termination = self.drive(article, &mut state, &budget).await;
        state.advance(RunPhase::Done);
        info!(
            termination = ?termination,
            iterations = state.ledger.iteration(),
            records = state.ledger.len(),
            backend_calls = budget.calls_made(),
            "evidence loop finished"
        );

        state.advance(RunPhase::Output);
        let RunState { ledger, decisions, .. } = state;
        let ledger = ledger.freeze();
        let (questions, report, output_errors) = if self.settings.skip_outputs {
            (Vec::new(), None, Vec::new())
        } else {
            self.produce_outputs(article, &ledger).await
        };
        info!(
            elapsed_ms = u64::try_from(clock.elapsed().as_millis()).unwrap_or(u64::MAX),
            "run complete"
        );

        RunTrace {
            article_id: article.id.clone(),
            run_id,
            incomplete: termination.is_incomplete(),
            termination,
            iterations: ledger.iteration(),
            ledger,
            decisions,
            questions,
            report,
            output_errors,
            started_at,
            finished_at: Utc::now(),
        }
    }

    /// The evidence loop proper; returns why it stopped.
    async fn drive(&self, article: &Article, state: &mut RunState, budget: &RunBudget) -> TerminationReason {
        let mut feedback: Option<String> = None;

        loop {
            state.advance(RunPhase::Generating);
            if let Err(reason) = budget.check() {
                warn!(%reason, "budget exhausted before generation");
                return TerminationReason::BudgetExceeded(reason.to_string());
            }

            let iteration = state.ledger.begin_iteration();
            let span = info_span!("iteration", iteration);
            let step = self.iterate(article, state, budget, feedback.as_deref()).instrument(span).await;

            match step {
                Step::Stop(reason) => return reason,
                Step::Evaluated(decision) => {
                    let verdict = decision.verdict;
                    feedback = Some(decision.justification.clone());
                    state.decisions.push(decision);

                    if verdict {
                        return TerminationReason::Sufficient;
                    }
                    if iteration >= self.settings.max_iterations {
                        return TerminationReason::MaxIterations;
                    }
                }
            }
        }
    }

    /// One pass: generate, retrieve at a barrier, evaluate.
    async fn iterate(
        &self,
        article: &Article,
        state: &mut RunState,
        budget: &RunBudget,
        feedback: Option<&str>,
    ) -> Step {
        let snapshot = state.ledger.snapshot();
        let batch_size = if snapshot.is_empty() {
            self.settings.initial_batch_size
        } else {
            self.settings.follow_up_batch_size
        };

        let generated = within_budget(budget, self.generator.generate(article, &snapshot, batch_size, feedback, budget)).await;
        let queries = match generated {
            Ok(queries) => queries,
            Err(err) => return Step::Stop(stop_reason(err)),
        };
        if queries.is_empty() {
            info!("query generator returned no new queries");
            return Step::Stop(TerminationReason::GeneratorExhausted);
        }

        state.advance(RunPhase::Retrieving);
        let already_selected: Vec<Segment> = snapshot.selected_segments().cloned().collect();
        let batch = self.retrieve_batch(article, queries, &already_selected, budget).await;

        match state.ledger.append_batch(batch.records) {
            Ok(outcome) => info!(
                appended = outcome.appended,
                suppressed_selections = outcome.suppressed_selections,
                ledger_len = state.ledger.len(),
                "batch merged into ledger"
            ),
            Err(err) => {
                error!(error = %err, "ledger rejected batch");
                return Step::Stop(TerminationReason::Fatal(err.to_string()));
            }
        }
        if let Some(reason) = batch.budget_exhausted {
            warn!(%reason, "budget exhausted during retrieval; partial batch is not evaluated");
            return Step::Stop(TerminationReason::BudgetExceeded(reason));
        }

        state.advance(RunPhase::Evaluating);
        let snapshot = state.ledger.snapshot();
        match within_budget(budget, self.evaluator.evaluate(article, &snapshot, budget)).await {
            Ok(decision) => Step::Evaluated(decision),
            Err(err) => Step::Stop(stop_reason(err)),
        }
    }

    /// Retrieve every query of the batch concurrently and wait for all of
    /// them. A failed retrieval becomes a flagged empty record, and so does
    /// one cut off by the budget: every issued query stays in the ledger.
    async fn retrieve_batch(
        &self,
        article: &Article,
        queries: Vec<Query>,
        already_selected: &[Segment],
        budget: &RunBudget,
    ) -> BatchResult {
        let issued = queries.clone();
        let mut pending = stream::iter(queries.into_iter().map(|query| async move {
            let result = self.retriever.retrieve(article, &query, already_selected, budget).await;
            (query, result)
        }))
        .buffer_unordered(self.settings.max_parallel_retrievals.max(1));

        let deadline = budget.deadline().map(tokio::time::Instant::from_std);
        let mut records: Vec<EvidenceRecord> = Vec::with_capacity(issued.len());
        let mut budget_exhausted: Option<String> = None;

        loop {
            let next = match deadline {
                Some(deadline) => match tokio::time::timeout_at(deadline, pending.next()).await {
                    Ok(next) => next,
                    Err(_) => {
                        budget_exhausted.get_or_insert_with(|| "wall-clock budget spent during retrieval".to_string());
                        break;
                    }
                },
                None => pending.next().await,
            };
            let Some((query, result)) = next else {
                break;
            };

            match result {
                Ok(retrieval) => records.push(retrieval.into_record(query)),
                Err(DomainError::BudgetExceeded(reason)) => {
                    warn!(query_id = %query.id, %reason, "retrieval abandoned; recording empty evidence");
                    records.push(EvidenceRecord::failed(query, format!("retrieval abandoned: {reason}")));
                    budget_exhausted.get_or_insert(reason);
                }
                Err(err) => {
                    warn!(query_id = %query.id, error = %err, "retrieval failed; recording empty evidence");
                    records.push(EvidenceRecord::failed(query, err.to_string()));
                }
            }
        }
        drop(pending);

        if let Some(reason) = &budget_exhausted {
            for query in issued {
                if records.iter().all(|r| r.query.id != query.id) {
                    warn!(query_id = %query.id, "retrieval cut off by the deadline; recording empty evidence");
                    records.push(EvidenceRecord::failed(query, format!("retrieval abandoned: {reason}")));
                }
            }
        }

        BatchResult {
            records,
            budget_exhausted,
        }
    }

    /// Question then report generation over the frozen ledger. Failures are
    /// collected rather than raised. Output stages are not bound by the run
    /// budget; the loop already stopped.
    async fn produce_outputs(
        &self,
        article: &Article,
        ledger: &FrozenLedger,
    ) -> (Vec<InvestigativeQuestion>, Option<Report>, Vec<String>) {
        let budget = RunBudget::unlimited();
        let mut errors = Vec::new();

        let questions = match self.questions.generate(article, ledger, &budget).await {
            Ok(questions) => questions,
            Err(err) => {
                warn!(error = %err, "question generation failed");
                errors.push(err.to_string());
                Vec::new()
            }
        };

        let report = match self.reports.generate(article, ledger, &questions, &budget).await {
            Ok(report) => Some(report),
            Err(err) => {
                warn!(error = %err, "report generation failed");
                errors.push(err.to_string());
                None
            }
        };

        (questions, report, errors)
    }
}

enum Step {
    Evaluated(SufficiencyDecision),
    Stop(TerminationReason),
}

struct BatchResult {
    records: Vec<EvidenceRecord>,
    budget_exhausted: Option<String>,
}

fn stop_reason(err: DomainError) -> TerminationReason {
    match err {
        DomainError::BudgetExceeded(reason) => TerminationReason::BudgetExceeded(reason),
        other => {
            error!(error = %other, "run-fatal error");
            TerminationReason::Fatal(other.to_string())
        }
    }
}

/// Bound `step` by the run's wall-clock deadline, if any.
async fn within_budget<T>(budget: &RunBudget, step: impl Future<Output = DomainResult<T>>) -> DomainResult<T> {
    match budget.deadline() {
        Some(deadline) => tokio::time::timeout_at(tokio::time::Instant::from_std(deadline), step)
            .await
            .unwrap_or_else(|_| Err(DomainError::BudgetExceeded("wall-clock budget spent".to_string()))),
        None => step.await,
    }
}
