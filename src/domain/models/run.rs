//! Run state machine and trace records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::evidence::SufficiencyDecision;
use super::ledger::FrozenLedger;
use super::output::{InvestigativeQuestion, Report};

/// Phases of one article's run.
///
/// `Init → Generating → Retrieving → Evaluating → (Generating | Done) → Output`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    /// Run created, nothing issued yet.
    Init,
    /// Asking for the next query batch.
    Generating,
    /// Retrieving evidence for the batch.
    Retrieving,
    /// Judging whether the ledger suffices.
    Evaluating,
    /// The evidence loop has stopped.
    Done,
    /// Producing questions and the report.
    Output,
}

impl RunPhase {
    /// Whether the state machine permits moving from `self` to `next`.
    ///
    /// `Generating → Done` covers an empty query batch and a fatal generation
    /// error; `Retrieving → Done` covers budget exhaustion mid-batch.
    pub fn can_transition_to(self, next: Self) -> bool {
        use RunPhase::{Done, Evaluating, Generating, Init, Output, Retrieving};
        matches!(
            (self, next),
            (Init, Generating)
                | (Generating, Retrieving)
                | (Generating, Done)
                | (Retrieving, Evaluating)
                | (Retrieving, Done)
                | (Evaluating, Generating)
                | (Evaluating, Done)
                | (Done, Output)
        )
    }
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Init => "init",
            Self::Generating => "generating",
            Self::Retrieving => "retrieving",
            Self::Evaluating => "evaluating",
            Self::Done => "done",
            Self::Output => "output",
        };
        f.write_str(name)
    }
}

/// Why the loop stopped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "reason", content = "detail")]
pub enum TerminationReason {
    /// The evaluator judged the evidence sufficient.
    Sufficient,
    /// `max_iterations` passes completed without a positive verdict.
    MaxIterations,
    /// The query generator returned an empty batch.
    GeneratorExhausted,
    /// Wall-clock or backend-call budget ran out.
    BudgetExceeded(String),
    /// Query generation or evaluation failed after retries.
    Fatal(String),
}

impl TerminationReason {
    /// Runs ending in a fatal error are incomplete; everything else, budget
    /// exhaustion included, is a valid terminal ledger.
    pub fn is_incomplete(&self) -> bool {
        matches!(self, Self::Fatal(_))
    }

    /// Short snake_case name, without the detail.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Sufficient => "sufficient",
            Self::MaxIterations => "max_iterations",
            Self::GeneratorExhausted => "generator_exhausted",
            Self::BudgetExceeded(_) => "budget_exceeded",
            Self::Fatal(_) => "fatal",
        }
    }

    /// Budget or error message carried by the reason, if any.
    pub fn detail(&self) -> Option<&str> {
        match self {
            Self::BudgetExceeded(detail) | Self::Fatal(detail) => Some(detail),
            _ => None,
        }
    }
}

/// Audit record of one article's run, persisted once at termination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunTrace {
    /// Article the run assessed.
    pub article_id: String,
    /// Unique per run, so reruns are distinguishable in logs.
    pub run_id: Uuid,
    /// Why the evidence loop stopped.
    pub termination: TerminationReason,
    /// Set when the run ended on a fatal error.
    pub incomplete: bool,
    /// Loop passes started.
    pub iterations: u32,
    /// Every evidence record of the run.
    pub ledger: FrozenLedger,
    /// One sufficiency verdict per evaluated pass.
    pub decisions: Vec<SufficiencyDecision>,
    /// Investigative questions, ranked.
    #[serde(default)]
    pub questions: Vec<InvestigativeQuestion>,
    /// Attributed report; absent when its stage failed or was skipped.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report: Option<Report>,
    /// Failures of the question or report stage.
    #[serde(default)]
    pub output_errors: Vec<String>,
    /// Run start.
    pub started_at: DateTime<Utc>,
    /// Run end, outputs included.
    pub finished_at: DateTime<Utc>,
}

impl RunTrace {
    /// Verdict of the last evaluation, if the evaluator ran at all.
    pub fn final_verdict(&self) -> Option<bool> {
        self.decisions.last().map(|d| d.verdict)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_transitions() {
        assert!(RunPhase::Init.can_transition_to(RunPhase::Generating));
        assert!(RunPhase::Evaluating.can_transition_to(RunPhase::Generating));
        assert!(RunPhase::Generating.can_transition_to(RunPhase::Done));
        assert!(RunPhase::Done.can_transition_to(RunPhase::Output));
    }

    #[test]
    fn test_invalid_transitions() {
        assert!(!RunPhase::Init.can_transition_to(RunPhase::Evaluating));
        assert!(!RunPhase::Retrieving.can_transition_to(RunPhase::Generating));
        assert!(!RunPhase::Output.can_transition_to(RunPhase::Generating));
        assert!(!RunPhase::Done.can_transition_to(RunPhase::Generating));
    }

    #[test]
    fn test_incomplete_only_for_fatal() {
        assert!(TerminationReason::Fatal("boom".into()).is_incomplete());
        assert!(!TerminationReason::BudgetExceeded("slow".into()).is_incomplete());
        assert!(!TerminationReason::MaxIterations.is_incomplete());
    }

    #[test]
    fn test_termination_serializes_with_tag() {
        let json = serde_json::to_value(TerminationReason::BudgetExceeded("calls".into())).unwrap();
        assert_eq!(json["reason"], "budget_exceeded");
        assert_eq!(json["detail"], "calls");
        assert_eq!(TerminationReason::GeneratorExhausted.label(), "generator_exhausted");
        assert_eq!(TerminationReason::Sufficient.detail(), None);
    }
}
