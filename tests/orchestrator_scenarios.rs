//! End-to-end loop behavior against a scripted model and an in-memory index.

mod common;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use common::*;
use credence::adapters::ScriptedLanguageModel;
use credence::domain::models::{Ledger, Provenance};
use credence::domain::ports::PromptTask;
use credence::infrastructure::resilience::{RequestThrottle, RetryPolicy};
use credence::services::{InformationEvaluator, RunBudget, StructuredCaller};
use credence::{BackendError, ConfigLoader, EvidenceRecord, RunTrace, TerminationReason};

fn assert_ledger_invariants(trace: &RunTrace, max_iterations: u32) {
    let records = trace.ledger.records();

    let ids: HashSet<_> = records.iter().map(|r| r.query.id).collect();
    assert_eq!(ids.len(), records.len(), "query ids must be pairwise distinct");

    assert!(
        records.windows(2).all(|w| w[0].query.iteration <= w[1].query.iteration),
        "records are appended in iteration order"
    );
    assert!(trace.iterations <= max_iterations);

    for (expected, decision) in (1..).zip(&trace.decisions) {
        assert_eq!(decision.iteration, expected, "one decision per pass, counted from 1");
    }

    let mut selected = HashSet::new();
    for record in records {
        assert!(record.selected.len() <= 3);
        let candidates: HashSet<&str> = record.candidates.iter().map(|c| c.id.as_str()).collect();
        for segment in &record.selected {
            assert!(candidates.contains(segment.id.as_str()), "selection outside candidates");
            assert!(selected.insert(segment.id.clone()), "segment {} selected twice", segment.id);
        }
        assert!(
            record.candidates.iter().all(|c| c.document_id != ARTICLE_ID),
            "the article's own segments are never candidates"
        );
    }
}

#[tokio::test]
async fn test_sufficient_first_pass_produces_outputs() {
    let model = scripted_model(true);
    model.push(
        PromptTask::QueryGeneration,
        queries_reply(&["harbor bridge corrosion inspection", "mayor independent audit"]),
    );

    let trace = orchestrator(model.clone(), &test_config()).run(&article()).await;

    assert_eq!(trace.termination, TerminationReason::Sufficient);
    assert!(!trace.incomplete);
    assert_eq!(trace.iterations, 1);
    assert_eq!(trace.ledger.len(), 2);
    assert_eq!(trace.final_verdict(), Some(true));
    assert!(trace.ledger.records().iter().all(|r| r.query.provenance == Provenance::Initial));
    assert!(trace.ledger.records().iter().any(EvidenceRecord::has_evidence));

    assert_eq!(trace.questions.len(), 10);
    assert_eq!(trace.questions[0].rank, 1);
    let report = trace.report.as_ref().expect("report");
    let cited: Vec<&String> = report.sentences.iter().flat_map(|s| &s.citations).collect();
    assert_eq!(cited.len(), 1);
    assert!(trace.ledger.selected_ids().contains(cited[0].as_str()));
    assert!(trace.output_errors.is_empty());
    assert_ledger_invariants(&trace, 3);
}

#[tokio::test]
async fn test_dense_stage_scores_every_candidate() {
    let model = scripted_model(true);
    model.push(PromptTask::QueryGeneration, queries_reply(&["harbor bridge corrosion"]));

    let trace = orchestrator(model, &test_config()).run(&article()).await;
    let record = &trace.ledger.records()[0];

    assert!(!record.candidates.is_empty());
    assert!(record.candidates.iter().all(|c| c.dense_score.is_some()));
    assert!(record
        .candidates
        .windows(2)
        .all(|w| w[0].dense_score >= w[1].dense_score));
}

#[tokio::test]
async fn test_empty_lexical_result_records_empty_evidence() {
    let model = scripted_model(true);
    model.push(
        PromptTask::QueryGeneration,
        queries_reply(&["zeppelin airship", "harbor bridge corrosion"]),
    );

    let trace = orchestrator(model.clone(), &test_config()).run(&article()).await;

    assert_eq!(trace.termination, TerminationReason::Sufficient);
    assert_eq!(trace.ledger.len(), 2);
    let empty = trace
        .ledger
        .records()
        .iter()
        .find(|r| r.query.text == "zeppelin airship")
        .expect("record for the unmatched query");
    assert!(empty.candidates.is_empty());
    assert!(empty.selected.is_empty());
    assert!(!empty.is_flagged());
    assert_eq!(model.call_count(PromptTask::SegmentSelection), 1);
}

#[tokio::test]
async fn test_empty_generation_on_second_pass_ends_without_evaluation() {
    let model = scripted_model(false);
    model
        .push(
            PromptTask::QueryGeneration,
            queries_reply(&["harbor bridge corrosion", "mayor independent audit"]),
        )
        .push(PromptTask::QueryGeneration, queries_reply(&[]));

    let trace = orchestrator(model.clone(), &test_config()).run(&article()).await;

    assert_eq!(trace.termination, TerminationReason::GeneratorExhausted);
    assert!(!trace.incomplete);
    assert_eq!(trace.iterations, 2);
    assert_eq!(trace.decisions.len(), 1);
    assert_eq!(model.call_count(PromptTask::Sufficiency), 1);
    assert_eq!(trace.ledger.len(), 2);
}

#[tokio::test]
async fn test_insufficient_evidence_stops_at_max_iterations() {
    let model = scripted_model(false);
    model
        .push(
            PromptTask::QueryGeneration,
            queries_reply(&["harbor bridge corrosion", "mayor independent audit"]),
        )
        .push(
            PromptTask::QueryGeneration,
            queries_reply(&["audit firm donor campaign", "transport department repairs"]),
        )
        .push(
            PromptTask::QueryGeneration,
            queries_reply(&["engineers inspected cables march", "heavy rain weekend"]),
        );

    let config = test_config();
    let trace = orchestrator(model.clone(), &config).run(&article()).await;

    assert_eq!(trace.termination, TerminationReason::MaxIterations);
    assert_eq!(trace.iterations, 3);
    assert_eq!(trace.decisions.len(), 3);
    assert!(trace.decisions.iter().all(|d| !d.verdict));
    assert_eq!(trace.final_verdict(), Some(false));
    assert_eq!(model.call_count(PromptTask::QueryGeneration), 3);
    assert_eq!(model.call_count(PromptTask::Sufficiency), 3);
    assert_eq!(trace.ledger.len(), 6);

    let follow_ups = trace
        .ledger
        .records()
        .iter()
        .filter(|r| r.query.provenance == Provenance::FollowUp)
        .count();
    assert_eq!(follow_ups, 4);
    assert_ledger_invariants(&trace, config.run.max_iterations);
}

#[tokio::test]
async fn test_follow_up_prompt_carries_history_and_feedback() {
    let model = scripted_model(false);
    model
        .push(PromptTask::QueryGeneration, queries_reply(&["harbor bridge corrosion"]))
        .push(PromptTask::QueryGeneration, queries_reply(&[]));

    orchestrator(model.clone(), &test_config()).run(&article()).await;

    let generation: Vec<_> = model
        .calls()
        .into_iter()
        .filter(|c| c.task == PromptTask::QueryGeneration)
        .collect();
    assert_eq!(generation.len(), 2);
    assert!(!generation[0].user.contains("Previous queries"));
    assert!(generation[1].user.contains("Previous queries"));
    assert!(generation[1].user.contains("harbor bridge corrosion"));
    assert!(generation[1].user.contains("ownership of the auditor unknown"));
}

#[tokio::test]
async fn test_near_duplicate_queries_are_dropped() {
    let model = scripted_model(true);
    model.push(
        PromptTask::QueryGeneration,
        queries_reply(&["harbor bridge corrosion", "harbor bridge corrosion", "mayor independent audit"]),
    );

    let trace = orchestrator(model, &test_config()).run(&article()).await;

    let texts: Vec<&str> = trace.ledger.queries().map(|q| q.text.as_str()).collect();
    assert_eq!(texts, vec!["harbor bridge corrosion", "mayor independent audit"]);
}

#[tokio::test]
async fn test_transient_selection_failure_is_retried() {
    let model = scripted_model(true);
    model
        .push(PromptTask::QueryGeneration, queries_reply(&["harbor bridge corrosion"]))
        .push_error(
            PromptTask::SegmentSelection,
            BackendError::Transient("HTTP 503: overloaded".to_string()),
        );

    let trace = orchestrator(model.clone(), &test_config()).run(&article()).await;

    assert_eq!(model.call_count(PromptTask::SegmentSelection), 2);
    let record = &trace.ledger.records()[0];
    assert!(!record.is_flagged());
    assert!(record.error.is_none());
    assert!(!record.selected.is_empty());
}

#[tokio::test]
async fn test_malformed_selection_is_retried() {
    let model = scripted_model(true);
    model
        .push(PromptTask::QueryGeneration, queries_reply(&["harbor bridge corrosion"]))
        .push(PromptTask::SegmentSelection, r#"{"segment_ids": ["not_offered#9"]}"#)
        .push(PromptTask::SegmentSelection, "no json here");

    let trace = orchestrator(model.clone(), &test_config()).run(&article()).await;

    assert_eq!(model.call_count(PromptTask::SegmentSelection), 3);
    assert!(trace.ledger.records()[0].has_evidence());
}

#[tokio::test]
async fn test_failed_retrieval_is_isolated_from_siblings() {
    let model = scripted_model(true);
    model
        .push(
            PromptTask::QueryGeneration,
            queries_reply(&["mayor independent audit", "harbor bridge corrosion"]),
        )
        .set_handler(PromptTask::SegmentSelection, |request| {
            if request.user.contains("Query:\nmayor independent audit") {
                Err(BackendError::Permanent("HTTP 400: bad request".to_string()))
            } else {
                pick_top(2)(request)
            }
        });

    let trace = orchestrator(model, &test_config()).run(&article()).await;

    assert_eq!(trace.termination, TerminationReason::Sufficient);
    assert!(!trace.incomplete);
    assert_eq!(trace.ledger.len(), 2);

    let failed = trace
        .ledger
        .records()
        .iter()
        .find(|r| r.query.text == "mayor independent audit")
        .expect("failed record");
    assert!(failed.is_flagged());
    assert!(failed.selected.is_empty());
    assert!(failed.error.as_deref().unwrap_or_default().contains("semantic filter"));

    let sibling = trace
        .ledger
        .records()
        .iter()
        .find(|r| r.query.text == "harbor bridge corrosion")
        .expect("sibling record");
    assert!(sibling.has_evidence());
}

#[tokio::test]
async fn test_generation_failure_is_fatal_but_outputs_still_run() {
    let model = scripted_model(true);
    model.set_fallback_error(
        PromptTask::QueryGeneration,
        BackendError::Permanent("HTTP 401: invalid key".to_string()),
    );

    let trace = orchestrator(model.clone(), &test_config()).run(&article()).await;

    assert!(matches!(trace.termination, TerminationReason::Fatal(_)));
    assert!(trace.incomplete);
    assert!(trace.ledger.is_empty());
    assert!(trace.decisions.is_empty());
    assert_eq!(model.call_count(PromptTask::QueryGeneration), 1);
    assert_eq!(trace.questions.len(), 10);
    assert!(trace.report.is_some());
}

#[tokio::test]
async fn test_evaluation_failure_exhausts_retries_then_is_fatal() {
    let model = scripted_model(true);
    model
        .push(PromptTask::QueryGeneration, queries_reply(&["harbor bridge corrosion"]))
        .set_fallback_error(
            PromptTask::Sufficiency,
            BackendError::Transient("HTTP 529: overloaded".to_string()),
        );

    let config = test_config();
    let trace = orchestrator(model.clone(), &config).run(&article()).await;

    assert!(matches!(trace.termination, TerminationReason::Fatal(_)));
    assert!(trace.incomplete);
    assert_eq!(trace.final_verdict(), None);
    assert_eq!(trace.ledger.len(), 1);
    assert_eq!(
        model.call_count(PromptTask::Sufficiency),
        config.retry.max_attempts as usize
    );
}

#[tokio::test]
async fn test_call_budget_forces_done_with_collected_evidence() {
    let model = scripted_model(true);
    model.push(
        PromptTask::QueryGeneration,
        queries_reply(&["harbor bridge corrosion", "mayor independent audit"]),
    );

    let mut config = test_config();
    // One generation call and two selections; nothing left for evaluation.
    config.run.max_backend_calls = Some(3);
    let trace = orchestrator(model.clone(), &config).run(&article()).await;

    assert!(matches!(trace.termination, TerminationReason::BudgetExceeded(_)));
    assert!(!trace.incomplete);
    assert_eq!(trace.ledger.len(), 2);
    assert!(trace.decisions.is_empty());
    assert_eq!(model.call_count(PromptTask::Sufficiency), 0);
    assert_eq!(trace.questions.len(), 10, "outputs are not bound by the run budget");
}

#[tokio::test]
async fn test_call_budget_during_retrieval_records_the_abandoned_query() {
    let model = scripted_model(true);
    model.push(
        PromptTask::QueryGeneration,
        queries_reply(&["harbor bridge corrosion", "mayor independent audit"]),
    );

    let mut config = test_config();
    // Generation and one selection fit; the other selection does not.
    config.run.max_backend_calls = Some(2);
    let trace = orchestrator(model.clone(), &config).run(&article()).await;

    assert!(matches!(trace.termination, TerminationReason::BudgetExceeded(_)));
    assert_eq!(trace.ledger.len(), 2);
    let abandoned: Vec<_> = trace.ledger.records().iter().filter(|r| r.is_flagged()).collect();
    assert_eq!(abandoned.len(), 1);
    assert!(abandoned[0].selected.is_empty());
    assert_eq!(model.call_count(PromptTask::SegmentSelection), 1);
    assert!(trace.decisions.is_empty());
    assert_ledger_invariants(&trace, 3);
}

#[tokio::test]
async fn test_wall_clock_budget_abandons_slow_retrievals() {
    let model = scripted_model(true);
    model
        .push(PromptTask::QueryGeneration, queries_reply(&["harbor bridge corrosion"]))
        .set_delay(PromptTask::SegmentSelection, Duration::from_secs(30));

    let mut config = test_config();
    config.run.wall_clock_budget_secs = Some(1);
    let orchestrator = orchestrator(model, &config).without_outputs();

    let trace = tokio::time::timeout(Duration::from_secs(10), orchestrator.run(&article()))
        .await
        .expect("budget must cut the run short");

    assert!(matches!(trace.termination, TerminationReason::BudgetExceeded(_)));
    assert!(trace.decisions.is_empty());
    assert!(trace.report.is_none());

    let records = trace.ledger.records();
    assert_eq!(records.len(), 1, "the issued query is still recorded");
    assert_eq!(records[0].query.text, "harbor bridge corrosion");
    assert!(records[0].is_flagged());
    assert!(!records[0].has_evidence());
    assert!(records[0].error.as_deref().unwrap_or_default().contains("abandoned"));
}

#[tokio::test]
async fn test_selection_limit_holds_when_configured_too_high() {
    let mut config = test_config();
    config.retrieval.max_selected = 5;
    assert!(ConfigLoader::validate(&config).is_err());

    let model = scripted_model(true);
    model
        .set_handler(PromptTask::SegmentSelection, pick_top(5))
        .push(PromptTask::QueryGeneration, queries_reply(&["harbor bridge corrosion mayor audit"]));

    let trace = orchestrator(model, &config).without_outputs().run(&article()).await;
    let record = &trace.ledger.records()[0];

    assert!(record.candidates.len() > 3, "enough candidates to exceed the limit");
    assert_eq!(record.selected.len(), 3);
    assert_ledger_invariants(&trace, 3);
}

#[tokio::test]
async fn test_overlapping_selections_keep_each_segment_once() {
    let model = scripted_model(false);
    model
        .set_handler(PromptTask::SegmentSelection, pick_top(5))
        .push(
            PromptTask::QueryGeneration,
            queries_reply(&["harbor bridge corrosion", "harbor bridge mayor"]),
        )
        .push(
            PromptTask::QueryGeneration,
            queries_reply(&["bridge cables engineers", "mayor audit bridge unsafe"]),
        )
        .push(PromptTask::QueryGeneration, queries_reply(&[]));

    let trace = orchestrator(model.clone(), &test_config()).run(&article()).await;

    assert_eq!(trace.termination, TerminationReason::GeneratorExhausted);
    assert_ledger_invariants(&trace, 3);

    let selection_requests: Vec<_> = model
        .calls()
        .into_iter()
        .filter(|c| c.task == PromptTask::SegmentSelection)
        .collect();
    let second_pass = selection_requests.last().expect("selection request");
    let first_pick = &trace.ledger.records()[0].selected[0].id;
    let already = second_pass
        .user
        .split_once("Already selected segments:")
        .map(|(_, rest)| rest)
        .unwrap_or_default();
    assert!(already.contains(first_pick.as_str()));
}

#[tokio::test]
async fn test_evaluator_is_deterministic_for_a_fixed_snapshot() {
    let model = Arc::new(ScriptedLanguageModel::new());
    model.set_handler(PromptTask::Sufficiency, |request| {
        Ok(verdict_reply(request.user.contains("corrosion on the main cables")))
    });
    let caller = StructuredCaller::new(model.clone(), RetryPolicy::no_retry(), RequestThrottle::unlimited());
    let evaluator = InformationEvaluator::new(caller, 0.0);

    let seed = scripted_model(false);
    seed.push(PromptTask::QueryGeneration, queries_reply(&["harbor bridge corrosion"]));
    let trace = orchestrator(seed, &test_config()).without_outputs().run(&article()).await;

    let mut ledger = Ledger::new(ARTICLE_ID);
    ledger
        .append_batch(trace.ledger.records().to_vec())
        .expect("append recorded evidence");
    let snapshot = ledger.snapshot();

    let budget = RunBudget::unlimited();
    let first = evaluator.evaluate(&article(), &snapshot, &budget).await.unwrap();
    let second = evaluator.evaluate(&article(), &snapshot, &budget).await.unwrap();

    assert_eq!(first.verdict, second.verdict);
    assert_eq!(first.justification, second.justification);
    let calls = model.calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].user, calls[1].user);
}
