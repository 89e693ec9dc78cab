//! Shared fixtures for integration tests.
#![allow(dead_code)]

use serde_json::{json, Value};
use std::sync::Arc;

use credence::adapters::{Bm25Index, CorpusSegment, HashingEmbedder, ScriptedLanguageModel};
use credence::domain::models::{Bm25Config, Config};
use credence::domain::ports::CompletionRequest;
use credence::{Article, BackendError, LoopOrchestrator};

pub const ARTICLE_ID: &str = "art_1";

pub fn article() -> Article {
    article_with_id(ARTICLE_ID)
}

pub fn article_with_id(id: &str) -> Article {
    Article::new(
        id,
        "The harbor bridge was closed on Monday after the mayor ignored corrosion warnings from engineers.",
    )
    .with_metadata("title", "Harbor bridge closed")
    .with_metadata("url", "https://news.example/harbor-bridge")
}

fn segment(id: &str, title: &str, text: &str) -> CorpusSegment {
    CorpusSegment {
        id: id.to_string(),
        title: title.to_string(),
        url: format!("https://source.example/{}", id.replace('#', "/")),
        text: text.to_string(),
    }
}

pub fn corpus_segments() -> Vec<CorpusSegment> {
    vec![
        segment(
            "doc_1#0",
            "Harbor bridge inspection",
            "Engineers inspected the harbor bridge in March and reported corrosion on the main cables.",
        ),
        segment(
            "doc_1#1",
            "Harbor bridge inspection",
            "The transport department said cable repairs would begin next spring.",
        ),
        segment(
            "doc_2#0",
            "Mayor statement",
            "The mayor denied that the harbor bridge was unsafe and cited an independent audit.",
        ),
        segment(
            "doc_3#0",
            "Audit firm ownership",
            "The independent audit firm is owned by a donor to the mayor's reelection campaign.",
        ),
        segment(
            "doc_4#0",
            "Weekend weather",
            "Heavy rain is expected across the region this weekend.",
        ),
        segment(
            "art_1#0",
            "Harbor bridge closed",
            "The harbor bridge was closed after the mayor ignored corrosion warnings.",
        ),
    ]
}

pub fn index() -> Arc<Bm25Index> {
    Arc::new(Bm25Index::build(corpus_segments(), Bm25Config::default()))
}

/// Defaults with fast retries, no throttling and small batches.
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.retry.max_attempts = 3;
    config.retry.initial_backoff_ms = 1;
    config.retry.max_backoff_ms = 2;
    config.rate_limit.requests_per_second = 10_000.0;
    config.rate_limit.burst_size = 10_000;
    config.run.max_iterations = 3;
    config.run.initial_batch_size = 2;
    config.run.follow_up_batch_size = 2;
    config.run.wall_clock_budget_secs = None;
    config.run.max_backend_calls = None;
    config.retrieval.lexical_top_k = 10;
    config.retrieval.rerank_top_n = 5;
    config
}

pub fn orchestrator(model: Arc<ScriptedLanguageModel>, config: &Config) -> LoopOrchestrator {
    LoopOrchestrator::from_config(config, model, index(), Arc::new(HashingEmbedder::new(256)))
}

pub fn queries_reply(queries: &[&str]) -> String {
    let entries: Vec<Value> = queries
        .iter()
        .map(|q| json!({"rationale": format!("verify {q}"), "query": q}))
        .collect();
    json!({ "queries_with_rationale": entries }).to_string()
}

pub fn verdict_reply(sufficient: bool) -> String {
    json!({
        "evaluation_reasoning": if sufficient { "claims corroborated" } else { "ownership of the auditor unknown" },
        "has_sufficient_information": sufficient,
    })
    .to_string()
}

pub fn questions_reply(count: usize) -> String {
    let questions: Vec<Value> = (1..=count)
        .map(|i| json!({"rationale": "open issue", "question_text": format!("Who verified claim number {i}?")}))
        .collect();
    json!({ "questions": questions }).to_string()
}

/// Segment ids offered to the semantic filter in `request`.
pub fn candidate_ids(request: &CompletionRequest) -> Vec<String> {
    let Some((_, rest)) = request.user.split_once("Candidate segments:\n") else {
        return Vec::new();
    };
    let listing = rest
        .split_once("\n\nAlready selected segments:")
        .map_or(rest, |(listing, _)| listing);
    let Ok(Value::Array(candidates)) = serde_json::from_str::<Value>(listing) else {
        return Vec::new();
    };
    candidates
        .iter()
        .filter_map(|c| c["segment_id"].as_str().map(str::to_string))
        .collect()
}

/// Selection handler choosing the first `n` offered segments.
pub fn pick_top(n: usize) -> impl Fn(&CompletionRequest) -> Result<String, BackendError> + Send + Sync + 'static {
    move |request: &CompletionRequest| {
        let ids: Vec<String> = candidate_ids(request).into_iter().take(n).collect();
        Ok(json!({"segment_ids": ids, "rationale": "relevant"}).to_string())
    }
}

/// Report handler citing the first citable segment, if any.
pub fn report_handler(request: &CompletionRequest) -> Result<String, BackendError> {
    let citable = request
        .user
        .rsplit_once("Cite only these segment ids: ")
        .map(|(_, ids)| ids.trim())
        .unwrap_or_default();
    let citations: Vec<&str> = citable.split(", ").filter(|id| !id.is_empty()).take(1).collect();
    Ok(json!({
        "sentences": [
            {"rationale": "context", "sentence_text": "Inspectors reported corrosion before the closure.", "citations": citations},
            {"rationale": "balance", "sentence_text": "The mayor disputes the safety concerns.", "citations": []}
        ]
    })
    .to_string())
}

/// Model that answers every output stage, selects the top two segments and
/// uses `verdict` as the sufficiency fallback. Query replies are up to the
/// caller.
pub fn scripted_model(verdict: bool) -> Arc<ScriptedLanguageModel> {
    use credence::domain::ports::PromptTask;

    let model = Arc::new(ScriptedLanguageModel::new());
    model
        .set_handler(PromptTask::SegmentSelection, pick_top(2))
        .set_fallback(PromptTask::Sufficiency, verdict_reply(verdict))
        .set_fallback(PromptTask::Questions, questions_reply(10))
        .set_handler(PromptTask::Report, report_handler);
    model
}
