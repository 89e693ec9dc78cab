//! Prompt text and ledger context rendering for every call shape.

use serde_json::{json, Map, Value};
use std::collections::HashSet;

use crate::domain::models::{FrozenLedger, InvestigativeQuestion, Segment};

const FACT_CHECK_FRAMEWORK: &str = "\
1. Investigate the source: publisher and author background, reputation, ownership, funding, past controversies.
2. Check the claims: verify central factual assertions against independent coverage, official statements and experts.
3. Trace the information: find the original context of quotes, statistics and media.
4. Read laterally: how widely is the claim reported, and who supports or disputes it.
5. Be specific: use proper nouns, dates, places and terminology from the article.";

/// Query generation contract for a batch of `batch_size`.
pub fn query_generation_system(batch_size: usize, follow_up: bool) -> String {
    let task = if follow_up {
        format!(
            "Evidence gathered so far is not yet sufficient. Propose {batch_size} additional search queries \
             that cover aspects not yet covered, or rephrase queries that remain unanswered. Do not repeat earlier queries."
        )
    } else {
        format!("Propose {batch_size} search queries.")
    };
    format!(
        "You are a professional fact-checker assessing the trustworthiness of a news article by issuing \
         search queries to a BM25 keyword search engine with relevance feedback, so favour distinctive keywords.\n\n\
         {FACT_CHECK_FRAMEWORK}\n\n{task} Give each query a rationale explaining what it verifies. \
         If no useful angle remains, return an empty list.\n\n\
         Respond with JSON only:\n\
         {{\"queries_with_rationale\": [{{\"rationale\": \"...\", \"query\": \"...\"}}]}}"
    )
}

/// Article plus the rendered history and evaluator feedback, if any.
pub fn query_generation_user(article: &str, history: Option<&str>, feedback: Option<&str>) -> String {
    let mut user = format!("News article:\n{article}");
    if let Some(history) = history {
        user.push_str("\n\nPrevious queries with the segments retrieved for them:\n");
        user.push_str(history);
    }
    if let Some(feedback) = feedback {
        user.push_str("\n\nFeedback on the evidence so far: ");
        user.push_str(feedback);
    }
    user
}

/// Segment selection contract.
pub fn selection_system(candidate_count: usize, max_selected: usize) -> String {
    format!(
        "You select evidence for a fact-checker. You receive a news article, a search query, {candidate_count} \
         candidate text segments ordered by estimated relevance, and segments already selected for earlier queries.\n\
         Return at most {max_selected} candidate segment ids that genuinely help answer the query, most relevant first. \
         Prefer segments from different sources. Reject candidates that repeat information already selected. \
         Return an empty list if none are relevant. Only use ids from the candidate list.\n\n\
         Respond with JSON only:\n\
         {{\"segment_ids\": [\"...\"], \"rationale\": \"...\"}}"
    )
}

/// Shortlist numbered for selection, with already chosen segments listed.
pub fn selection_user(article: &str, query: &str, candidates: &[Segment], already_selected: &[Segment]) -> String {
    let candidates: Vec<Value> = candidates
        .iter()
        .map(|s| json!({"segment_id": s.id, "title": s.title, "segment_text": s.text}))
        .collect();
    let selected: Vec<Value> = already_selected
        .iter()
        .map(|s| json!({"segment_id": s.id, "segment_text": snippet(&s.text, 300)}))
        .collect();

    format!(
        "News article:\n{article}\n\nQuery:\n{query}\n\nCandidate segments:\n{}\n\nAlready selected segments:\n{}",
        pretty(&Value::Array(candidates)),
        pretty(&Value::Array(selected)),
    )
}

/// Sufficiency verdict contract.
pub fn sufficiency_system() -> String {
    format!(
        "You are a skeptical fact-checker deciding whether the evidence gathered so far is sufficient to \
         judge the trustworthiness of a news article. Apply this framework strictly:\n\n{FACT_CHECK_FRAMEWORK}\n\n\
         Assume the evidence is insufficient unless the central claims and the source are covered by multiple \
         independent, credible segments. Queries listed as unanswered found no evidence. \
         Explain your reasoning first, then decide.\n\n\
         Respond with JSON only:\n\
         {{\"evaluation_reasoning\": \"...\", \"has_sufficient_information\": true}}"
    )
}

/// Article and the rendered evidence.
pub fn sufficiency_user(article: &str, evidence: &str) -> String {
    format!("News article:\n{article}\n\nQueries and retrieved evidence:\n{evidence}")
}

/// Investigative question contract.
pub fn questions_system(count: usize, max_chars: usize) -> String {
    format!(
        "You are a fact-checker and media literacy expert. Using the article and the evidence retrieved for it, \
         write exactly {count} investigative questions a careful reader should ask to judge the article's \
         trustworthiness: source background and bias, evidence quality, origins of quotes and figures, \
         missing perspectives, context and timing.\n\
         Each question must be at most {max_chars} characters, address one topic, need information outside \
         the article, and be specific to it. Rank them from most to least important and give each a rationale.\n\n\
         Respond with JSON only:\n\
         {{\"questions\": [{{\"rationale\": \"...\", \"question_text\": \"...\"}}]}}"
    )
}

/// Article and the rendered evidence for question writing.
pub fn questions_user(article: &str, evidence: &str) -> String {
    format!("News article:\n{article}\n\nQueries and retrieved segments:\n{evidence}")
}

/// Report contract with its word and citation limits.
pub fn report_system(word_limit: usize, max_citations: usize) -> String {
    format!(
        "You are a fact-checker writing a short attributed report that gives readers the background needed \
         to judge a news article's trustworthiness. Address the ranked questions in order of importance.\n\
         Rules: at most {word_limit} words in total; every sentence has a rationale and 0 to {max_citations} \
         citations; factual sentences must cite retrieved segment ids exactly as given; connecting sentences \
         may have no citations; skip questions the evidence cannot answer.\n\n\
         Respond with JSON only:\n\
         {{\"sentences\": [{{\"rationale\": \"...\", \"sentence_text\": \"...\", \"citations\": [\"...\"]}}]}}"
    )
}

/// Article, evidence and questions for the report.
pub fn report_user(
    article: &str,
    evidence: &str,
    questions: &[InvestigativeQuestion],
    citable: &[&str],
) -> String {
    let questions: Vec<Value> = questions
        .iter()
        .map(|q| json!({"rank": q.rank, "question": q.text}))
        .collect();
    format!(
        "News article:\n{article}\n\nQueries and retrieved segments:\n{evidence}\n\n\
         Questions, most important first:\n{}\n\nCite only these segment ids: {}",
        pretty(&Value::Array(questions)),
        citable.join(", "),
    )
}

/// Asks for a report cut down to `word_limit` words.
pub fn shortening_system(word_limit: usize) -> String {
    format!(
        "You shorten reports. Rewrite each sentence more concisely so the whole report has at most \
         {word_limit} words. Keep the same number of sentences, in the same order, with the same meaning.\n\n\
         Respond with JSON only:\n\
         {{\"sentences\": [\"...\"]}}"
    )
}

/// Numbered report sentences with the current word count.
pub fn shortening_user(sentences: &[&str], word_count: usize) -> String {
    let numbered: Vec<Value> = sentences.iter().map(|s| Value::String((*s).to_string())).collect();
    format!(
        "The report currently has {word_count} words and {} sentences:\n{}",
        sentences.len(),
        pretty(&Value::Array(numbered)),
    )
}

/// Queries with their selected segments, keyed `query_{n}`, as shown to the
/// query generator and the downstream stages.
pub fn render_history(ledger: &FrozenLedger) -> String {
    let mut history = Map::new();
    for record in ledger.records() {
        let segments: Vec<Value> = record
            .selected
            .iter()
            .map(|s| json!({"segment_id": s.id, "url": s.url, "title": s.title, "segment_text": s.text}))
            .collect();
        history.insert(
            record.query.id.to_string(),
            json!({
                "query": record.query.text,
                "rationale": record.query.rationale,
                "retrieved_segments": segments,
            }),
        );
    }
    pretty(&Value::Object(history))
}

/// Evaluator view of the ledger: no rationales, repeated segments (same url
/// and opening text) shown once, queries without evidence listed separately.
pub fn render_evidence_for_evaluation(ledger: &FrozenLedger) -> String {
    let mut seen: HashSet<String> = HashSet::new();
    let mut answered = Map::new();
    let mut unanswered: Vec<Value> = Vec::new();

    for record in ledger.records() {
        let segments: Vec<Value> = record
            .selected
            .iter()
            .filter(|s| seen.insert(format!("{}_{}", s.url, snippet(&s.text, 100))))
            .map(|s| json!({"segment_text": s.text}))
            .collect();

        if segments.is_empty() {
            unanswered.push(Value::String(record.query.text.clone()));
        } else {
            answered.insert(
                record.query.id.to_string(),
                json!({"query": record.query.text, "retrieved_segments": segments}),
            );
        }
    }

    pretty(&json!({"answered_queries": answered, "unanswered_queries": unanswered}))
}

fn snippet(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

fn pretty(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}
