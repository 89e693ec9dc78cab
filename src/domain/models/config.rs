//! Configuration model, loaded by the infrastructure config loader.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::evidence::MAX_SELECTED_PER_QUERY;

/// Main configuration structure for Credence
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// Chat model backend
    #[serde(default)]
    pub llm: LlmConfig,

    /// Encoder used by the dense re-rank stage
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Segment retrieval pipeline
    #[serde(default)]
    pub retrieval: RetrievalConfig,

    /// Loop bounds and parallelism
    #[serde(default)]
    pub run: RunConfig,

    /// Retry policy for backend calls
    #[serde(default)]
    pub retry: RetryConfig,

    /// Rate limiting of LLM calls
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// Question and report generation
    #[serde(default)]
    pub output: OutputConfig,

    /// Run trace persistence
    #[serde(default)]
    pub trace: TraceConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// OpenAI-compatible chat backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LlmConfig {
    /// Base URL up to and including the API version, e.g. `http://localhost:11434/v1`
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,

    /// Model name sent with every request
    #[serde(default = "default_llm_model")]
    pub model: String,

    /// Environment variable holding the API key (optional for local servers)
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Request timeout in seconds
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,

    /// Sampling temperature for query, question and report generation
    #[serde(default = "default_generation_temperature")]
    pub generation_temperature: f32,

    /// Sampling temperature for segment selection and sufficiency evaluation
    #[serde(default)]
    pub judgement_temperature: f32,

    /// Character budget for prompts resent on retry; longer prompts lose
    /// their middle. `null` resends the full prompt.
    #[serde(default = "default_retry_input_max_chars")]
    pub retry_input_max_chars: Option<usize>,
}

fn default_llm_base_url() -> String {
    "http://localhost:11434/v1".to_string()
}

fn default_llm_model() -> String {
    "llama3.3:70b".to_string()
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

const fn default_llm_timeout() -> u64 {
    120
}

const fn default_generation_temperature() -> f32 {
    0.7
}

/// About 48.5k tokens at four characters per token.
#[allow(clippy::unnecessary_wraps)]
const fn default_retry_input_max_chars() -> Option<usize> {
    Some(194_000)
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: default_llm_base_url(),
            model: default_llm_model(),
            api_key_env: default_api_key_env(),
            timeout_secs: default_llm_timeout(),
            generation_temperature: default_generation_temperature(),
            judgement_temperature: 0.0,
            retry_input_max_chars: default_retry_input_max_chars(),
        }
    }
}

/// Which encoder backs the dense stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingProviderKind {
    /// Local feature-hashing encoder; deterministic, no network
    Hashing,
    /// OpenAI-compatible `/embeddings` endpoint
    Openai,
}

/// Encoder configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct EmbeddingConfig {
    /// Encoder implementation
    #[serde(default = "default_embedding_provider")]
    pub provider: EmbeddingProviderKind,

    /// Model name sent to the remote provider
    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Output vector length
    #[serde(default = "default_embedding_dimension")]
    pub dimension: usize,

    /// Base URL for the remote provider; falls back to `llm.base_url`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

const fn default_embedding_provider() -> EmbeddingProviderKind {
    EmbeddingProviderKind::Hashing
}

fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}

const fn default_embedding_dimension() -> usize {
    384
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: default_embedding_model(),
            dimension: default_embedding_dimension(),
            base_url: None,
        }
    }
}

/// Policy for suppressing repeat evidence after the semantic filter
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum DuplicatePolicy {
    /// Only the same segment id counts as a duplicate
    #[default]
    ExactId,
    /// Segments whose token Jaccard overlap with an earlier selection reaches
    /// `threshold` are duplicates too
    TextOverlap {
        /// Jaccard overlap in `[0, 1]`
        threshold: f32,
    },
}

/// Relevance-feedback query expansion for the lexical stage
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct FeedbackConfig {
    /// Run the expanded second pass
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Top hits of the first pass treated as relevant
    #[serde(default = "default_feedback_docs")]
    pub feedback_docs: usize,

    /// Expansion terms added to the second pass
    #[serde(default = "default_expansion_terms")]
    pub expansion_terms: usize,

    /// Weight of the original query terms in the interpolated query
    #[serde(default = "default_original_query_weight")]
    pub original_query_weight: f32,
}

const fn default_true() -> bool {
    true
}

const fn default_feedback_docs() -> usize {
    10
}

const fn default_expansion_terms() -> usize {
    10
}

const fn default_original_query_weight() -> f32 {
    0.5
}

impl Default for FeedbackConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            feedback_docs: default_feedback_docs(),
            expansion_terms: default_expansion_terms(),
            original_query_weight: default_original_query_weight(),
        }
    }
}

/// BM25 parameters
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Bm25Config {
    /// Term frequency saturation
    #[serde(default = "default_k1")]
    pub k1: f32,
    /// Document length normalization in `[0, 1]`
    #[serde(default = "default_b")]
    pub b: f32,
}

const fn default_k1() -> f32 {
    0.9
}

const fn default_b() -> f32 {
    0.4
}

impl Default for Bm25Config {
    fn default() -> Self {
        Self {
            k1: default_k1(),
            b: default_b(),
        }
    }
}

/// Segment retrieval configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RetrievalConfig {
    /// JSONL segment corpus loaded into the lexical index
    #[serde(default = "default_corpus_path")]
    pub corpus_path: PathBuf,

    /// Candidates fetched by the lexical stage (K)
    #[serde(default = "default_lexical_top_k")]
    pub lexical_top_k: usize,

    /// Relevance-feedback expansion of the lexical query
    #[serde(default)]
    pub feedback: FeedbackConfig,

    /// Lexical scoring parameters
    #[serde(default)]
    pub bm25: Bm25Config,

    /// Re-ranked candidates shown to the semantic filter (N)
    #[serde(default = "default_rerank_top_n")]
    pub rerank_top_n: usize,

    /// Upper bound on segments selected per query, at most
    /// [`MAX_SELECTED_PER_QUERY`]
    #[serde(default = "default_max_selected")]
    pub max_selected: usize,

    /// Which selections count as repeat evidence
    #[serde(default)]
    pub duplicate_policy: DuplicatePolicy,
}

fn default_corpus_path() -> PathBuf {
    PathBuf::from(".credence/segments.jsonl")
}

const fn default_lexical_top_k() -> usize {
    100
}

const fn default_rerank_top_n() -> usize {
    10
}

const fn default_max_selected() -> usize {
    MAX_SELECTED_PER_QUERY
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            corpus_path: default_corpus_path(),
            lexical_top_k: default_lexical_top_k(),
            feedback: FeedbackConfig::default(),
            bm25: Bm25Config::default(),
            rerank_top_n: default_rerank_top_n(),
            max_selected: default_max_selected(),
            duplicate_policy: DuplicatePolicy::default(),
        }
    }
}

/// Loop bounds, budgets and parallelism
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RunConfig {
    /// Hard upper bound on loop passes per article
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    /// Queries requested on the first pass
    #[serde(default = "default_batch_size")]
    pub initial_batch_size: usize,

    /// Queries requested on each later pass
    #[serde(default = "default_batch_size")]
    pub follow_up_batch_size: usize,

    /// Token Jaccard at or above which a proposed query is a near-duplicate
    #[serde(default = "default_query_similarity_threshold")]
    pub query_similarity_threshold: f32,

    /// Per-article wall-clock budget; unbounded when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wall_clock_budget_secs: Option<u64>,

    /// Per-article backend call budget; unbounded when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_backend_calls: Option<u32>,

    /// Articles processed concurrently by a batch
    #[serde(default = "default_max_parallel_articles")]
    pub max_parallel_articles: usize,

    /// Retrievals of one query batch in flight at once
    #[serde(default = "default_max_parallel_retrievals")]
    pub max_parallel_retrievals: usize,
}

const fn default_max_iterations() -> u32 {
    5
}

const fn default_batch_size() -> usize {
    5
}

const fn default_query_similarity_threshold() -> f32 {
    0.8
}

const fn default_max_parallel_articles() -> usize {
    4
}

const fn default_max_parallel_retrievals() -> usize {
    5
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            initial_batch_size: default_batch_size(),
            follow_up_batch_size: default_batch_size(),
            query_similarity_threshold: default_query_similarity_threshold(),
            wall_clock_budget_secs: None,
            max_backend_calls: None,
            max_parallel_articles: default_max_parallel_articles(),
            max_parallel_retrievals: default_max_parallel_retrievals(),
        }
    }
}

/// Rate limiting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RateLimitConfig {
    /// Requests per second allowed
    #[serde(default = "default_requests_per_second")]
    pub requests_per_second: f64,

    /// Burst size for token bucket
    #[serde(default = "default_burst_size")]
    pub burst_size: u32,
}

const fn default_requests_per_second() -> f64 {
    5.0
}

const fn default_burst_size() -> u32 {
    10
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_second: default_requests_per_second(),
            burst_size: default_burst_size(),
        }
    }
}

/// Retry policy configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RetryConfig {
    /// Total attempts per backend call, first try included
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial backoff delay in milliseconds
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    /// Maximum backoff delay in milliseconds
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

const fn default_max_attempts() -> u32 {
    3
}

const fn default_initial_backoff_ms() -> u64 {
    500
}

const fn default_max_backoff_ms() -> u64 {
    30_000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

/// Downstream question and report generation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct OutputConfig {
    /// Investigative questions kept per article
    #[serde(default = "default_question_count")]
    pub question_count: usize,

    /// Longest question text accepted
    #[serde(default = "default_question_max_chars")]
    pub question_max_chars: usize,

    /// Word limit the report is shortened to
    #[serde(default = "default_report_word_limit")]
    pub report_word_limit: usize,

    /// Citations allowed on one report sentence
    #[serde(default = "default_max_citations")]
    pub max_citations_per_sentence: usize,

    /// Shortening requests before an over-long report is accepted as is
    #[serde(default = "default_max_shorten_passes")]
    pub max_shorten_passes: u32,
}

const fn default_question_count() -> usize {
    10
}

const fn default_question_max_chars() -> usize {
    300
}

const fn default_report_word_limit() -> usize {
    250
}

const fn default_max_citations() -> usize {
    3
}

const fn default_max_shorten_passes() -> u32 {
    5
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            question_count: default_question_count(),
            question_max_chars: default_question_max_chars(),
            report_word_limit: default_report_word_limit(),
            max_citations_per_sentence: default_max_citations(),
            max_shorten_passes: default_max_shorten_passes(),
        }
    }
}

/// Trace store backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraceBackend {
    /// One JSON object per line in a flat file
    Jsonl,
    /// `SQLite` database with append-only triggers
    Sqlite,
}

/// Run trace persistence
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct TraceConfig {
    /// Store implementation
    #[serde(default = "default_trace_backend")]
    pub backend: TraceBackend,

    /// JSONL file or `SQLite` database path
    #[serde(default = "default_trace_path")]
    pub path: PathBuf,
}

const fn default_trace_backend() -> TraceBackend {
    TraceBackend::Jsonl
}

fn default_trace_path() -> PathBuf {
    PathBuf::from(".credence/traces.jsonl")
}

impl Default for TraceConfig {
    fn default() -> Self {
        Self {
            backend: default_trace_backend(),
            path: default_trace_path(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: json or pretty
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Directory for rolling log files; console only when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_dir: Option<PathBuf>,

    /// File rotation: daily, hourly or never
    #[serde(default = "default_rotation")]
    pub rotation: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_rotation() -> String {
    "daily".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            log_dir: None,
            rotation: default_rotation(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_pipeline_constants() {
        let config = Config::default();
        assert_eq!(config.retrieval.lexical_top_k, 100);
        assert_eq!(config.retrieval.rerank_top_n, 10);
        assert_eq!(config.retrieval.max_selected, 3);
        assert!((config.retrieval.bm25.k1 - 0.9).abs() < f32::EPSILON);
        assert!((config.retrieval.bm25.b - 0.4).abs() < f32::EPSILON);
        assert_eq!(config.run.initial_batch_size, 5);
        assert_eq!(config.output.question_count, 10);
        assert_eq!(config.retrieval.duplicate_policy, DuplicatePolicy::ExactId);
    }

    #[test]
    fn test_duplicate_policy_yaml() {
        let yaml = "kind: text_overlap\nthreshold: 0.6\n";
        let policy: DuplicatePolicy = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(policy, DuplicatePolicy::TextOverlap { threshold: 0.6 });
    }
}
