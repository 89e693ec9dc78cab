//! Domain models: articles, queries, evidence, the ledger and run traces.

pub mod article;
pub mod config;
pub mod evidence;
pub mod ledger;
pub mod output;
pub mod query;
pub mod run;
pub mod segment;
pub mod similarity;

pub use article::Article;
pub use config::{
    Bm25Config, Config, DuplicatePolicy, EmbeddingConfig, EmbeddingProviderKind, FeedbackConfig,
    LlmConfig, LoggingConfig, OutputConfig, RateLimitConfig, RetrievalConfig, RetryConfig,
    RunConfig, TraceBackend, TraceConfig,
};
pub use evidence::{EvidenceRecord, SufficiencyDecision, MAX_SELECTED_PER_QUERY};
pub use ledger::{AppendOutcome, FrozenLedger, Ledger};
pub use output::{InvestigativeQuestion, Report, ReportSentence};
pub use query::{Provenance, Query, QueryId};
pub use run::{RunPhase, RunTrace, TerminationReason};
pub use segment::{document_id_of, Segment};
