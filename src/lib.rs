//! Credence - iterative evidence gathering for news article trustworthiness
//!
//! For each article, a loop issues search queries, retrieves and filters
//! evidence segments, and asks whether the evidence is sufficient, until it
//! is, the generator runs dry, or a budget runs out. The resulting evidence
//! ledger feeds investigative question and report generation.
//!
//! # Architecture
//!
//! - **Domain Layer** (`domain`): models, errors and the ports every backend
//!   sits behind
//! - **Service Layer** (`services`): the pipeline stages and the loop
//!   orchestrator
//! - **Adapters** (`adapters`): chat and embedding clients, the BM25 index,
//!   trace stores
//! - **Infrastructure Layer** (`infrastructure`): configuration, logging,
//!   retries and rate limiting
//! - **CLI Layer** (`cli`): command-line interface

pub mod adapters;
pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;

pub use domain::models::{
    Article, Config, EvidenceRecord, FrozenLedger, Ledger, Query, RunTrace, Segment,
    SufficiencyDecision, TerminationReason,
};
pub use domain::{BackendError, DomainError, DomainResult};
pub use infrastructure::config::{ConfigError, ConfigLoader};
pub use services::{BatchRunner, LoopOrchestrator, RunSettings};
