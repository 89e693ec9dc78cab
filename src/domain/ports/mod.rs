//! Port trait definitions (Hexagonal Architecture)
//!
//! Async trait interfaces implemented by adapters:
//! - LanguageModel: chat completions for every prompt-driven stage
//! - LexicalIndex: inverted-index segment search
//! - EmbeddingProvider: dense vectors for re-ranking
//! - TraceRepository: append-only run trace persistence

pub mod embedding;
pub mod language_model;
pub mod lexical_index;
pub mod trace_repository;

pub use embedding::EmbeddingProvider;
pub use language_model::{Completion, CompletionRequest, LanguageModel, PromptTask};
pub use lexical_index::{LexicalHit, LexicalIndex, SearchRequest, WeightedTerm};
pub use trace_repository::TraceRepository;
