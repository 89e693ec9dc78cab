//! Encoders for the dense re-rank stage.

pub mod hashing;
pub mod openai;

pub use hashing::HashingEmbedder;
pub use openai::{OpenAiEmbeddingConfig, OpenAiEmbeddingProvider};
