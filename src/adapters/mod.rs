//! Concrete collaborators behind the domain ports.

pub mod embeddings;
pub mod jsonl;
pub mod lexical;
pub mod llm;
pub mod sqlite;

pub use embeddings::{HashingEmbedder, OpenAiEmbeddingConfig, OpenAiEmbeddingProvider};
pub use jsonl::JsonlTraceRepository;
pub use lexical::{Bm25Index, CorpusSegment};
pub use llm::{OpenAiCompatibleModel, ScriptedLanguageModel};
pub use sqlite::SqliteTraceRepository;
