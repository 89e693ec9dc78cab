//! Wiring of configured adapters for CLI commands.

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;

use crate::adapters::embeddings::{HashingEmbedder, OpenAiEmbeddingConfig, OpenAiEmbeddingProvider};
use crate::adapters::jsonl::JsonlTraceRepository;
use crate::adapters::lexical::Bm25Index;
use crate::adapters::llm::OpenAiCompatibleModel;
use crate::adapters::sqlite::{initialize_database, SqliteTraceRepository};
use crate::domain::models::{Article, Config, EmbeddingProviderKind, TraceBackend};
use crate::domain::ports::{EmbeddingProvider, LanguageModel, LexicalIndex, TraceRepository};
use crate::infrastructure::config::ConfigLoader;

/// Explicit file if given, else the `.credence/` hierarchy.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => ConfigLoader::load_from_file(path),
        None => ConfigLoader::load(),
    }
}

/// Trace store for the configured backend, migrated if SQLite.
pub async fn open_trace_repository(config: &Config) -> Result<Arc<dyn TraceRepository>> {
    let path = &config.trace.path;
    let repository: Arc<dyn TraceRepository> = match config.trace.backend {
        TraceBackend::Jsonl => Arc::new(
            JsonlTraceRepository::open(path.clone())
                .await
                .with_context(|| format!("Failed to open trace file {}", path.display()))?,
        ),
        TraceBackend::Sqlite => {
            let pool = initialize_database(path)
                .await
                .with_context(|| format!("Failed to open trace database {}", path.display()))?;
            Arc::new(SqliteTraceRepository::new(pool))
        }
    };
    Ok(repository)
}

/// Language model client for the configured endpoint.
pub fn build_model(config: &Config) -> Result<Arc<dyn LanguageModel>> {
    let model = OpenAiCompatibleModel::from_config(&config.llm).context("Failed to build chat client")?;
    Ok(Arc::new(model))
}

/// Dense encoder chosen by `embedding.provider`.
pub fn build_embedder(config: &Config) -> Result<Arc<dyn EmbeddingProvider>> {
    let embedding = &config.embedding;
    let embedder: Arc<dyn EmbeddingProvider> = match embedding.provider {
        EmbeddingProviderKind::Hashing => Arc::new(HashingEmbedder::new(embedding.dimension)),
        EmbeddingProviderKind::Openai => {
            let provider = OpenAiEmbeddingProvider::new(OpenAiEmbeddingConfig {
                base_url: embedding.base_url.clone().unwrap_or_else(|| config.llm.base_url.clone()),
                model: embedding.model.clone(),
                dimension: embedding.dimension,
                api_key: std::env::var(&config.llm.api_key_env).ok().filter(|k| !k.is_empty()),
                timeout_secs: config.llm.timeout_secs,
                ..OpenAiEmbeddingConfig::default()
            })
            .context("Failed to build embedding client")?;
            Arc::new(provider)
        }
    };
    Ok(embedder)
}

/// BM25 index over the configured corpus.
pub async fn load_index(config: &Config) -> Result<Arc<dyn LexicalIndex>> {
    let path = &config.retrieval.corpus_path;
    let index = Bm25Index::load(path, config.retrieval.bm25)
        .await
        .with_context(|| format!("Failed to load segment corpus {}", path.display()))?;
    Ok(Arc::new(index))
}

/// Read a JSONL article file. Blank lines are skipped.
pub async fn read_articles(path: &Path) -> Result<Vec<Article>> {
    let contents = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read articles from {}", path.display()))?;

    contents
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(number, line)| {
            Article::from_json_line(line)
                .with_context(|| format!("{}: invalid article on line {}", path.display(), number + 1))
        })
        .collect()
}
