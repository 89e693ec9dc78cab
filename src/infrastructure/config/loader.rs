//! Layered configuration loading and validation.

use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use std::path::Path;
use thiserror::Error;

use crate::domain::models::config::{Config, DuplicatePolicy};
use crate::domain::models::MAX_SELECTED_PER_QUERY;

/// Configuration error types
#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    /// `run.max_iterations` is zero.
    #[error("Invalid max_iterations: {0}. Must be at least 1")]
    InvalidMaxIterations(u32),

    /// A size or count that must be positive is zero.
    #[error("Invalid {0}: must be at least 1")]
    ZeroSize(&'static str),

    /// The semantic filter would see every lexical candidate or more.
    #[error("Invalid rerank_top_n: {top_n}. Must be less than lexical_top_k ({top_k})")]
    RerankExceedsCandidates {
        /// Configured `rerank_top_n`.
        top_n: usize,
        /// Configured `lexical_top_k`.
        top_k: usize,
    },

    /// `retrieval.max_selected` exceeds the per-query selection cap.
    #[error("Invalid max_selected: {0}. Must be at most {MAX_SELECTED_PER_QUERY}")]
    SelectionLimitTooLarge(usize),

    /// A threshold or weight lies outside `[0, 1]`.
    #[error("Invalid {name}: {value}. Must be between 0 and 1")]
    OutOfUnitRange {
        /// Dotted key of the setting.
        name: &'static str,
        /// Rejected value.
        value: f32,
    },

    /// `rate_limit.requests_per_second` is not positive.
    #[error("Invalid rate limit: {0}. Must be positive")]
    InvalidRateLimit(f64),

    /// `rate_limit.burst_size` is zero.
    #[error("Invalid burst_size: {0}. Must be at least 1")]
    InvalidBurstSize(u32),

    /// `retry.max_attempts` is zero.
    #[error("Invalid max_attempts: {0}. Cannot be 0")]
    InvalidMaxAttempts(u32),

    /// The initial backoff is not below the maximum.
    #[error(
        "Invalid backoff configuration: initial_backoff_ms ({0}) must be less than max_backoff_ms ({1})"
    )]
    InvalidBackoff(u64, u64),

    /// Unknown `logging.level`.
    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    /// Unknown `logging.format`.
    #[error("Invalid log format: {0}. Must be one of: json, pretty")]
    InvalidLogFormat(String),

    /// Unknown `logging.rotation`.
    #[error("Invalid log rotation: {0}. Must be one of: daily, hourly, never")]
    InvalidRotation(String),

    /// Any other invalid setting.
    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// Configuration loader with hierarchical merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from `.credence/` in the working directory.
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults
    /// 2. `.credence/config.yaml`
    /// 3. `.credence/local.yaml` (optional overrides)
    /// 4. Environment variables (`CREDENCE_*`, `__` separates nested keys)
    pub fn load() -> Result<Config> {
        Self::load_from_dir(".credence")
    }

    /// Same hierarchy as [`load`](Self::load), rooted at `dir`.
    pub fn load_from_dir(dir: impl AsRef<Path>) -> Result<Config> {
        let dir = dir.as_ref();
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(dir.join("config.yaml")))
            .merge(Yaml::file(dir.join("local.yaml")))
            .merge(Env::prefixed("CREDENCE_").split("__"))
            .extract()
            .context("Failed to extract configuration from figment")?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific file; environment overrides still
    /// apply.
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Config> {
        let path = path.as_ref();
        if !path.exists() {
            anyhow::bail!("Config file not found: {}", path.display());
        }
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(path))
            .merge(Env::prefixed("CREDENCE_").split("__"))
            .extract()
            .with_context(|| format!("Failed to load config from {}", path.display()))?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Validate configuration after loading
    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        let run = &config.run;
        if run.max_iterations == 0 {
            return Err(ConfigError::InvalidMaxIterations(run.max_iterations));
        }
        non_zero("run.initial_batch_size", run.initial_batch_size)?;
        non_zero("run.follow_up_batch_size", run.follow_up_batch_size)?;
        non_zero("run.max_parallel_articles", run.max_parallel_articles)?;
        non_zero("run.max_parallel_retrievals", run.max_parallel_retrievals)?;
        unit_range("run.query_similarity_threshold", run.query_similarity_threshold)?;

        let retrieval = &config.retrieval;
        non_zero("retrieval.lexical_top_k", retrieval.lexical_top_k)?;
        non_zero("retrieval.rerank_top_n", retrieval.rerank_top_n)?;
        non_zero("retrieval.max_selected", retrieval.max_selected)?;
        if retrieval.max_selected > MAX_SELECTED_PER_QUERY {
            return Err(ConfigError::SelectionLimitTooLarge(retrieval.max_selected));
        }
        if retrieval.rerank_top_n >= retrieval.lexical_top_k {
            return Err(ConfigError::RerankExceedsCandidates {
                top_n: retrieval.rerank_top_n,
                top_k: retrieval.lexical_top_k,
            });
        }
        unit_range(
            "retrieval.feedback.original_query_weight",
            retrieval.feedback.original_query_weight,
        )?;
        if let DuplicatePolicy::TextOverlap { threshold } = retrieval.duplicate_policy {
            unit_range("retrieval.duplicate_policy.threshold", threshold)?;
        }
        if retrieval.bm25.k1 < 0.0 || !(0.0..=1.0).contains(&retrieval.bm25.b) {
            return Err(ConfigError::ValidationFailed(format!(
                "bm25 parameters out of range: k1 = {}, b = {}",
                retrieval.bm25.k1, retrieval.bm25.b
            )));
        }

        if let Some(max_chars) = config.llm.retry_input_max_chars {
            non_zero("llm.retry_input_max_chars", max_chars)?;
        }

        non_zero("embedding.dimension", config.embedding.dimension)?;

        let output = &config.output;
        non_zero("output.question_count", output.question_count)?;
        non_zero("output.question_max_chars", output.question_max_chars)?;
        non_zero("output.report_word_limit", output.report_word_limit)?;

        if config.trace.path.as_os_str().is_empty() {
            return Err(ConfigError::ValidationFailed("trace.path cannot be empty".to_string()));
        }

        // Validate rate_limit
        if config.rate_limit.requests_per_second <= 0.0 {
            return Err(ConfigError::InvalidRateLimit(config.rate_limit.requests_per_second));
        }
        if config.rate_limit.burst_size == 0 {
            return Err(ConfigError::InvalidBurstSize(config.rate_limit.burst_size));
        }

        // Validate retry config
        if config.retry.max_attempts == 0 {
            return Err(ConfigError::InvalidMaxAttempts(config.retry.max_attempts));
        }
        if config.retry.initial_backoff_ms >= config.retry.max_backoff_ms {
            return Err(ConfigError::InvalidBackoff(
                config.retry.initial_backoff_ms,
                config.retry.max_backoff_ms,
            ));
        }

        // Validate logging config
        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&config.logging.level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }
        let valid_log_formats = ["json", "pretty"];
        if !valid_log_formats.contains(&config.logging.format.as_str()) {
            return Err(ConfigError::InvalidLogFormat(config.logging.format.clone()));
        }
        let valid_rotations = ["daily", "hourly", "never"];
        if !valid_rotations.contains(&config.logging.rotation.as_str()) {
            return Err(ConfigError::InvalidRotation(config.logging.rotation.clone()));
        }

        Ok(())
    }
}

fn non_zero(name: &'static str, value: usize) -> Result<(), ConfigError> {
    if value == 0 {
        return Err(ConfigError::ZeroSize(name));
    }
    Ok(())
}

fn unit_range(name: &'static str, value: f32) -> Result<(), ConfigError> {
    if !(0.0..=1.0).contains(&value) {
        return Err(ConfigError::OutOfUnitRange { name, value });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::config::{EmbeddingProviderKind, TraceBackend};
    use std::io::Write;
    use tempfile::{NamedTempFile, TempDir};

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.run.max_iterations, 5);
        assert_eq!(config.retrieval.lexical_top_k, 100);
        assert_eq!(config.retrieval.rerank_top_n, 10);
        assert_eq!(config.retrieval.max_selected, 3);
        assert_eq!(config.logging.level, "info");
        ConfigLoader::validate(&config).expect("Default config should be valid");
    }

    #[test]
    fn test_yaml_parsing() {
        let yaml = r"
llm:
  model: gpt-4o-mini
embedding:
  provider: openai
  dimension: 1536
retrieval:
  lexical_top_k: 50
  duplicate_policy:
    kind: text_overlap
    threshold: 0.9
run:
  max_iterations: 3
  wall_clock_budget_secs: 600
trace:
  backend: sqlite
  path: traces.db
";
        let config: Config = serde_yaml::from_str(yaml).expect("YAML should parse");

        assert_eq!(config.llm.model, "gpt-4o-mini");
        assert_eq!(config.embedding.provider, EmbeddingProviderKind::Openai);
        assert_eq!(config.retrieval.lexical_top_k, 50);
        assert_eq!(
            config.retrieval.duplicate_policy,
            DuplicatePolicy::TextOverlap { threshold: 0.9 }
        );
        assert_eq!(config.run.max_iterations, 3);
        assert_eq!(config.run.wall_clock_budget_secs, Some(600));
        assert_eq!(config.trace.backend, TraceBackend::Sqlite);
        assert_eq!(config.retrieval.rerank_top_n, 10, "unset fields keep defaults");

        ConfigLoader::validate(&config).expect("Parsed config should be valid");
    }

    #[test]
    fn test_validate_zero_iterations() {
        let mut config = Config::default();
        config.run.max_iterations = 0;
        assert_eq!(ConfigLoader::validate(&config), Err(ConfigError::InvalidMaxIterations(0)));
    }

    #[test]
    fn test_validate_zero_batch_size() {
        let mut config = Config::default();
        config.run.follow_up_batch_size = 0;
        assert_eq!(
            ConfigLoader::validate(&config),
            Err(ConfigError::ZeroSize("run.follow_up_batch_size"))
        );
    }

    #[test]
    fn test_validate_rerank_larger_than_candidates() {
        let mut config = Config::default();
        config.retrieval.lexical_top_k = 5;
        assert_eq!(
            ConfigLoader::validate(&config),
            Err(ConfigError::RerankExceedsCandidates { top_n: 10, top_k: 5 })
        );
    }

    #[test]
    fn test_validate_rerank_equal_to_candidates() {
        let mut config = Config::default();
        config.retrieval.lexical_top_k = 10;
        config.retrieval.rerank_top_n = 10;
        assert_eq!(
            ConfigLoader::validate(&config),
            Err(ConfigError::RerankExceedsCandidates { top_n: 10, top_k: 10 })
        );

        config.retrieval.rerank_top_n = 9;
        assert!(ConfigLoader::validate(&config).is_ok());
    }

    #[test]
    fn test_validate_selection_limit() {
        let mut config = Config::default();
        config.retrieval.max_selected = 5;
        assert_eq!(
            ConfigLoader::validate(&config),
            Err(ConfigError::SelectionLimitTooLarge(5))
        );

        config.retrieval.max_selected = 0;
        assert_eq!(
            ConfigLoader::validate(&config),
            Err(ConfigError::ZeroSize("retrieval.max_selected"))
        );

        config.retrieval.max_selected = MAX_SELECTED_PER_QUERY;
        assert!(ConfigLoader::validate(&config).is_ok());
    }

    #[test]
    fn test_validate_retry_input_budget() {
        let mut config = Config::default();
        config.llm.retry_input_max_chars = Some(0);
        assert_eq!(
            ConfigLoader::validate(&config),
            Err(ConfigError::ZeroSize("llm.retry_input_max_chars"))
        );

        config.llm.retry_input_max_chars = None;
        assert!(ConfigLoader::validate(&config).is_ok());
    }

    #[test]
    fn test_validate_similarity_threshold_range() {
        let mut config = Config::default();
        config.run.query_similarity_threshold = 1.5;
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::OutOfUnitRange { name: "run.query_similarity_threshold", .. })
        ));
    }

    #[test]
    fn test_validate_zero_rate_limit() {
        let mut config = Config::default();
        config.rate_limit.requests_per_second = 0.0;
        assert!(matches!(ConfigLoader::validate(&config), Err(ConfigError::InvalidRateLimit(_))));
    }

    #[test]
    fn test_validate_invalid_backoff() {
        let mut config = Config::default();
        config.retry.initial_backoff_ms = 30_000;
        config.retry.max_backoff_ms = 1_000;
        assert_eq!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidBackoff(30_000, 1_000))
        );
    }

    #[test]
    fn test_validate_zero_attempts() {
        let mut config = Config::default();
        config.retry.max_attempts = 0;
        assert_eq!(ConfigLoader::validate(&config), Err(ConfigError::InvalidMaxAttempts(0)));
    }

    #[test]
    fn test_validate_invalid_log_level() {
        let mut config = Config::default();
        config.logging.level = "verbose".to_string();
        assert_eq!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidLogLevel("verbose".to_string()))
        );
    }

    #[test]
    fn test_validate_invalid_log_format() {
        let mut config = Config::default();
        config.logging.format = "xml".to_string();
        assert!(matches!(ConfigLoader::validate(&config), Err(ConfigError::InvalidLogFormat(_))));
    }

    #[test]
    fn test_hierarchical_merging() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("config.yaml"),
            "run:\n  max_iterations: 4\nlogging:\n  level: info\n  format: json\n",
        )
        .unwrap();
        std::fs::write(dir.path().join("local.yaml"), "logging:\n  level: debug\n").unwrap();

        let config = temp_env::with_vars_unset(
            ["CREDENCE_RUN__MAX_ITERATIONS", "CREDENCE_LOGGING__LEVEL"],
            || ConfigLoader::load_from_dir(dir.path()).unwrap(),
        );

        assert_eq!(config.run.max_iterations, 4);
        assert_eq!(config.logging.level, "debug", "local overrides project config");
        assert_eq!(config.logging.format, "json", "base value persists when not overridden");
    }

    #[test]
    fn test_env_override() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("config.yaml"), "run:\n  max_iterations: 4\n").unwrap();

        let config = temp_env::with_vars(
            [
                ("CREDENCE_RUN__MAX_ITERATIONS", Some("2")),
                ("CREDENCE_LLM__MODEL", Some("qwen2.5:32b")),
            ],
            || ConfigLoader::load_from_dir(dir.path()).unwrap(),
        );

        assert_eq!(config.run.max_iterations, 2);
        assert_eq!(config.llm.model, "qwen2.5:32b");
    }

    #[test]
    fn test_load_from_file_rejects_invalid() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "retry:\n  max_attempts: 0").unwrap();
        file.flush().unwrap();

        let err = temp_env::with_var_unset("CREDENCE_RETRY__MAX_ATTEMPTS", || {
            ConfigLoader::load_from_file(file.path()).unwrap_err()
        });
        assert!(err.to_string().contains("max_attempts"));
    }

    #[test]
    fn test_load_from_missing_file() {
        assert!(ConfigLoader::load_from_file("/definitely/not/here.yaml").is_err());
    }
}
