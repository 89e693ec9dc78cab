//! Domain errors for the credence evidence pipeline.

use thiserror::Error;

/// Failure reported by an external collaborator (language model, lexical
/// index, embedding service).
///
/// Every port returns this type so the retry layer can classify failures
/// without knowing which backend produced them.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BackendError {
    /// Rate limits, 5xx responses, timeouts, dropped connections.
    #[error("transient backend failure: {0}")]
    Transient(String),

    /// Authentication failures, invalid requests, missing resources.
    #[error("permanent backend failure: {0}")]
    Permanent(String),

    /// The backend answered but the output could not be parsed into the
    /// expected structure.
    #[error("malformed backend output: {0}")]
    Malformed(String),
}

impl BackendError {
    /// Whether another attempt may succeed.
    ///
    /// Malformed output is retried: a structured-output model frequently
    /// produces valid JSON on the next attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_) | Self::Malformed(_))
    }

    /// Classify an HTTP status code returned by a backend.
    pub fn from_status(status: u16, body: impl Into<String>) -> Self {
        let body = body.into();
        match status {
            408 | 429 | 500 | 502 | 503 | 504 | 529 => {
                Self::Transient(format!("HTTP {status}: {body}"))
            }
            _ => Self::Permanent(format!("HTTP {status}: {body}")),
        }
    }
}

impl From<reqwest::Error> for BackendError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() || err.is_request() {
            Self::Transient(err.to_string())
        } else if err.is_decode() {
            Self::Malformed(err.to_string())
        } else {
            match err.status() {
                Some(status) => Self::from_status(status.as_u16(), err.to_string()),
                None => Self::Transient(err.to_string()),
            }
        }
    }
}

/// Domain-level errors raised by the evidence pipeline.
#[derive(Debug, Error)]
pub enum DomainError {
    /// Query, question or report generation failed after retries.
    #[error("Generation failed: {0}")]
    Generation(String),

    /// A retrieval stage failed for one query.
    #[error("Retrieval failed: {0}")]
    Retrieval(String),

    /// The sufficiency evaluator failed after retries.
    #[error("Evaluation failed: {0}")]
    Evaluation(String),

    /// The per-article wall-clock or call budget ran out.
    #[error("Run budget exceeded: {0}")]
    BudgetExceeded(String),

    /// A ledger write would break one of its invariants.
    #[error("Ledger invariant violated: {0}")]
    InvariantViolation(String),

    /// A trace for this article was already persisted.
    #[error("Trace already recorded for article {0}")]
    TraceAlreadyRecorded(String),

    /// A requested record does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Input data is malformed.
    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    /// The trace store failed.
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// A record could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl DomainError {
    /// Errors that terminate an article's run (as opposed to being recorded
    /// against a single query).
    pub fn is_run_fatal(&self) -> bool {
        matches!(self, Self::Generation(_) | Self::Evaluation(_) | Self::InvariantViolation(_))
    }
}

/// Result alias for domain operations.
pub type DomainResult<T> = Result<T, DomainError>;

impl From<sqlx::Error> for DomainError {
    fn from(err: sqlx::Error) -> Self {
        DomainError::Persistence(err.to_string())
    }
}

impl From<serde_json::Error> for DomainError {
    fn from(err: serde_json::Error) -> Self {
        DomainError::SerializationError(err.to_string())
    }
}

impl From<std::io::Error> for DomainError {
    fn from(err: std::io::Error) -> Self {
        DomainError::Persistence(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert!(matches!(BackendError::from_status(429, "slow down"), BackendError::Transient(_)));
        assert!(matches!(BackendError::from_status(503, ""), BackendError::Transient(_)));
        assert!(matches!(BackendError::from_status(529, ""), BackendError::Transient(_)));
        assert!(matches!(BackendError::from_status(401, "bad key"), BackendError::Permanent(_)));
        assert!(matches!(BackendError::from_status(400, ""), BackendError::Permanent(_)));
    }

    #[test]
    fn test_retryable() {
        assert!(BackendError::Transient("x".into()).is_retryable());
        assert!(BackendError::Malformed("x".into()).is_retryable());
        assert!(!BackendError::Permanent("x".into()).is_retryable());
    }

    #[test]
    fn test_run_fatal_classification() {
        assert!(DomainError::Generation("x".into()).is_run_fatal());
        assert!(DomainError::Evaluation("x".into()).is_run_fatal());
        assert!(!DomainError::Retrieval("x".into()).is_run_fatal());
        assert!(!DomainError::BudgetExceeded("x".into()).is_run_fatal());
    }
}
