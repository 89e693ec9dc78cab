//! SQLite trace store.
//!
//! One row per article. The full trace is kept as JSON alongside a few
//! summary columns; triggers reject updates and deletes.

use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::RunTrace;
use crate::domain::ports::TraceRepository;

/// Trace store over a migrated `SQLite` pool.
#[derive(Clone)]
pub struct SqliteTraceRepository {
    pool: SqlitePool,
}

impl SqliteTraceRepository {
    /// Store over an already migrated `pool`.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TraceRepository for SqliteTraceRepository {
    async fn append(&self, trace: &RunTrace) -> DomainResult<()> {
        let trace_json = serde_json::to_string(trace)?;

        let result = sqlx::query(
            "INSERT INTO run_traces (article_id, run_id, termination, incomplete, iterations, records,
                started_at, finished_at, trace_json)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(article_id) DO NOTHING",
        )
        .bind(&trace.article_id)
        .bind(trace.run_id.to_string())
        .bind(trace.termination.label())
        .bind(trace.incomplete)
        .bind(i64::from(trace.iterations))
        .bind(i64::try_from(trace.ledger.len()).unwrap_or(i64::MAX))
        .bind(trace.started_at.to_rfc3339())
        .bind(trace.finished_at.to_rfc3339())
        .bind(trace_json)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DomainError::TraceAlreadyRecorded(trace.article_id.clone()));
        }
        Ok(())
    }

    async fn get(&self, article_id: &str) -> DomainResult<Option<RunTrace>> {
        let row: Option<(String,)> = sqlx::query_as("SELECT trace_json FROM run_traces WHERE article_id = ?")
            .bind(article_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|(json,)| serde_json::from_str(&json))
            .transpose()
            .map_err(DomainError::from)
    }

    async fn contains(&self, article_id: &str) -> DomainResult<bool> {
        let row: Option<(i64,)> = sqlx::query_as("SELECT 1 FROM run_traces WHERE article_id = ?")
            .bind(article_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    async fn list_article_ids(&self) -> DomainResult<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as("SELECT article_id FROM run_traces ORDER BY seq")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }
}
