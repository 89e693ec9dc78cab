//! Embedded schema migrations.

use sqlx::{Executor, SqlitePool};
use thiserror::Error;
use tracing::info;

/// Schema migration failure.
#[derive(Debug, Error)]
pub enum MigrationError {
    /// A migration's SQL failed; the schema stays at the previous version.
    #[error("Failed to execute migration {version}: {source}")]
    ExecutionError {
        /// Version of the failing migration.
        version: i64,
        /// Underlying driver error.
        #[source]
        source: sqlx::Error,
    },
    /// The recorded schema version could not be read.
    #[error("Failed to get schema version: {0}")]
    VersionCheckError(#[source] sqlx::Error),
}

/// One versioned schema change.
#[derive(Debug, Clone)]
pub struct Migration {
    /// Strictly increasing version number.
    pub version: i64,
    /// Short summary, logged when applied.
    pub description: &'static str,
    /// Statements to execute.
    pub sql: &'static str,
}

/// Applies [`Migration`]s to a pool.
pub struct Migrator {
    pool: SqlitePool,
}

impl Migrator {
    /// Migrator over `pool`.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Apply migrations newer than the recorded schema version. Returns how
    /// many were applied.
    pub async fn run(&self, migrations: &[Migration]) -> Result<usize, MigrationError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL DEFAULT (datetime('now')),
                description TEXT
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(|source| MigrationError::ExecutionError { version: 0, source })?;

        let current = self.current_version().await?;
        let mut applied = 0;
        for migration in migrations.iter().filter(|m| m.version > current) {
            self.apply(migration).await?;
            applied += 1;
        }
        if applied > 0 {
            info!(applied, "applied schema migrations");
        }
        Ok(applied)
    }

    /// Highest applied version, 0 for a fresh database.
    pub async fn current_version(&self) -> Result<i64, MigrationError> {
        let row: Option<(i64,)> = sqlx::query_as("SELECT COALESCE(MAX(version), 0) FROM schema_migrations")
            .fetch_optional(&self.pool)
            .await
            .map_err(MigrationError::VersionCheckError)?;
        Ok(row.map_or(0, |(v,)| v))
    }

    async fn apply(&self, migration: &Migration) -> Result<(), MigrationError> {
        let version = migration.version;
        self.pool
            .execute(migration.sql)
            .await
            .map_err(|source| MigrationError::ExecutionError { version, source })?;
        sqlx::query("INSERT INTO schema_migrations (version, description) VALUES (?, ?)")
            .bind(version)
            .bind(migration.description)
            .execute(&self.pool)
            .await
            .map_err(|source| MigrationError::ExecutionError { version, source })?;
        Ok(())
    }
}

/// Migrations compiled into the binary, in version order.
pub fn all_embedded_migrations() -> Vec<Migration> {
    vec![Migration {
        version: 1,
        description: "Run traces",
        sql: include_str!("../../../migrations/001_run_traces.sql"),
    }]
}
