//! SQLite pools for the trace store.

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

const MEMORY_URL: &str = "sqlite::memory:";

/// Failure to open a trace database.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// The database could not be opened or the pool not established.
    #[error("Failed to open trace database {path}: {source}")]
    Open {
        /// Database file, or `:memory:`.
        path: PathBuf,
        /// Underlying driver error.
        #[source]
        source: sqlx::Error,
    },
    /// The database file's parent directory could not be created.
    #[error("Failed to create directory for {path}: {source}")]
    Directory {
        /// Database file whose directory was being created.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The connection URL was rejected by the driver.
    #[error("Invalid database URL: {0}")]
    InvalidUrl(String),
}

/// Pool over the database file at `path`, created along with any missing
/// parent directories. WAL mode lets `inspect` read while a batch appends.
pub async fn create_pool(path: &Path, max_connections: u32) -> Result<SqlitePool, ConnectionError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|source| ConnectionError::Directory {
                path: path.to_path_buf(),
                source,
            })?;
    }

    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .busy_timeout(Duration::from_secs(30));

    SqlitePoolOptions::new()
        .max_connections(max_connections.max(1))
        .acquire_timeout(Duration::from_secs(3))
        .connect_with(options)
        .await
        .map_err(|source| ConnectionError::Open {
            path: path.to_path_buf(),
            source,
        })
}

/// In-memory database on a single connection; every connection to
/// `:memory:` would otherwise see its own empty database.
pub async fn create_memory_pool() -> Result<SqlitePool, ConnectionError> {
    let options = SqliteConnectOptions::from_str(MEMORY_URL)
        .map_err(|_| ConnectionError::InvalidUrl(MEMORY_URL.to_string()))?;

    SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .map_err(|source| ConnectionError::Open {
            path: PathBuf::from(":memory:"),
            source,
        })
}
