//! SQLite persistence.

pub mod connection;
pub mod migrations;
pub mod trace_repository;

pub use connection::{create_memory_pool, create_pool, ConnectionError};
pub use migrations::{all_embedded_migrations, Migration, MigrationError, Migrator};
pub use trace_repository::SqliteTraceRepository;

use sqlx::SqlitePool;

/// Failure to prepare the trace database.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    /// The database could not be opened.
    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),
    /// The schema could not be brought up to date.
    #[error("Migration error: {0}")]
    Migration(#[from] MigrationError),
}

/// Open (creating if needed) and migrate the trace database at `path`.
pub async fn initialize_database(path: &std::path::Path) -> Result<SqlitePool, DatabaseError> {
    let pool = create_pool(path, 4).await?;
    Migrator::new(pool.clone()).run(&all_embedded_migrations()).await?;
    Ok(pool)
}

/// In-memory database with all migrations applied.
pub async fn create_migrated_memory_pool() -> Result<SqlitePool, DatabaseError> {
    let pool = create_memory_pool().await?;
    Migrator::new(pool.clone()).run(&all_embedded_migrations()).await?;
    Ok(pool)
}
