//! Database connection pool management
//!
//! Wraps SQLx's `SqlitePool` and applies the conflict-store schema on open.
//! File databases run in WAL mode with a small pool; in-memory databases
//! use exactly one connection because each SQLite in-memory connection is
//! its own database.

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};

use tallysync_core::config::StorageConfig;

use crate::CacheError;

const FILE_POOL_CONNECTIONS: u32 = 4;
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Pool of SQLite connections with the schema applied
pub struct DatabasePool {
    pool: SqlitePool,
}

impl DatabasePool {
    /// Opens (creating if needed) the database file at `db_path`
    ///
    /// Missing parent directories are created.
    ///
    /// # Errors
    ///
    /// Returns `CacheError::ConnectionFailed` if the directory or the
    /// connection cannot be created, or `CacheError::MigrationFailed` if the
    /// schema cannot be applied.
    pub async fn new(db_path: &Path) -> Result<Self, CacheError> {
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                CacheError::ConnectionFailed(format!(
                    "cannot create database directory {}: {e}",
                    parent.display()
                ))
            })?;
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true)
            .busy_timeout(BUSY_TIMEOUT);

        let pool = SqlitePoolOptions::new()
            .max_connections(FILE_POOL_CONNECTIONS)
            .connect_with(options)
            .await
            .map_err(|e| {
                CacheError::ConnectionFailed(format!(
                    "cannot open database at {}: {e}",
                    db_path.display()
                ))
            })?;

        Self::migrate(&pool).await?;
        tracing::info!(path = %db_path.display(), "Conflict database opened");

        Ok(Self { pool })
    }

    /// Opens the database configured in the storage section
    pub async fn from_config(config: &StorageConfig) -> Result<Self, CacheError> {
        Self::new(&config.database_path).await
    }

    /// Creates a private in-memory database, used by tests
    pub async fn in_memory() -> Result<Self, CacheError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| CacheError::ConnectionFailed(e.to_string()))?
            .foreign_keys(true);

        // The database lives only as long as its single connection
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(|e| {
                CacheError::ConnectionFailed(format!("cannot create in-memory database: {e}"))
            })?;

        Self::migrate(&pool).await?;
        tracing::debug!("In-memory conflict database ready");

        Ok(Self { pool })
    }

    /// Returns a reference to the underlying SQLite connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Closes every connection in the pool
    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Applies the schema; every statement is idempotent
    async fn migrate(pool: &SqlitePool) -> Result<(), CacheError> {
        sqlx::raw_sql(include_str!("migrations/20260301_initial.sql"))
            .execute(pool)
            .await
            .map_err(|e| CacheError::MigrationFailed(format!("initial schema: {e}")))?;

        tracing::debug!("Schema migration applied");
        Ok(())
    }
}
