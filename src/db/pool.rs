//! SQLite connection pool with WAL mode.
//!
//! The pool is the only process-wide resource of the service. It is created
//! once at startup and closed explicitly on shutdown.

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Pool, Sqlite};
use std::time::Duration;

use crate::config::AppConfig;

/// Type alias for the SQLite connection pool.
pub type DbPool = Pool<Sqlite>;

/// Create a new connection pool with WAL mode enabled.
///
/// # Arguments
/// * `config` - Database path, pool bounds and timeouts
///
/// # Returns
/// A connection pool ready for use
pub async fn create_pool(config: &AppConfig) -> Result<DbPool, sqlx::Error> {
    let connect_options = SqliteConnectOptions::new()
        .filename(&config.database_path)
        // Create the database file if it doesn't exist
        .create_if_missing(true)
        // Enable WAL mode for concurrent access
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        // Reviewer and membership rows reference teams, users and PRs
        .foreign_keys(true)
        // Atomic units wait for the write lock instead of failing
        .busy_timeout(Duration::from_secs(config.busy_timeout_secs));

    let pool = SqlitePoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
        .connect_with(connect_options)
        .await?;

    // Verify WAL mode is enabled
    let mode: (String,) = sqlx::query_as("PRAGMA journal_mode")
        .fetch_one(&pool)
        .await?;

    debug_assert!(
        mode.0.to_lowercase() == "wal",
        "WAL mode should be enabled, got: {}",
        mode.0
    );

    Ok(pool)
}
