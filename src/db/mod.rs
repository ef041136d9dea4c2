//! Database layer for the relational store.
//!
//! This module handles:
//! - Connection pool management with WAL mode
//! - Schema migrations, applied once and recorded in `_migrations`

pub mod pool;

use thiserror::Error;

use crate::config::{AppConfig, ConfigError};

/// Database-related errors.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(String),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Ordered schema migrations embedded in the binary.
const MIGRATIONS: &[(&str, &str)] = &[(
    "0001_initial_schema",
    include_str!("migrations/0001_initial_schema.sql"),
)];

/// Initialize the database: create the file if needed and run migrations.
///
/// # Arguments
/// * `config` - Database path and pool settings
///
/// # Returns
/// A connection pool configured with WAL mode
pub async fn initialize(config: &AppConfig) -> Result<pool::DbPool, DbError> {
    config.validate()?;

    // Ensure parent directory exists
    if let Some(parent) = config.database_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let pool = pool::create_pool(config).await?;
    run_migrations(&pool).await?;

    log::info!(
        "Database ready at {} (max {} connections)",
        config.database_path.display(),
        config.max_connections
    );

    Ok(pool)
}

/// Run all pending database migrations.
async fn run_migrations(pool: &pool::DbPool) -> Result<(), DbError> {
    let mut conn = pool.acquire().await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS _migrations (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE,
            applied_at INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
        )
        "#,
    )
    .execute(&mut *conn)
    .await?;

    for (name, sql) in MIGRATIONS {
        let applied: Option<(i64,)> = sqlx::query_as("SELECT id FROM _migrations WHERE name = ?")
            .bind(*name)
            .fetch_optional(&mut *conn)
            .await?;

        if applied.is_some() {
            continue;
        }

        let mut tx = sqlx::Connection::begin(&mut *conn).await?;
        sqlx::raw_sql(*sql)
            .execute(&mut *tx)
            .await
            .map_err(|e| DbError::Migration(format!("{}: {}", name, e)))?;
        sqlx::query("INSERT INTO _migrations (name) VALUES (?)")
            .bind(*name)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        log::info!("Applied migration {}", name);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn config_in(dir: &tempfile::TempDir, file: &str) -> AppConfig {
        AppConfig {
            database_path: dir.path().join(file),
            ..AppConfig::default()
        }
    }

    #[tokio::test]
    async fn test_initialize_creates_database() {
        let dir = tempdir().unwrap();
        let config = config_in(&dir, "nested/test.db");

        let pool = initialize(&config).await.unwrap();
        assert!(config.database_path.exists());

        let tables: Vec<(String,)> = sqlx::query_as(
            "SELECT name FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%' AND name != '_migrations' ORDER BY name",
        )
        .fetch_all(&pool)
        .await
        .unwrap();

        let table_names: Vec<&str> = tables.iter().map(|(n,)| n.as_str()).collect();
        assert_eq!(
            table_names,
            vec!["pr_reviewers", "pull_requests", "teams", "users"]
        );
    }

    #[tokio::test]
    async fn test_migrations_are_idempotent() {
        let dir = tempdir().unwrap();
        let config = config_in(&dir, "test.db");

        let _pool1 = initialize(&config).await.unwrap();
        let pool2 = initialize(&config).await.unwrap();

        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM _migrations")
            .fetch_one(&pool2)
            .await
            .unwrap();
        assert_eq!(count.0, MIGRATIONS.len() as i64);
    }

    #[tokio::test]
    async fn test_invalid_config_is_rejected_before_opening() {
        let dir = tempdir().unwrap();
        let config = AppConfig {
            max_connections: 0,
            ..config_in(&dir, "test.db")
        };

        let err = initialize(&config).await.unwrap_err();
        assert!(matches!(err, DbError::Config(ConfigError::Invalid(_))));
        assert!(!config.database_path.exists());
    }

    #[tokio::test]
    async fn test_schema_rejects_unknown_status() {
        let dir = tempdir().unwrap();
        let pool = initialize(&config_in(&dir, "test.db")).await.unwrap();

        sqlx::query("INSERT INTO teams (team_name) VALUES ('backend')")
            .execute(&pool)
            .await
            .unwrap();
        sqlx::query("INSERT INTO users (user_id, username, team_name, is_active) VALUES ('u1', 'Alice', 'backend', 1)")
            .execute(&pool)
            .await
            .unwrap();

        let result = sqlx::query(
            "INSERT INTO pull_requests (pr_id, pr_name, author_id, status, created_at) VALUES ('pr-1', 'x', 'u1', 'CLOSED', '2024-01-01T00:00:00Z')",
        )
        .execute(&pool)
        .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_foreign_keys_restrict_deletion() {
        let dir = tempdir().unwrap();
        let pool = initialize(&config_in(&dir, "test.db")).await.unwrap();

        sqlx::query("INSERT INTO teams (team_name) VALUES ('backend')")
            .execute(&pool)
            .await
            .unwrap();
        sqlx::query("INSERT INTO users (user_id, username, team_name, is_active) VALUES ('u1', 'Alice', 'backend', 1)")
            .execute(&pool)
            .await
            .unwrap();

        let result = sqlx::query("DELETE FROM teams WHERE team_name = 'backend'")
            .execute(&pool)
            .await;
        assert!(result.is_err());
    }
}
