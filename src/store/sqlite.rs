//! SQLite-backed review store.
//!
//! Atomic units are `BEGIN IMMEDIATE` transactions: the write lock is taken
//! up front, so the reads that decide an invariant cannot be invalidated by a
//! concurrent writer before the dependent writes land.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Sqlite, SqliteConnection, Transaction};

use super::{ReviewStore, StoreError, StoreUnit};
use crate::db::pool::DbPool;
use crate::models::{
    NewPullRequest, OpenAssignment, PullRequest, PullRequestRow, PullRequestShort, TeamMember,
    User,
};

/// Statement opening every atomic unit.
const BEGIN_UNIT: &str = "BEGIN IMMEDIATE";

/// Production store over a SQLite connection pool.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: DbPool,
}

impl SqliteStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Close the pool, waiting for checked-out connections to return.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

/// Atomic unit over one SQLite transaction.
pub struct SqliteUnit {
    tx: Transaction<'static, Sqlite>,
}

async fn fetch_user(conn: &mut SqliteConnection, user_id: &str) -> Result<Option<User>, StoreError> {
    let user = sqlx::query_as::<_, User>(
        "SELECT user_id, username, team_name, is_active FROM users WHERE user_id = ?",
    )
    .bind(user_id)
    .fetch_optional(conn)
    .await?;

    Ok(user)
}

async fn fetch_reviewers(conn: &mut SqliteConnection, pr_id: &str) -> Result<Vec<String>, StoreError> {
    let rows: Vec<(String,)> =
        sqlx::query_as("SELECT user_id FROM pr_reviewers WHERE pr_id = ? ORDER BY user_id")
            .bind(pr_id)
            .fetch_all(conn)
            .await?;

    Ok(rows.into_iter().map(|(id,)| id).collect())
}

async fn fetch_pull_request(
    conn: &mut SqliteConnection,
    pr_id: &str,
) -> Result<Option<PullRequest>, StoreError> {
    let row = sqlx::query_as::<_, PullRequestRow>(
        r#"
        SELECT pr_id, pr_name, author_id, status, created_at, merged_at
        FROM pull_requests
        WHERE pr_id = ?
        "#,
    )
    .bind(pr_id)
    .fetch_optional(&mut *conn)
    .await?;

    match row {
        Some(row) => {
            let reviewers = fetch_reviewers(conn, pr_id).await?;
            Ok(Some(row.with_reviewers(reviewers)))
        }
        None => Ok(None),
    }
}

/// Id lists are bound as one JSON array parameter and expanded with
/// `json_each`, so their length is not limited by SQLite's variable cap.
fn id_list(user_ids: &[String]) -> Result<String, StoreError> {
    Ok(serde_json::to_string(user_ids)?)
}

async fn fetch_counts(pool: &DbPool, sql: &str) -> Result<BTreeMap<String, i64>, StoreError> {
    let rows: Vec<(String, i64)> = sqlx::query_as(sql).fetch_all(pool).await?;
    Ok(rows.into_iter().collect())
}

#[async_trait]
impl ReviewStore for SqliteStore {
    type Unit = SqliteUnit;

    async fn begin(&self) -> Result<SqliteUnit, StoreError> {
        let tx = self.pool.begin_with(BEGIN_UNIT).await?;
        Ok(SqliteUnit { tx })
    }

    async fn team_members(&self, team_name: &str) -> Result<Vec<TeamMember>, StoreError> {
        let members = sqlx::query_as::<_, TeamMember>(
            "SELECT user_id, username, is_active FROM users WHERE team_name = ? ORDER BY user_id",
        )
        .bind(team_name)
        .fetch_all(&self.pool)
        .await?;

        Ok(members)
    }

    async fn get_user(&self, user_id: &str) -> Result<Option<User>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        fetch_user(&mut *conn, user_id).await
    }

    async fn get_pull_request(&self, pr_id: &str) -> Result<Option<PullRequest>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        fetch_pull_request(&mut *conn, pr_id).await
    }

    async fn list_user_prs(&self, user_id: &str) -> Result<Vec<PullRequestShort>, StoreError> {
        let rows = sqlx::query_as::<_, PullRequestRow>(
            r#"
            SELECT p.pr_id, p.pr_name, p.author_id, p.status, p.created_at, p.merged_at
            FROM pull_requests p
            JOIN pr_reviewers r ON r.pr_id = p.pr_id
            WHERE r.user_id = ?
            ORDER BY p.pr_id
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(PullRequestShort::from).collect())
    }

    async fn assignment_counts_by_user(&self) -> Result<BTreeMap<String, i64>, StoreError> {
        fetch_counts(
            &self.pool,
            "SELECT user_id, COUNT(*) FROM pr_reviewers GROUP BY user_id ORDER BY user_id",
        )
        .await
    }

    async fn assignment_counts_by_pr(&self) -> Result<BTreeMap<String, i64>, StoreError> {
        fetch_counts(
            &self.pool,
            "SELECT pr_id, COUNT(*) FROM pr_reviewers GROUP BY pr_id ORDER BY pr_id",
        )
        .await
    }
}

#[async_trait]
impl StoreUnit for SqliteUnit {
    async fn team_exists(&mut self, team_name: &str) -> Result<bool, StoreError> {
        let row: Option<(i64,)> = sqlx::query_as("SELECT 1 FROM teams WHERE team_name = ?")
            .bind(team_name)
            .fetch_optional(&mut *self.tx)
            .await?;

        Ok(row.is_some())
    }

    async fn create_team(&mut self, team_name: &str) -> Result<(), StoreError> {
        let result = sqlx::query("INSERT INTO teams (team_name) VALUES (?) ON CONFLICT DO NOTHING")
            .bind(team_name)
            .execute(&mut *self.tx)
            .await?;

        if result.rows_affected() == 0 {
            log::debug!("Team insert conflicted on existing name {}", team_name);
            return Err(StoreError::duplicate("team", team_name));
        }

        Ok(())
    }

    async fn upsert_user(&mut self, user: &User) -> Result<(), StoreError> {
        if !self.team_exists(&user.team_name).await? {
            return Err(StoreError::missing("team", &user.team_name));
        }

        sqlx::query(
            r#"
            INSERT INTO users (user_id, username, team_name, is_active)
            VALUES (?, ?, ?, ?)
            ON CONFLICT (user_id) DO UPDATE SET
                username = excluded.username,
                team_name = excluded.team_name,
                is_active = excluded.is_active
            "#,
        )
        .bind(&user.user_id)
        .bind(&user.username)
        .bind(&user.team_name)
        .bind(user.is_active)
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    async fn get_user(&mut self, user_id: &str) -> Result<Option<User>, StoreError> {
        fetch_user(&mut *self.tx, user_id).await
    }

    async fn set_user_active(
        &mut self,
        user_id: &str,
        is_active: bool,
    ) -> Result<Option<User>, StoreError> {
        let result = sqlx::query("UPDATE users SET is_active = ? WHERE user_id = ?")
            .bind(is_active)
            .bind(user_id)
            .execute(&mut *self.tx)
            .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }

        fetch_user(&mut *self.tx, user_id).await
    }

    async fn create_pull_request(&mut self, pr: &NewPullRequest) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO pull_requests (pr_id, pr_name, author_id, status, created_at)
            VALUES (?, ?, ?, 'OPEN', ?)
            ON CONFLICT (pr_id) DO NOTHING
            "#,
        )
        .bind(&pr.pull_request_id)
        .bind(&pr.pull_request_name)
        .bind(&pr.author_id)
        .bind(pr.created_at)
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 0 {
            log::debug!(
                "Pull request insert conflicted on existing id {}",
                pr.pull_request_id
            );
            return Err(StoreError::duplicate("pull request", &pr.pull_request_id));
        }

        Ok(())
    }

    async fn get_pull_request(&mut self, pr_id: &str) -> Result<Option<PullRequest>, StoreError> {
        fetch_pull_request(&mut *self.tx, pr_id).await
    }

    async fn set_merged(
        &mut self,
        pr_id: &str,
        merged_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE pull_requests SET status = 'MERGED', merged_at = ? WHERE pr_id = ? AND status = 'OPEN'",
        )
        .bind(merged_at)
        .bind(pr_id)
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::missing("open pull request", pr_id));
        }

        Ok(())
    }

    async fn assigned_reviewers(&mut self, pr_id: &str) -> Result<Vec<String>, StoreError> {
        fetch_reviewers(&mut *self.tx, pr_id).await
    }

    async fn active_team_members(&mut self, team_name: &str) -> Result<Vec<String>, StoreError> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT user_id FROM users WHERE team_name = ? AND is_active = 1 ORDER BY user_id",
        )
        .bind(team_name)
        .fetch_all(&mut *self.tx)
        .await?;

        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    async fn insert_reviewers(
        &mut self,
        pr_id: &str,
        user_ids: &[String],
    ) -> Result<(), StoreError> {
        for user_id in user_ids {
            sqlx::query(
                "INSERT INTO pr_reviewers (pr_id, user_id) VALUES (?, ?) ON CONFLICT DO NOTHING",
            )
            .bind(pr_id)
            .bind(user_id)
            .execute(&mut *self.tx)
            .await?;
        }

        Ok(())
    }

    async fn replace_reviewer(
        &mut self,
        pr_id: &str,
        old_user: &str,
        new_user: &str,
    ) -> Result<bool, StoreError> {
        if !self.delete_reviewer(pr_id, old_user).await? {
            return Ok(false);
        }

        self.insert_reviewers(pr_id, &[new_user.to_string()]).await?;
        Ok(true)
    }

    async fn delete_reviewer(&mut self, pr_id: &str, user_id: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM pr_reviewers WHERE pr_id = ? AND user_id = ?")
            .bind(pr_id)
            .bind(user_id)
            .execute(&mut *self.tx)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn deactivate_team_members(
        &mut self,
        team_name: &str,
        user_ids: &[String],
    ) -> Result<Vec<String>, StoreError> {
        if user_ids.is_empty() {
            return Ok(Vec::new());
        }
        let ids = id_list(user_ids)?;

        let rows: Vec<(String,)> = sqlx::query_as(
            r#"
            SELECT user_id FROM users
            WHERE team_name = ? AND user_id IN (SELECT value FROM json_each(?))
            ORDER BY user_id
            "#,
        )
        .bind(team_name)
        .bind(&ids)
        .fetch_all(&mut *self.tx)
        .await?;

        sqlx::query(
            r#"
            UPDATE users SET is_active = 0
            WHERE team_name = ? AND user_id IN (SELECT value FROM json_each(?))
            "#,
        )
        .bind(team_name)
        .bind(&ids)
        .execute(&mut *self.tx)
        .await?;

        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    async fn open_assignments_for(
        &mut self,
        user_ids: &[String],
    ) -> Result<Vec<OpenAssignment>, StoreError> {
        if user_ids.is_empty() {
            return Ok(Vec::new());
        }

        let assignments = sqlx::query_as::<_, OpenAssignment>(
            r#"
            SELECT p.pr_id, p.author_id, u.user_id AS old_user_id, u.team_name AS old_user_team
            FROM pr_reviewers r
            JOIN pull_requests p ON p.pr_id = r.pr_id
            JOIN users u ON u.user_id = r.user_id
            WHERE p.status = 'OPEN' AND r.user_id IN (SELECT value FROM json_each(?))
            ORDER BY p.pr_id, u.user_id
            "#,
        )
        .bind(id_list(user_ids)?)
        .fetch_all(&mut *self.tx)
        .await?;

        Ok(assignments)
    }

    async fn commit(self) -> Result<(), StoreError> {
        self.tx
            .commit()
            .await
            .map_err(|e| StoreError::Commit(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use tempfile::tempdir;

    async fn test_store(dir: &tempfile::TempDir) -> SqliteStore {
        let config = AppConfig {
            database_path: dir.path().join("test.db"),
            ..AppConfig::default()
        };
        SqliteStore::new(crate::db::initialize(&config).await.unwrap())
    }

    async fn seed_team(store: &SqliteStore, team: &str, users: &[(&str, bool)]) {
        let mut unit = store.begin().await.unwrap();
        unit.create_team(team).await.unwrap();
        for (id, active) in users {
            unit.upsert_user(&User {
                user_id: id.to_string(),
                username: format!("name-{}", id),
                team_name: team.to_string(),
                is_active: *active,
            })
            .await
            .unwrap();
        }
        unit.commit().await.unwrap();
    }

    #[tokio::test]
    async fn test_duplicate_team_is_reported() {
        let dir = tempdir().unwrap();
        let store = test_store(&dir).await;
        seed_team(&store, "backend", &[]).await;

        let mut unit = store.begin().await.unwrap();
        let err = unit.create_team("backend").await.unwrap_err();
        assert!(err.is_duplicate());
    }

    #[tokio::test]
    async fn test_dropped_unit_rolls_back() {
        let dir = tempdir().unwrap();
        let store = test_store(&dir).await;

        {
            let mut unit = store.begin().await.unwrap();
            unit.create_team("backend").await.unwrap();
        }

        let mut unit = store.begin().await.unwrap();
        assert!(!unit.team_exists("backend").await.unwrap());
    }

    #[tokio::test]
    async fn test_upsert_requires_team() {
        let dir = tempdir().unwrap();
        let store = test_store(&dir).await;

        let mut unit = store.begin().await.unwrap();
        let err = unit
            .upsert_user(&User {
                user_id: "u1".into(),
                username: "Alice".into(),
                team_name: "ghost".into(),
                is_active: true,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::MissingReference { .. }));
    }

    #[tokio::test]
    async fn test_reviewer_set_operations() {
        let dir = tempdir().unwrap();
        let store = test_store(&dir).await;
        seed_team(&store, "backend", &[("u1", true), ("u2", true), ("u3", true)]).await;

        let mut unit = store.begin().await.unwrap();
        unit.create_pull_request(&NewPullRequest {
            pull_request_id: "pr-1".into(),
            pull_request_name: "Add search".into(),
            author_id: "u1".into(),
            created_at: Utc::now(),
        })
        .await
        .unwrap();
        unit.insert_reviewers("pr-1", &["u2".to_string()]).await.unwrap();

        assert!(!unit.replace_reviewer("pr-1", "u9", "u3").await.unwrap());
        assert!(unit.replace_reviewer("pr-1", "u2", "u3").await.unwrap());
        assert_eq!(unit.assigned_reviewers("pr-1").await.unwrap(), vec!["u3"]);
        unit.commit().await.unwrap();

        let pr = store.get_pull_request("pr-1").await.unwrap().unwrap();
        assert_eq!(pr.assigned_reviewers, vec!["u3"]);
        assert_eq!(store.list_user_prs("u3").await.unwrap().len(), 1);
        assert!(store.list_user_prs("u2").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_pull_request_is_reported() {
        let dir = tempdir().unwrap();
        let store = test_store(&dir).await;
        seed_team(&store, "backend", &[("u1", true)]).await;

        let new_pr = NewPullRequest {
            pull_request_id: "pr-1".into(),
            pull_request_name: "Add search".into(),
            author_id: "u1".into(),
            created_at: Utc::now(),
        };
        let mut unit = store.begin().await.unwrap();
        unit.create_pull_request(&new_pr).await.unwrap();
        let err = unit.create_pull_request(&new_pr).await.unwrap_err();
        assert!(err.is_duplicate());
    }

    #[tokio::test]
    async fn test_deactivate_only_team_members() {
        let dir = tempdir().unwrap();
        let store = test_store(&dir).await;
        seed_team(&store, "backend", &[("u1", true), ("u2", true)]).await;
        seed_team(&store, "frontend", &[("f1", true)]).await;

        let mut unit = store.begin().await.unwrap();
        let ids = vec!["u2".to_string(), "f1".to_string(), "nobody".to_string()];
        let deactivated = unit.deactivate_team_members("backend", &ids).await.unwrap();
        unit.commit().await.unwrap();

        assert_eq!(deactivated, vec!["u2"]);
        assert!(!store.get_user("u2").await.unwrap().unwrap().is_active);
        assert!(store.get_user("f1").await.unwrap().unwrap().is_active);
    }

    #[tokio::test]
    async fn test_bulk_lookups_accept_long_id_lists() {
        let dir = tempdir().unwrap();
        let store = test_store(&dir).await;
        seed_team(&store, "backend", &[("u1", true), ("u2", true)]).await;

        let mut unit = store.begin().await.unwrap();
        unit.create_pull_request(&NewPullRequest {
            pull_request_id: "pr-1".into(),
            pull_request_name: "Add search".into(),
            author_id: "u1".into(),
            created_at: Utc::now(),
        })
        .await
        .unwrap();
        unit.insert_reviewers("pr-1", &["u2".to_string()]).await.unwrap();

        // More ids than SQLite allows bound variables in one statement
        let mut ids: Vec<String> = (0..40_000).map(|i| format!("ghost-{}", i)).collect();
        ids.push("u2".to_string());

        let deactivated = unit.deactivate_team_members("backend", &ids).await.unwrap();
        assert_eq!(deactivated, vec!["u2"]);

        let assignments = unit.open_assignments_for(&ids).await.unwrap();
        assert_eq!(assignments.len(), 1);
        assert_eq!(assignments[0].old_user_id, "u2");
        assert_eq!(assignments[0].old_user_team, "backend");
    }
}
