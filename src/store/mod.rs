//! Storage contract for teams, users, pull requests and reviewer sets.
//!
//! `ReviewStore` is the capability set the review service needs from a
//! persistent store. Every invariant-deciding read and the writes that depend
//! on it go through a [`StoreUnit`]: an atomic unit opened with
//! [`ReviewStore::begin`] that persists only on [`StoreUnit::commit`].
//! Dropping a unit without committing discards all of its writes.
//!
//! Reads on `ReviewStore` itself run outside any unit and are only used to
//! shape responses.
//!
//! Two implementations exist: [`SqliteStore`] for production and
//! [`InMemoryStore`] for tests.

mod memory;
mod sqlite;

pub use memory::InMemoryStore;
pub use sqlite::{SqliteStore, SqliteUnit};

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::models::{NewPullRequest, OpenAssignment, PullRequest, PullRequestShort, TeamMember, User};

/// Errors raised by storage adapters.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Database(#[from] sqlx::Error),

    /// A row with the same key already exists.
    #[error("{entity} '{id}' already exists")]
    Duplicate { entity: &'static str, id: String },

    /// A referenced row does not exist.
    #[error("{entity} '{id}' is not present")]
    MissingReference { entity: &'static str, id: String },

    /// A bound parameter could not be encoded.
    #[error("encoding error: {0}")]
    Encoding(#[from] serde_json::Error),

    /// The unit could not be committed.
    #[error("commit failed: {0}")]
    Commit(String),
}

impl StoreError {
    pub fn duplicate(entity: &'static str, id: impl Into<String>) -> Self {
        Self::Duplicate {
            entity,
            id: id.into(),
        }
    }

    pub fn missing(entity: &'static str, id: impl Into<String>) -> Self {
        Self::MissingReference {
            entity,
            id: id.into(),
        }
    }

    /// Check if this is a uniqueness conflict.
    pub fn is_duplicate(&self) -> bool {
        matches!(self, Self::Duplicate { .. })
    }
}

/// Persistent store for the review service.
#[async_trait]
pub trait ReviewStore: Send + Sync {
    /// Atomic unit type produced by [`ReviewStore::begin`].
    type Unit: StoreUnit;

    /// Open a new atomic unit.
    async fn begin(&self) -> Result<Self::Unit, StoreError>;

    /// Members of a team ordered by user id; empty if the team is unknown.
    async fn team_members(&self, team_name: &str) -> Result<Vec<TeamMember>, StoreError>;

    async fn get_user(&self, user_id: &str) -> Result<Option<User>, StoreError>;

    /// Pull request with its current reviewer set.
    async fn get_pull_request(&self, pr_id: &str) -> Result<Option<PullRequest>, StoreError>;

    /// Pull requests where `user_id` is a reviewer, ordered by PR id.
    async fn list_user_prs(&self, user_id: &str) -> Result<Vec<PullRequestShort>, StoreError>;

    /// Number of assignments per reviewer.
    async fn assignment_counts_by_user(&self) -> Result<BTreeMap<String, i64>, StoreError>;

    /// Number of reviewers per pull request (PRs without reviewers are absent).
    async fn assignment_counts_by_pr(&self) -> Result<BTreeMap<String, i64>, StoreError>;
}

/// One all-or-nothing group of storage operations.
#[async_trait]
pub trait StoreUnit: Send {
    async fn team_exists(&mut self, team_name: &str) -> Result<bool, StoreError>;

    /// Create a team; fails with [`StoreError::Duplicate`] if the name is taken.
    async fn create_team(&mut self, team_name: &str) -> Result<(), StoreError>;

    /// Insert a user or update name, team and activity of a known one.
    async fn upsert_user(&mut self, user: &User) -> Result<(), StoreError>;

    async fn get_user(&mut self, user_id: &str) -> Result<Option<User>, StoreError>;

    /// Set the activity flag; returns the updated user, `None` if unknown.
    async fn set_user_active(
        &mut self,
        user_id: &str,
        is_active: bool,
    ) -> Result<Option<User>, StoreError>;

    /// Create an `OPEN` pull request; fails with [`StoreError::Duplicate`]
    /// if the id is taken.
    async fn create_pull_request(&mut self, pr: &NewPullRequest) -> Result<(), StoreError>;

    async fn get_pull_request(&mut self, pr_id: &str) -> Result<Option<PullRequest>, StoreError>;

    /// Mark a pull request merged at `merged_at`.
    async fn set_merged(&mut self, pr_id: &str, merged_at: DateTime<Utc>)
        -> Result<(), StoreError>;

    /// Reviewer ids of a pull request, sorted.
    async fn assigned_reviewers(&mut self, pr_id: &str) -> Result<Vec<String>, StoreError>;

    /// Ids of the active members of a team, sorted.
    async fn active_team_members(&mut self, team_name: &str) -> Result<Vec<String>, StoreError>;

    /// Add reviewers; pairs already present are left alone.
    async fn insert_reviewers(&mut self, pr_id: &str, user_ids: &[String])
        -> Result<(), StoreError>;

    /// Swap `old_user` for `new_user`; returns `false` (and changes nothing)
    /// when `old_user` was not assigned.
    async fn replace_reviewer(
        &mut self,
        pr_id: &str,
        old_user: &str,
        new_user: &str,
    ) -> Result<bool, StoreError>;

    /// Remove one reviewer; returns whether it was assigned.
    async fn delete_reviewer(&mut self, pr_id: &str, user_id: &str) -> Result<bool, StoreError>;

    /// Deactivate those `user_ids` that belong to `team_name`; returns them sorted.
    async fn deactivate_team_members(
        &mut self,
        team_name: &str,
        user_ids: &[String],
    ) -> Result<Vec<String>, StoreError>;

    /// Assignments on open PRs held by any of `user_ids`, ordered by
    /// (PR id, user id).
    async fn open_assignments_for(
        &mut self,
        user_ids: &[String],
    ) -> Result<Vec<OpenAssignment>, StoreError>;

    /// Persist every write made through this unit.
    async fn commit(self) -> Result<(), StoreError>;
}
