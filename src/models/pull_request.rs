//! Pull request model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Lifecycle status of a pull request.
///
/// `Open` is initial and `Merged` is terminal; there is no way back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PrStatus {
    Open,
    Merged,
}

impl From<&str> for PrStatus {
    fn from(s: &str) -> Self {
        match s.to_uppercase().as_str() {
            "MERGED" => Self::Merged,
            _ => Self::Open,
        }
    }
}

impl std::fmt::Display for PrStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Open => write!(f, "OPEN"),
            Self::Merged => write!(f, "MERGED"),
        }
    }
}

/// Input for creating a pull request.
#[derive(Debug, Clone)]
pub struct NewPullRequest {
    pub pull_request_id: String,
    pub pull_request_name: String,
    pub author_id: String,
    pub created_at: DateTime<Utc>,
}

/// A pull request with its resolved reviewer set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequest {
    pub pull_request_id: String,
    pub pull_request_name: String,
    pub author_id: String,
    pub status: PrStatus,

    /// Reviewer user ids, sorted.
    pub assigned_reviewers: Vec<String>,

    #[serde(rename = "createdAt", skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,

    /// Set once, when the PR is merged.
    #[serde(rename = "mergedAt", skip_serializing_if = "Option::is_none")]
    pub merged_at: Option<DateTime<Utc>>,
}

impl PullRequest {
    /// Check if the PR is merged.
    pub fn is_merged(&self) -> bool {
        self.status == PrStatus::Merged
    }

    /// Check if `user_id` is currently a reviewer.
    pub fn has_reviewer(&self, user_id: &str) -> bool {
        self.assigned_reviewers.iter().any(|r| r == user_id)
    }
}

/// Pull request row as stored, without reviewers.
#[derive(Debug, Clone, FromRow)]
pub struct PullRequestRow {
    pub pr_id: String,
    pub pr_name: String,
    pub author_id: String,
    /// `OPEN` or `MERGED`.
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub merged_at: Option<DateTime<Utc>>,
}

impl PullRequestRow {
    /// Attach the reviewer set, producing the full model.
    pub fn with_reviewers(self, mut reviewers: Vec<String>) -> PullRequest {
        reviewers.sort();
        PullRequest {
            pull_request_id: self.pr_id,
            pull_request_name: self.pr_name,
            author_id: self.author_id,
            status: PrStatus::from(self.status.as_str()),
            assigned_reviewers: reviewers,
            created_at: Some(self.created_at),
            merged_at: self.merged_at,
        }
    }
}

/// Compact pull request listing entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequestShort {
    pub pull_request_id: String,
    pub pull_request_name: String,
    pub author_id: String,
    pub status: PrStatus,
}

impl From<PullRequestRow> for PullRequestShort {
    fn from(row: PullRequestRow) -> Self {
        Self {
            status: PrStatus::from(row.status.as_str()),
            pull_request_id: row.pr_id,
            pull_request_name: row.pr_name,
            author_id: row.author_id,
        }
    }
}
