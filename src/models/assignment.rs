//! Reviewer assignment models: open assignments, reconciliation outcomes
//! and assignment statistics.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::PullRequest;

/// An assignment of a reviewer to a still-open pull request.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct OpenAssignment {
    pub pr_id: String,
    pub author_id: String,
    pub old_user_id: String,
    pub old_user_team: String,
}

/// What happened to one assignment during bulk reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReassignAction {
    /// Replaced by another active teammate.
    Replaced,
    /// Dropped because nobody was eligible.
    Removed,
}

impl std::fmt::Display for ReassignAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Replaced => write!(f, "replaced"),
            Self::Removed => write!(f, "removed"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReassignOutcome {
    pub pr_id: String,
    pub old_user_id: String,
    pub action: ReassignAction,
    /// `None` when the assignment was removed.
    pub replaced_by: Option<String>,
}

/// Result of deactivating users in bulk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkDeactivateResult {
    pub team_name: String,
    pub deactivated_user_ids: Vec<String>,
    pub reassignments: Vec<ReassignOutcome>,
}

/// Result of a single reviewer reassignment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReassignResult {
    pub pr: PullRequest,
    pub replaced_by: String,
}

/// Grouping for assignment statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatsGroupBy {
    User,
    Pr,
    #[default]
    All,
}

impl From<&str> for StatsGroupBy {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "user" => Self::User,
            "pr" => Self::Pr,
            _ => Self::All,
        }
    }
}

/// Reviewer assignment counts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignmentStats {
    /// Assignments per reviewer id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub by_user: Option<BTreeMap<String, i64>>,

    /// Reviewers per pull request id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub by_pr: Option<BTreeMap<String, i64>>,
}
