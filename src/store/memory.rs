//! In-memory implementation of `ReviewStore`.
//!
//! All state is held in memory and lost on restart. A unit holds the store
//! lock for its whole lifetime and works on a private copy of the state,
//! which replaces the shared state on commit. Units are therefore fully
//! serialized.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::{ReviewStore, StoreError, StoreUnit};
use crate::models::{
    NewPullRequest, OpenAssignment, PrStatus, PullRequest, PullRequestShort, TeamMember, User,
};

#[derive(Debug, Clone)]
struct PrRecord {
    name: String,
    author_id: String,
    status: PrStatus,
    created_at: DateTime<Utc>,
    merged_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default)]
struct MemoryState {
    teams: BTreeSet<String>,
    users: BTreeMap<String, User>,
    pull_requests: BTreeMap<String, PrRecord>,
    /// (pr_id, user_id) pairs.
    reviewers: BTreeSet<(String, String)>,
}

impl MemoryState {
    fn reviewers_of(&self, pr_id: &str) -> Vec<String> {
        self.reviewers
            .iter()
            .filter(|(pr, _)| pr == pr_id)
            .map(|(_, user)| user.clone())
            .collect()
    }

    fn pull_request(&self, pr_id: &str) -> Option<PullRequest> {
        self.pull_requests.get(pr_id).map(|record| PullRequest {
            pull_request_id: pr_id.to_string(),
            pull_request_name: record.name.clone(),
            author_id: record.author_id.clone(),
            status: record.status,
            assigned_reviewers: self.reviewers_of(pr_id),
            created_at: Some(record.created_at),
            merged_at: record.merged_at,
        })
    }

    fn team_members(&self, team_name: &str) -> Vec<TeamMember> {
        self.users
            .values()
            .filter(|u| u.team_name == team_name)
            .map(|u| TeamMember::new(&u.user_id, &u.username, u.is_active))
            .collect()
    }
}

/// In-memory review store for tests.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    state: Arc<Mutex<MemoryState>>,
    fail_next_commit: Arc<AtomicBool>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next [`StoreUnit::commit`] fail, discarding that unit's writes.
    pub fn fail_next_commit(&self) {
        self.fail_next_commit.store(true, Ordering::SeqCst);
    }
}

/// Atomic unit over a private copy of the in-memory state.
pub struct MemoryUnit {
    guard: OwnedMutexGuard<MemoryState>,
    working: MemoryState,
    fail_commit: Arc<AtomicBool>,
}

#[async_trait]
impl ReviewStore for InMemoryStore {
    type Unit = MemoryUnit;

    async fn begin(&self) -> Result<MemoryUnit, StoreError> {
        let guard = self.state.clone().lock_owned().await;
        let working = guard.clone();
        Ok(MemoryUnit {
            guard,
            working,
            fail_commit: self.fail_next_commit.clone(),
        })
    }

    async fn team_members(&self, team_name: &str) -> Result<Vec<TeamMember>, StoreError> {
        Ok(self.state.lock().await.team_members(team_name))
    }

    async fn get_user(&self, user_id: &str) -> Result<Option<User>, StoreError> {
        Ok(self.state.lock().await.users.get(user_id).cloned())
    }

    async fn get_pull_request(&self, pr_id: &str) -> Result<Option<PullRequest>, StoreError> {
        Ok(self.state.lock().await.pull_request(pr_id))
    }

    async fn list_user_prs(&self, user_id: &str) -> Result<Vec<PullRequestShort>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .reviewers
            .iter()
            .filter(|(_, user)| user == user_id)
            .filter_map(|(pr_id, _)| {
                state.pull_requests.get(pr_id).map(|record| PullRequestShort {
                    pull_request_id: pr_id.clone(),
                    pull_request_name: record.name.clone(),
                    author_id: record.author_id.clone(),
                    status: record.status,
                })
            })
            .collect())
    }

    async fn assignment_counts_by_user(&self) -> Result<BTreeMap<String, i64>, StoreError> {
        let state = self.state.lock().await;
        let mut counts = BTreeMap::new();
        for (_, user) in &state.reviewers {
            *counts.entry(user.clone()).or_insert(0) += 1;
        }
        Ok(counts)
    }

    async fn assignment_counts_by_pr(&self) -> Result<BTreeMap<String, i64>, StoreError> {
        let state = self.state.lock().await;
        let mut counts = BTreeMap::new();
        for (pr_id, _) in &state.reviewers {
            *counts.entry(pr_id.clone()).or_insert(0) += 1;
        }
        Ok(counts)
    }
}

#[async_trait]
impl StoreUnit for MemoryUnit {
    async fn team_exists(&mut self, team_name: &str) -> Result<bool, StoreError> {
        Ok(self.working.teams.contains(team_name))
    }

    async fn create_team(&mut self, team_name: &str) -> Result<(), StoreError> {
        if !self.working.teams.insert(team_name.to_string()) {
            return Err(StoreError::duplicate("team", team_name));
        }
        Ok(())
    }

    async fn upsert_user(&mut self, user: &User) -> Result<(), StoreError> {
        if !self.working.teams.contains(&user.team_name) {
            return Err(StoreError::missing("team", &user.team_name));
        }
        self.working
            .users
            .insert(user.user_id.clone(), user.clone());
        Ok(())
    }

    async fn get_user(&mut self, user_id: &str) -> Result<Option<User>, StoreError> {
        Ok(self.working.users.get(user_id).cloned())
    }

    async fn set_user_active(
        &mut self,
        user_id: &str,
        is_active: bool,
    ) -> Result<Option<User>, StoreError> {
        Ok(self.working.users.get_mut(user_id).map(|user| {
            user.is_active = is_active;
            user.clone()
        }))
    }

    async fn create_pull_request(&mut self, pr: &NewPullRequest) -> Result<(), StoreError> {
        if self.working.pull_requests.contains_key(&pr.pull_request_id) {
            return Err(StoreError::duplicate("pull request", &pr.pull_request_id));
        }
        if !self.working.users.contains_key(&pr.author_id) {
            return Err(StoreError::missing("user", &pr.author_id));
        }
        self.working.pull_requests.insert(
            pr.pull_request_id.clone(),
            PrRecord {
                name: pr.pull_request_name.clone(),
                author_id: pr.author_id.clone(),
                status: PrStatus::Open,
                created_at: pr.created_at,
                merged_at: None,
            },
        );
        Ok(())
    }

    async fn get_pull_request(&mut self, pr_id: &str) -> Result<Option<PullRequest>, StoreError> {
        Ok(self.working.pull_request(pr_id))
    }

    async fn set_merged(
        &mut self,
        pr_id: &str,
        merged_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        match self.working.pull_requests.get_mut(pr_id) {
            Some(record) if record.status == PrStatus::Open => {
                record.status = PrStatus::Merged;
                record.merged_at = Some(merged_at);
                Ok(())
            }
            _ => Err(StoreError::missing("open pull request", pr_id)),
        }
    }

    async fn assigned_reviewers(&mut self, pr_id: &str) -> Result<Vec<String>, StoreError> {
        Ok(self.working.reviewers_of(pr_id))
    }

    async fn active_team_members(&mut self, team_name: &str) -> Result<Vec<String>, StoreError> {
        Ok(self
            .working
            .users
            .values()
            .filter(|u| u.team_name == team_name && u.is_active)
            .map(|u| u.user_id.clone())
            .collect())
    }

    async fn insert_reviewers(
        &mut self,
        pr_id: &str,
        user_ids: &[String],
    ) -> Result<(), StoreError> {
        if !self.working.pull_requests.contains_key(pr_id) {
            return Err(StoreError::missing("pull request", pr_id));
        }
        for user_id in user_ids {
            if !self.working.users.contains_key(user_id) {
                return Err(StoreError::missing("user", user_id));
            }
            self.working
                .reviewers
                .insert((pr_id.to_string(), user_id.clone()));
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
        Ok(self
            .working
            .reviewers
            .remove(&(pr_id.to_string(), user_id.to_string())))
    }

    async fn deactivate_team_members(
        &mut self,
        team_name: &str,
        user_ids: &[String],
    ) -> Result<Vec<String>, StoreError> {
        let requested: BTreeSet<&str> = user_ids.iter().map(String::as_str).collect();
        let mut matched = Vec::new();
        for user in self.working.users.values_mut() {
            if user.team_name == team_name && requested.contains(user.user_id.as_str()) {
                user.is_active = false;
                matched.push(user.user_id.clone());
            }
        }
        Ok(matched)
    }

    async fn open_assignments_for(
        &mut self,
        user_ids: &[String],
    ) -> Result<Vec<OpenAssignment>, StoreError> {
        let requested: BTreeSet<&str> = user_ids.iter().map(String::as_str).collect();
        let state = &self.working;
        Ok(state
            .reviewers
            .iter()
            .filter(|(_, user)| requested.contains(user.as_str()))
            .filter_map(|(pr_id, user_id)| {
                let record = state.pull_requests.get(pr_id)?;
                let user = state.users.get(user_id)?;
                (record.status == PrStatus::Open).then(|| OpenAssignment {
                    pr_id: pr_id.clone(),
                    author_id: record.author_id.clone(),
                    old_user_id: user_id.clone(),
                    old_user_team: user.team_name.clone(),
                })
            })
            .collect())
    }

    async fn commit(self) -> Result<(), StoreError> {
        let MemoryUnit {
            mut guard,
            working,
            fail_commit,
        } = self;
        if fail_commit.swap(false, Ordering::SeqCst) {
            return Err(StoreError::Commit("injected commit failure".into()));
        }
        *guard = working;
        Ok(())
    }
}
