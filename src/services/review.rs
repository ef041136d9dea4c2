//! Reviewer assignment service.
//!
//! Implements the team, user and pull request use cases on top of a
//! [`ReviewStore`]. Each use case opens at most one atomic unit; every read
//! that decides an invariant happens inside that unit, and the store's
//! uniqueness conflicts are mapped to domain failures. Responses are read
//! back after commit.
//!
//! The service never retries and never logs.

use std::collections::HashSet;

use chrono::Utc;

use super::selection::{pick_reviewers, REVIEWERS_PER_PR};
use crate::error::AppError;
use crate::models::{
    AssignmentStats, BulkDeactivateResult, NewPullRequest, PullRequest, PullRequestShort,
    ReassignAction, ReassignOutcome, ReassignResult, StatsGroupBy, Team, User,
};
use crate::store::{ReviewStore, StoreError, StoreUnit};

/// Orchestrates reviewer assignment over a storage backend.
#[derive(Debug, Clone)]
pub struct ReviewService<S> {
    store: S,
}

/// Map a uniqueness conflict to `on_duplicate`, anything else to `Internal`.
fn conflict_as(err: StoreError, on_duplicate: impl FnOnce() -> AppError) -> AppError {
    if err.is_duplicate() {
        on_duplicate()
    } else {
        AppError::from(err)
    }
}

impl<S: ReviewStore> ReviewService<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Create a team and upsert its members.
    ///
    /// Fails with `TeamExists` if the name is taken. Members already known
    /// under another team are moved and updated.
    pub async fn add_team(&self, team: Team) -> Result<Team, AppError> {
        let mut unit = self.store.begin().await?;

        if unit.team_exists(&team.team_name).await? {
            return Err(AppError::team_exists("team_name already exists"));
        }
        unit.create_team(&team.team_name)
            .await
            .map_err(|e| conflict_as(e, || AppError::team_exists("team_name already exists")))?;

        for member in &team.members {
            unit.upsert_user(&User::from_member(member, &team.team_name))
                .await?;
        }
        unit.commit().await?;

        let mut members = self.store.team_members(&team.team_name).await?;
        members.sort_by(|a, b| a.user_id.cmp(&b.user_id));
        Ok(Team::new(team.team_name, members))
    }

    /// Get a team with its members; a team without members is `NotFound`.
    pub async fn get_team(&self, team_name: &str) -> Result<Team, AppError> {
        let mut members = self.store.team_members(team_name).await?;
        if members.is_empty() {
            return Err(AppError::not_found_with_id("team", team_name));
        }
        members.sort_by(|a, b| a.user_id.cmp(&b.user_id));
        Ok(Team::new(team_name, members))
    }

    /// Flip a user's activity flag.
    ///
    /// Existing reviewer assignments are left as they are; only
    /// [`ReviewService::bulk_deactivate_and_reassign`] reconciles them.
    pub async fn set_active(&self, user_id: &str, is_active: bool) -> Result<User, AppError> {
        let mut unit = self.store.begin().await?;
        let user = unit
            .set_user_active(user_id, is_active)
            .await?
            .ok_or_else(|| AppError::not_found_with_id("user", user_id))?;
        unit.commit().await?;
        Ok(user)
    }

    /// Create an open pull request and assign up to two reviewers from the
    /// author's team.
    pub async fn create_pr(
        &self,
        pr_id: &str,
        name: &str,
        author_id: &str,
    ) -> Result<PullRequest, AppError> {
        let pr_exists = || AppError::pr_exists("PR id already exists");
        let mut unit = self.store.begin().await?;

        if unit.get_pull_request(pr_id).await?.is_some() {
            return Err(pr_exists());
        }
        let author = unit
            .get_user(author_id)
            .await?
            .ok_or_else(|| AppError::not_found_with_id("user", author_id))?;

        unit.create_pull_request(&NewPullRequest {
            pull_request_id: pr_id.to_string(),
            pull_request_name: name.to_string(),
            author_id: author.user_id.clone(),
            created_at: Utc::now(),
        })
        .await
        .map_err(|e| conflict_as(e, pr_exists))?;

        let exclude = HashSet::from([author.user_id.clone()]);
        let reviewers =
            pick_reviewers(&mut unit, pr_id, &author.team_name, &exclude, REVIEWERS_PER_PR)
                .await?;
        unit.insert_reviewers(pr_id, &reviewers).await?;
        unit.commit().await?;

        self.read_pr(pr_id).await
    }

    /// Merge a pull request. Merging a merged PR returns it unchanged.
    pub async fn merge_pr(&self, pr_id: &str) -> Result<PullRequest, AppError> {
        let mut unit = self.store.begin().await?;

        let pr = unit
            .get_pull_request(pr_id)
            .await?
            .ok_or_else(|| AppError::not_found_with_id("pull request", pr_id))?;
        if pr.is_merged() {
            return Ok(pr);
        }

        unit.set_merged(pr_id, Utc::now()).await?;
        unit.commit().await?;

        self.read_pr(pr_id).await
    }

    /// Replace `old_user_id` on an open pull request with another active
    /// member of that user's team.
    pub async fn reassign(&self, pr_id: &str, old_user_id: &str) -> Result<ReassignResult, AppError> {
        let not_assigned = || AppError::not_assigned("reviewer is not assigned to this PR");
        let mut unit = self.store.begin().await?;

        let pr = unit
            .get_pull_request(pr_id)
            .await?
            .ok_or_else(|| AppError::not_found_with_id("pull request", pr_id))?;
        if pr.is_merged() {
            return Err(AppError::pr_merged("cannot reassign on merged PR"));
        }
        if !pr.has_reviewer(old_user_id) {
            return Err(not_assigned());
        }
        let old_user = unit
            .get_user(old_user_id)
            .await?
            .ok_or_else(|| AppError::not_found_with_id("user", old_user_id))?;

        let mut exclude: HashSet<String> = pr.assigned_reviewers.iter().cloned().collect();
        exclude.insert(pr.author_id.clone());

        let replacement = pick_reviewers(&mut unit, pr_id, &old_user.team_name, &exclude, 1)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| AppError::no_candidate("no active replacement candidate in team"))?;

        if !unit
            .replace_reviewer(pr_id, old_user_id, &replacement)
            .await?
        {
            return Err(not_assigned());
        }
        unit.commit().await?;

        Ok(ReassignResult {
            pr: self.read_pr(pr_id).await?,
            replaced_by: replacement,
        })
    }

    /// Deactivate the given members of `team_name` and reconcile every open
    /// pull request they review.
    ///
    /// Ids outside the team are ignored. Each affected assignment is either
    /// replaced by an eligible teammate or removed when there is none.
    pub async fn bulk_deactivate_and_reassign(
        &self,
        team_name: &str,
        user_ids: &[String],
    ) -> Result<BulkDeactivateResult, AppError> {
        let mut result = BulkDeactivateResult {
            team_name: team_name.to_string(),
            deactivated_user_ids: Vec::new(),
            reassignments: Vec::new(),
        };
        let mut unit = self.store.begin().await?;

        let deactivated = unit.deactivate_team_members(team_name, user_ids).await?;
        if deactivated.is_empty() {
            return Ok(result);
        }

        for assignment in unit.open_assignments_for(&deactivated).await? {
            let mut exclude: HashSet<String> = unit
                .assigned_reviewers(&assignment.pr_id)
                .await?
                .into_iter()
                .collect();
            exclude.insert(assignment.author_id.clone());

            let replacement = pick_reviewers(
                &mut unit,
                &assignment.pr_id,
                &assignment.old_user_team,
                &exclude,
                1,
            )
            .await?
            .into_iter()
            .next();

            let outcome = match replacement {
                Some(new_user) => {
                    unit.replace_reviewer(&assignment.pr_id, &assignment.old_user_id, &new_user)
                        .await?;
                    ReassignOutcome {
                        pr_id: assignment.pr_id,
                        old_user_id: assignment.old_user_id,
                        action: ReassignAction::Replaced,
                        replaced_by: Some(new_user),
                    }
                }
                None => {
                    unit.delete_reviewer(&assignment.pr_id, &assignment.old_user_id)
                        .await?;
                    ReassignOutcome {
                        pr_id: assignment.pr_id,
                        old_user_id: assignment.old_user_id,
                        action: ReassignAction::Removed,
                        replaced_by: None,
                    }
                }
            };
            result.reassignments.push(outcome);
        }
        unit.commit().await?;

        result.deactivated_user_ids = deactivated;
        Ok(result)
    }

    /// Pull requests the user reviews.
    pub async fn list_user_prs(&self, user_id: &str) -> Result<Vec<PullRequestShort>, AppError> {
        Ok(self.store.list_user_prs(user_id).await?)
    }

    /// Assignment counts grouped by reviewer, by pull request, or both.
    pub async fn stats_assignments(
        &self,
        group_by: StatsGroupBy,
    ) -> Result<AssignmentStats, AppError> {
        let mut stats = AssignmentStats::default();
        if matches!(group_by, StatsGroupBy::User | StatsGroupBy::All) {
            stats.by_user = Some(self.store.assignment_counts_by_user().await?);
        }
        if matches!(group_by, StatsGroupBy::Pr | StatsGroupBy::All) {
            stats.by_pr = Some(self.store.assignment_counts_by_pr().await?);
        }
        Ok(stats)
    }

    async fn read_pr(&self, pr_id: &str) -> Result<PullRequest, AppError> {
        self.store
            .get_pull_request(pr_id)
            .await?
            .ok_or_else(|| AppError::not_found_with_id("pull request", pr_id))
    }
}
