//! Data models for the review assignment service.
//!
//! These models represent the entities stored in the relational store and
//! returned from the service. Row-shaped models derive `FromRow` for SQLx.

pub mod assignment;
pub mod pull_request;
pub mod team;
pub mod user;

// Re-exports for convenient access
pub use assignment::{
    AssignmentStats, BulkDeactivateResult, OpenAssignment, ReassignAction, ReassignOutcome,
    ReassignResult, StatsGroupBy,
};
pub use pull_request::{NewPullRequest, PrStatus, PullRequest, PullRequestRow, PullRequestShort};
pub use team::{Team, TeamMember};
pub use user::User;
