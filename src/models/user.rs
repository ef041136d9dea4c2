//! User model.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A user belonging to exactly one team.
///
/// `is_active` only gates eligibility for new reviewer assignments;
/// existing assignments are untouched when it flips.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct User {
    pub user_id: String,
    pub username: String,
    pub team_name: String,
    pub is_active: bool,
}

impl User {
    /// Build a user record for a member of `team_name`.
    pub fn from_member(member: &super::TeamMember, team_name: &str) -> Self {
        Self {
            user_id: member.user_id.clone(),
            username: member.username.clone(),
            team_name: team_name.to_string(),
            is_active: member.is_active,
        }
    }
}
