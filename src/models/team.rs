//! Team and team member models.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A user as listed inside a team.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct TeamMember {
    pub user_id: String,
    pub username: String,
    pub is_active: bool,
}

/// A team together with its members.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Team {
    /// Unique team name.
    pub team_name: String,

    /// Members, sorted by user id in service responses.
    #[serde(default)]
    pub members: Vec<TeamMember>,
}

impl Team {
    pub fn new(team_name: impl Into<String>, members: Vec<TeamMember>) -> Self {
        Self {
            team_name: team_name.into(),
            members,
        }
    }
}

impl TeamMember {
    pub fn new(user_id: impl Into<String>, username: impl Into<String>, is_active: bool) -> Self {
        Self {
            user_id: user_id.into(),
            username: username.into(),
            is_active,
        }
    }
}
