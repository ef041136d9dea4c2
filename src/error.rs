//! Domain error types for the review assignment service.
//!
//! Every rule violation is a typed variant carrying a human-readable
//! message. Translating a variant into a transport status is left to
//! whatever boundary embeds the service.

use serde::Serialize;
use thiserror::Error;

use crate::store::StoreError;

/// Stable failure code, one per [`AppError`] variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    TeamExists,
    PrExists,
    PrMerged,
    NotAssigned,
    NoCandidate,
    NotFound,
    Internal,
}

impl ErrorCode {
    /// Wire representation of the code.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TeamExists => "TEAM_EXISTS",
            Self::PrExists => "PR_EXISTS",
            Self::PrMerged => "PR_MERGED",
            Self::NotAssigned => "NOT_ASSIGNED",
            Self::NoCandidate => "NO_CANDIDATE",
            Self::NotFound => "NOT_FOUND",
            Self::Internal => "INTERNAL",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failures returned by the review service.
///
/// All variants serialize to `{"code": "...", "details": {...}}`.
#[derive(Debug, Error, Serialize)]
#[serde(tag = "code", content = "details", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AppError {
    /// A team with the requested name already exists.
    #[error("{message}")]
    TeamExists { message: String },

    /// A pull request with the requested id already exists.
    #[error("{message}")]
    PrExists { message: String },

    /// The pull request is merged and its reviewers are frozen.
    #[error("{message}")]
    PrMerged { message: String },

    /// The user is not a reviewer of the pull request.
    #[error("{message}")]
    NotAssigned { message: String },

    /// No active teammate is eligible as a replacement.
    #[error("{message}")]
    NoCandidate { message: String },

    /// Requested resource not found.
    #[error("{message}")]
    NotFound {
        message: String,
        resource: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        id: Option<String>,
    },

    /// Unexpected storage or internal failure.
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl AppError {
    pub fn team_exists(message: impl Into<String>) -> Self {
        Self::TeamExists {
            message: message.into(),
        }
    }

    pub fn pr_exists(message: impl Into<String>) -> Self {
        Self::PrExists {
            message: message.into(),
        }
    }

    pub fn pr_merged(message: impl Into<String>) -> Self {
        Self::PrMerged {
            message: message.into(),
        }
    }

    pub fn not_assigned(message: impl Into<String>) -> Self {
        Self::NotAssigned {
            message: message.into(),
        }
    }

    pub fn no_candidate(message: impl Into<String>) -> Self {
        Self::NoCandidate {
            message: message.into(),
        }
    }

    /// Create a not found error with ID.
    pub fn not_found_with_id(resource: impl Into<String>, id: impl Into<String>) -> Self {
        let resource = resource.into();
        Self::NotFound {
            message: format!("{} not found", resource),
            resource,
            id: Some(id.into()),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// The failure code of this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::TeamExists { .. } => ErrorCode::TeamExists,
            Self::PrExists { .. } => ErrorCode::PrExists,
            Self::PrMerged { .. } => ErrorCode::PrMerged,
            Self::NotAssigned { .. } => ErrorCode::NotAssigned,
            Self::NoCandidate { .. } => ErrorCode::NoCandidate,
            Self::NotFound { .. } => ErrorCode::NotFound,
            Self::Internal { .. } => ErrorCode::Internal,
        }
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        Self::internal(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_serialization() {
        let err = AppError::pr_merged("cannot reassign on merged PR");
        let json = serde_json::to_string(&err).unwrap();
        assert!(json.contains("\"code\":\"PR_MERGED\""));
        assert!(json.contains("cannot reassign on merged PR"));
    }

    #[test]
    fn test_not_found_with_id() {
        let err = AppError::not_found_with_id("PullRequest", "pr-1");
        let json = serde_json::to_string(&err).unwrap();
        assert!(json.contains("\"code\":\"NOT_FOUND\""));
        assert!(json.contains("\"resource\":\"PullRequest\""));
        assert!(json.contains("\"id\":\"pr-1\""));
    }

    #[test]
    fn test_every_variant_carries_message() {
        let errors = [
            (AppError::team_exists("team_name already exists"), "team_name already exists"),
            (AppError::not_found_with_id("user", "u9"), "user not found"),
            (AppError::internal("disk full"), "disk full"),
        ];
        for (err, message) in errors {
            let value = serde_json::to_value(&err).unwrap();
            assert_eq!(value["code"], err.code().as_str());
            assert_eq!(value["details"]["message"], message);
        }
    }

    #[test]
    fn test_codes_match_variants() {
        assert_eq!(AppError::team_exists("x").code(), ErrorCode::TeamExists);
        assert_eq!(AppError::pr_exists("x").code(), ErrorCode::PrExists);
        assert_eq!(AppError::not_assigned("x").code(), ErrorCode::NotAssigned);
        assert_eq!(AppError::no_candidate("x").code(), ErrorCode::NoCandidate);
        assert_eq!(AppError::internal("x").code(), ErrorCode::Internal);
        assert_eq!(ErrorCode::PrExists.as_str(), "PR_EXISTS");
        assert_eq!(ErrorCode::NoCandidate.to_string(), "NO_CANDIDATE");
    }

    #[test]
    fn test_store_errors_are_internal() {
        let err: AppError = StoreError::MissingReference {
            entity: "team",
            id: "ghost".into(),
        }
        .into();
        assert_eq!(err.code(), ErrorCode::Internal);
        assert!(err.to_string().contains("ghost"));
    }

    #[test]
    fn test_display_impl() {
        let err = AppError::team_exists("team_name already exists");
        assert_eq!(format!("{}", err), "team_name already exists");
        assert_eq!(
            AppError::not_found_with_id("user", "u9").to_string(),
            "user not found"
        );
    }
}
