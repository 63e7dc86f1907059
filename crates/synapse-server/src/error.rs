//! API error type and its JSON rendering.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use synapse_core::errors::CoreError;
use synapse_db::error::DatabaseError;
use thiserror::Error;

/// Error returned by every handler.
///
/// Rendered as `{"error": msg, "errorDetails": {"errorCode", "errorMessage"}}`.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Malformed input (400).
    #[error("{0}")]
    BadRequest(String),

    /// Missing or rejected bearer token (401).
    #[error("{0}")]
    Unauthorized(String),

    /// RBAC or role rule denied the action (403).
    #[error("{0}")]
    Forbidden(String),

    /// Entity does not exist (404).
    #[error("{0}")]
    NotFound(String),

    /// State machine or prerequisite rule rejected the operation (409).
    #[error("{message}")]
    Conflict { code: &'static str, message: String },

    /// Anything else (500). The message is logged, not returned.
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict { .. } => StatusCode::CONFLICT,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::BadRequest(_) => "ERR_BAD_REQUEST",
            Self::Unauthorized(_) => "ERR_UNAUTHORIZED",
            Self::Forbidden(_) => "ERR_FORBIDDEN",
            Self::NotFound(_) => "ERR_NOT_FOUND",
            Self::Conflict { code, .. } => *code,
            Self::Internal(_) => "ERR_INTERNAL_SERVER_ERROR",
        }
    }

    fn conflict(code: &'static str, err: &CoreError) -> Self {
        Self::Conflict {
            code,
            message: err.to_string(),
        }
    }
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        match &err {
            CoreError::NotFound { .. } => Self::NotFound(err.to_string()),
            CoreError::PermissionDenied { .. } => Self::Forbidden(err.to_string()),
            CoreError::InvalidTransition { .. } => Self::conflict("ERR_INVALID_TRANSITION", &err),
            CoreError::PrerequisitesIncomplete { .. } => {
                Self::conflict("ERR_PREREQUISITES_INCOMPLETE", &err)
            }
            CoreError::StepsIncomplete { .. } => Self::conflict("ERR_STEPS_INCOMPLETE", &err),
            CoreError::DependentsStarted { .. } => {
                Self::conflict("ERR_DEPENDENTS_STARTED", &err)
            }
            CoreError::Validation(msg) => Self::BadRequest(msg.clone()),
            CoreError::Other(_) => Self::Internal(err.to_string()),
        }
    }
}

impl From<DatabaseError> for ApiError {
    fn from(err: DatabaseError) -> Self {
        match err {
            DatabaseError::Core(core) => core.into(),
            DatabaseError::Unauthenticated(msg) => Self::Unauthorized(msg),
            other => Self::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let code = self.code();
        let message = if let Self::Internal(detail) = &self {
            tracing::error!(error = %detail, "request failed");
            "internal server error".to_string()
        } else {
            self.to_string()
        };

        let body = Json(json!({
            "error": message,
            "errorDetails": {
                "errorCode": code,
                "errorMessage": message,
            }
        }));
        (status, body).into_response()
    }
}

/// Errors from running the server itself.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use synapse_core::enums::{Action, EntityType, PhaseName, Resource, Role};

    #[test]
    fn maps_core_errors_to_statuses() {
        let cases = [
            (
                CoreError::not_found(EntityType::TestCycle, "cyc-1"),
                StatusCode::NOT_FOUND,
            ),
            (
                CoreError::PermissionDenied {
                    role: Role::Tester,
                    resource: Resource::Cycle,
                    action: Action::Create,
                },
                StatusCode::FORBIDDEN,
            ),
            (
                CoreError::transition(EntityType::TestCycle, "cyc-1", "draft", "completed"),
                StatusCode::CONFLICT,
            ),
            (
                CoreError::PrerequisitesIncomplete {
                    phase: PhaseName::Scoping,
                    missing: vec![PhaseName::Planning],
                },
                StatusCode::CONFLICT,
            ),
            (
                CoreError::DependentsStarted {
                    phase: PhaseName::Scoping,
                    started: vec![PhaseName::DataOwnerId],
                },
                StatusCode::CONFLICT,
            ),
            (CoreError::Validation("bad".into()), StatusCode::BAD_REQUEST),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status(), status);
        }
    }

    #[test]
    fn unauthenticated_is_401() {
        let err = ApiError::from(DatabaseError::Unauthenticated("unknown token".into()));
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(err.code(), "ERR_UNAUTHORIZED");
    }

    #[test]
    fn storage_failures_are_500() {
        let err = ApiError::from(DatabaseError::NoResult);
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
