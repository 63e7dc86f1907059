//! Bearer-token authentication.

use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use synapse_core::entities::User;
use synapse_core::enums::{Action, Resource};
use synapse_core::identity::Actor;

use crate::AppState;
use crate::error::ApiError;

/// The user behind `Authorization: Bearer <token>`.
///
/// Extracting it rejects with 401 when the header is missing, the token is
/// unknown, or the user is deactivated.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub user: User,
    pub actor: Actor,
}

impl CurrentUser {
    /// 403 unless the matrix lets this user's role perform `action` on `resource`.
    pub async fn require(
        &self,
        state: &AppState,
        resource: Resource,
        action: Action,
    ) -> Result<(), ApiError> {
        state
            .service
            .check_permission(&self.actor, resource, action)
            .await?;
        Ok(())
    }
}

fn bearer_token(parts: &Parts) -> Option<&str> {
    let value = parts.headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    scheme.eq_ignore_ascii_case("bearer").then(|| token.trim())
}

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ApiError::Unauthorized("missing bearer token".into()))?;
        let user = state.service.authenticate(token).await?;
        let actor = Actor::new(user.id.clone(), user.role);
        Ok(Self { user, actor })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn parts(header: Option<&str>) -> Parts {
        let mut builder = Request::builder().uri("/api/v1/users/me");
        if let Some(h) = header {
            builder = builder.header(AUTHORIZATION, h);
        }
        builder.body(()).unwrap().into_parts().0
    }

    #[test]
    fn parses_bearer_scheme_case_insensitively() {
        assert_eq!(bearer_token(&parts(Some("Bearer syn_abc"))), Some("syn_abc"));
        assert_eq!(bearer_token(&parts(Some("bearer syn_abc"))), Some("syn_abc"));
    }

    #[test]
    fn rejects_other_schemes() {
        assert_eq!(bearer_token(&parts(Some("Basic dXNlcjpwdw=="))), None);
        assert_eq!(bearer_token(&parts(None)), None);
    }
}
