//! RBAC matrix administration.

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use synapse_core::entities::PermissionGrant;
use synapse_core::enums::{Action, Resource};

use crate::AppState;
use crate::auth::CurrentUser;
use crate::error::ApiError;
use crate::extract::{ApiJson, ApiQuery};

pub fn router() -> Router<AppState> {
    Router::new().route(
        "/permissions",
        get(list_permissions).post(grant).delete(revoke),
    )
}

#[derive(Debug, Serialize)]
struct GrantChange {
    #[serde(flatten)]
    grant: PermissionGrant,
    changed: bool,
}

async fn list_permissions(
    State(state): State<AppState>,
    current: CurrentUser,
) -> Result<Json<Vec<PermissionGrant>>, ApiError> {
    current.require(&state, Resource::Permission, Action::Read).await?;
    Ok(Json(state.service.list_permissions().await?))
}

async fn grant(
    State(state): State<AppState>,
    current: CurrentUser,
    ApiJson(grant): ApiJson<PermissionGrant>,
) -> Result<Json<GrantChange>, ApiError> {
    current.require(&state, Resource::Permission, Action::Update).await?;
    let changed = state.service.grant_permission(&current.actor, grant).await?;
    tracing::info!(resource = %grant.resource, action = %grant.action, role = %grant.role, changed, "permission granted");
    Ok(Json(GrantChange { grant, changed }))
}

/// `DELETE /permissions?resource=..&action=..&role=..`
async fn revoke(
    State(state): State<AppState>,
    current: CurrentUser,
    ApiQuery(grant): ApiQuery<PermissionGrant>,
) -> Result<Json<GrantChange>, ApiError> {
    current.require(&state, Resource::Permission, Action::Update).await?;
    let changed = state.service.revoke_permission(&current.actor, grant).await?;
    tracing::info!(resource = %grant.resource, action = %grant.action, role = %grant.role, changed, "permission revoked");
    Ok(Json(GrantChange { grant, changed }))
}
