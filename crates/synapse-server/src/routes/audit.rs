use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use synapse_core::entities::AuditEntry;
use synapse_core::enums::{Action, AuditAction, EntityType, Resource};
use synapse_db::repos::audit::AuditFilter;

use crate::AppState;
use crate::auth::CurrentUser;
use crate::error::ApiError;
use crate::extract::ApiQuery;

pub fn router() -> Router<AppState> {
    Router::new().route("/audit", get(query_audit))
}

#[derive(Debug, Deserialize)]
struct AuditQuery {
    entity_type: Option<EntityType>,
    entity_id: Option<String>,
    action: Option<AuditAction>,
    actor_id: Option<String>,
    limit: Option<u32>,
}

async fn query_audit(
    State(state): State<AppState>,
    current: CurrentUser,
    ApiQuery(q): ApiQuery<AuditQuery>,
) -> Result<Json<Vec<AuditEntry>>, ApiError> {
    current.require(&state, Resource::Audit, Action::Read).await?;
    let filter = AuditFilter {
        entity_type: q.entity_type,
        entity_id: q.entity_id,
        action: q.action,
        actor_id: q.actor_id,
        limit: Some(state.limit(q.limit)),
    };
    Ok(Json(state.service.query_audit(&filter).await?))
}
