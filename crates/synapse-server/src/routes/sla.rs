//! SLA violations and on-demand monitor runs.

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::Deserialize;
use synapse_core::entities::SlaViolation;
use synapse_core::enums::{Action, Resource};
use synapse_core::responses::SlaCheckReport;

use crate::AppState;
use crate::auth::CurrentUser;
use crate::error::ApiError;
use crate::extract::ApiQuery;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/sla/violations", get(list_violations))
        .route("/sla/check", post(run_check))
}

#[derive(Debug, Deserialize)]
struct ViolationsQuery {
    #[serde(default)]
    open_only: bool,
    limit: Option<u32>,
}

async fn list_violations(
    State(state): State<AppState>,
    current: CurrentUser,
    ApiQuery(q): ApiQuery<ViolationsQuery>,
) -> Result<Json<Vec<SlaViolation>>, ApiError> {
    current.require(&state, Resource::Sla, Action::Read).await?;
    let violations = state
        .service
        .list_violations(q.open_only, state.limit(q.limit))
        .await?;
    Ok(Json(violations))
}

/// Run one monitor pass now, as the caller.
async fn run_check(
    State(state): State<AppState>,
    current: CurrentUser,
) -> Result<Json<SlaCheckReport>, ApiError> {
    current.require(&state, Resource::Sla, Action::Update).await?;
    let report = state
        .service
        .check_sla(&current.actor, &state.config.sla.policy(), Utc::now())
        .await?;
    Ok(Json(report))
}
