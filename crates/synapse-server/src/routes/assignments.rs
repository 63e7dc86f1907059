//! Universal assignments: inbox, creation, status moves, delegation.

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use synapse_core::entities::Assignment;
use synapse_core::enums::{Action, AssignmentStatus, Resource};
use synapse_core::responses::AssignmentInbox;
use synapse_db::repos::assignment::{AssignmentFilter, NewAssignment};

use crate::AppState;
use crate::auth::CurrentUser;
use crate::error::ApiError;
use crate::extract::{ApiJson, ApiPath, ApiQuery};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/assignments", get(inbox).post(create_assignment))
        .route("/assignments/all", get(list_assignments))
        .route("/assignments/{id}", get(get_assignment))
        .route("/assignments/{id}/status", post(transition_assignment))
        .route("/assignments/{id}/delegate", post(delegate_assignment))
}

#[derive(Debug, Deserialize)]
struct InboxQuery {
    #[serde(default)]
    include_closed: bool,
    limit: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct TransitionBody {
    status: AssignmentStatus,
    #[serde(default)]
    notes: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DelegateBody {
    to_user_id: String,
}

/// Assignments addressed to the caller or to the caller's role.
async fn inbox(
    State(state): State<AppState>,
    current: CurrentUser,
    ApiQuery(q): ApiQuery<InboxQuery>,
) -> Result<Json<AssignmentInbox>, ApiError> {
    current.require(&state, Resource::Assignment, Action::Read).await?;
    let inbox = state
        .service
        .inbox(&current.actor, q.include_closed, state.limit(q.limit))
        .await?;
    Ok(Json(inbox))
}

/// Every assignment matching the filter, regardless of addressee.
async fn list_assignments(
    State(state): State<AppState>,
    current: CurrentUser,
    ApiQuery(mut filter): ApiQuery<AssignmentFilter>,
) -> Result<Json<Vec<Assignment>>, ApiError> {
    current.require(&state, Resource::Assignment, Action::Assign).await?;
    filter.limit = Some(state.limit(filter.limit));
    Ok(Json(state.service.list_assignments(&filter).await?))
}

async fn create_assignment(
    State(state): State<AppState>,
    current: CurrentUser,
    ApiJson(body): ApiJson<NewAssignment>,
) -> Result<(StatusCode, Json<Assignment>), ApiError> {
    current.require(&state, Resource::Assignment, Action::Create).await?;
    let assignment = state
        .service
        .create_assignment(&current.actor, &body)
        .await?;
    Ok((StatusCode::CREATED, Json(assignment)))
}

async fn get_assignment(
    State(state): State<AppState>,
    current: CurrentUser,
    ApiPath(id): ApiPath<String>,
) -> Result<Json<Assignment>, ApiError> {
    current.require(&state, Resource::Assignment, Action::Read).await?;
    Ok(Json(state.service.get_assignment(&id).await?))
}

async fn transition_assignment(
    State(state): State<AppState>,
    current: CurrentUser,
    ApiPath(id): ApiPath<String>,
    ApiJson(body): ApiJson<TransitionBody>,
) -> Result<Json<Assignment>, ApiError> {
    current.require(&state, Resource::Assignment, Action::Update).await?;
    let assignment = state
        .service
        .transition_assignment(&current.actor, &id, body.status, body.notes.as_deref())
        .await?;
    Ok(Json(assignment))
}

async fn delegate_assignment(
    State(state): State<AppState>,
    current: CurrentUser,
    ApiPath(id): ApiPath<String>,
    ApiJson(body): ApiJson<DelegateBody>,
) -> Result<Json<Assignment>, ApiError> {
    current.require(&state, Resource::Assignment, Action::Assign).await?;
    let assignment = state
        .service
        .delegate_assignment(&current.actor, &id, &body.to_user_id)
        .await?;
    Ok(Json(assignment))
}
