//! Test cycles and the reports attached to them.

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::Deserialize;
use synapse_core::entities::{CycleReport, TestCycle};
use synapse_core::enums::{Action, CycleStatus, Resource};
use synapse_core::responses::CycleSummary;
use synapse_db::repos::cycle::NewCycle;
use synapse_db::updates::cycle::CycleUpdate;

use crate::AppState;
use crate::auth::CurrentUser;
use crate::error::ApiError;
use crate::extract::{ApiJson, ApiPath, ApiQuery};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/cycles", get(list_cycles).post(create_cycle))
        .route("/cycles/{cycle_id}", get(get_cycle).patch(update_cycle))
        .route("/cycles/{cycle_id}/status", post(transition_cycle))
        .route("/cycles/{cycle_id}/summary", get(cycle_summary))
        .route("/cycles/{cycle_id}/reports", get(list_cycle_reports).post(add_report))
        .route("/cycles/{cycle_id}/reports/{report_id}", delete(remove_report))
}

#[derive(Debug, Deserialize)]
struct ListCyclesQuery {
    status: Option<CycleStatus>,
    limit: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct TransitionBody {
    status: CycleStatus,
    #[serde(default)]
    reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AddReportBody {
    report_id: String,
    tester_id: String,
}

async fn list_cycles(
    State(state): State<AppState>,
    current: CurrentUser,
    ApiQuery(q): ApiQuery<ListCyclesQuery>,
) -> Result<Json<Vec<TestCycle>>, ApiError> {
    current.require(&state, Resource::Cycle, Action::Read).await?;
    let cycles = state.service.list_cycles(q.status, state.limit(q.limit)).await?;
    Ok(Json(cycles))
}

async fn create_cycle(
    State(state): State<AppState>,
    current: CurrentUser,
    ApiJson(body): ApiJson<NewCycle>,
) -> Result<(StatusCode, Json<TestCycle>), ApiError> {
    current.require(&state, Resource::Cycle, Action::Create).await?;
    let cycle = state.service.create_cycle(&current.actor, &body).await?;
    Ok((StatusCode::CREATED, Json(cycle)))
}

async fn get_cycle(
    State(state): State<AppState>,
    current: CurrentUser,
    ApiPath(id): ApiPath<String>,
) -> Result<Json<TestCycle>, ApiError> {
    current.require(&state, Resource::Cycle, Action::Read).await?;
    Ok(Json(state.service.get_cycle(&id).await?))
}

async fn update_cycle(
    State(state): State<AppState>,
    current: CurrentUser,
    ApiPath(id): ApiPath<String>,
    ApiJson(update): ApiJson<CycleUpdate>,
) -> Result<Json<TestCycle>, ApiError> {
    current.require(&state, Resource::Cycle, Action::Update).await?;
    let cycle = state.service.update_cycle(&current.actor, &id, update).await?;
    Ok(Json(cycle))
}

/// Completing a cycle needs `cycle:complete`; every other move `cycle:update`.
async fn transition_cycle(
    State(state): State<AppState>,
    current: CurrentUser,
    ApiPath(id): ApiPath<String>,
    ApiJson(body): ApiJson<TransitionBody>,
) -> Result<Json<TestCycle>, ApiError> {
    let action = if body.status == CycleStatus::Completed {
        Action::Complete
    } else {
        Action::Update
    };
    current.require(&state, Resource::Cycle, action).await?;
    let cycle = state
        .service
        .transition_cycle(&current.actor, &id, body.status, body.reason.as_deref())
        .await?;
    Ok(Json(cycle))
}

async fn cycle_summary(
    State(state): State<AppState>,
    current: CurrentUser,
    ApiPath(id): ApiPath<String>,
) -> Result<Json<CycleSummary>, ApiError> {
    current.require(&state, Resource::Cycle, Action::Read).await?;
    Ok(Json(state.service.cycle_summary(&id).await?))
}

async fn list_cycle_reports(
    State(state): State<AppState>,
    current: CurrentUser,
    ApiPath(id): ApiPath<String>,
) -> Result<Json<Vec<CycleReport>>, ApiError> {
    current.require(&state, Resource::Cycle, Action::Read).await?;
    Ok(Json(state.service.list_cycle_reports(&id).await?))
}

async fn add_report(
    State(state): State<AppState>,
    current: CurrentUser,
    ApiPath(id): ApiPath<String>,
    ApiJson(body): ApiJson<AddReportBody>,
) -> Result<(StatusCode, Json<CycleReport>), ApiError> {
    current.require(&state, Resource::Cycle, Action::Assign).await?;
    let cr = state
        .service
        .add_report_to_cycle(&current.actor, &id, &body.report_id, &body.tester_id)
        .await?;
    Ok((StatusCode::CREATED, Json(cr)))
}

async fn remove_report(
    State(state): State<AppState>,
    current: CurrentUser,
    ApiPath((id, report_id)): ApiPath<(String, String)>,
) -> Result<StatusCode, ApiError> {
    current.require(&state, Resource::Cycle, Action::Assign).await?;
    state
        .service
        .remove_report_from_cycle(&current.actor, &id, &report_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
