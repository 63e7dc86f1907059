//! Phase and step transitions for one report in one cycle.

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use synapse_core::entities::WorkflowPhase;
use synapse_core::enums::{Action, PhaseName, Resource};
use synapse_core::responses::{PhaseView, WorkflowStatus};

use crate::AppState;
use crate::auth::CurrentUser;
use crate::error::ApiError;
use crate::extract::{ApiPath, OptionalJson};

const PHASE: &str = "/cycles/{cycle_id}/reports/{report_id}/phases/{phase}";

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/cycles/{cycle_id}/reports/{report_id}/workflow", get(workflow_status))
        .route(&format!("{PHASE}/start"), post(start_phase))
        .route(&format!("{PHASE}/complete"), post(complete_phase))
        .route(&format!("{PHASE}/hold"), post(hold_phase))
        .route(&format!("{PHASE}/resume"), post(resume_phase))
        .route(&format!("{PHASE}/reopen"), post(reopen_phase))
        .route(&format!("{PHASE}/steps/{{step}}/complete"), post(complete_step))
}

#[derive(Debug, Default, Deserialize)]
struct ReasonBody {
    #[serde(default)]
    reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct NotesBody {
    #[serde(default)]
    notes: Option<String>,
}

type PhasePath = ApiPath<(String, String, PhaseName)>;

async fn workflow_status(
    State(state): State<AppState>,
    current: CurrentUser,
    ApiPath((cycle_id, report_id)): ApiPath<(String, String)>,
) -> Result<Json<WorkflowStatus>, ApiError> {
    current.require(&state, Resource::Workflow, Action::Read).await?;
    Ok(Json(state.service.workflow_status(&cycle_id, &report_id).await?))
}

async fn start_phase(
    State(state): State<AppState>,
    current: CurrentUser,
    ApiPath((cycle_id, report_id, phase)): PhasePath,
) -> Result<Json<WorkflowPhase>, ApiError> {
    current.require(&state, Resource::Workflow, Action::Start).await?;
    let phase = state
        .service
        .start_phase(&current.actor, &cycle_id, &report_id, phase)
        .await?;
    Ok(Json(phase))
}

async fn complete_phase(
    State(state): State<AppState>,
    current: CurrentUser,
    ApiPath((cycle_id, report_id, phase)): PhasePath,
) -> Result<Json<WorkflowPhase>, ApiError> {
    current.require(&state, Resource::Workflow, Action::Complete).await?;
    let phase = state
        .service
        .complete_phase(&current.actor, &cycle_id, &report_id, phase)
        .await?;
    Ok(Json(phase))
}

async fn hold_phase(
    State(state): State<AppState>,
    current: CurrentUser,
    ApiPath((cycle_id, report_id, phase)): PhasePath,
    OptionalJson(body): OptionalJson<ReasonBody>,
) -> Result<Json<WorkflowPhase>, ApiError> {
    current.require(&state, Resource::Workflow, Action::Update).await?;
    let phase = state
        .service
        .hold_phase(&current.actor, &cycle_id, &report_id, phase, body.reason.as_deref())
        .await?;
    Ok(Json(phase))
}

async fn resume_phase(
    State(state): State<AppState>,
    current: CurrentUser,
    ApiPath((cycle_id, report_id, phase)): PhasePath,
) -> Result<Json<WorkflowPhase>, ApiError> {
    current.require(&state, Resource::Workflow, Action::Update).await?;
    let phase = state
        .service
        .resume_phase(&current.actor, &cycle_id, &report_id, phase)
        .await?;
    Ok(Json(phase))
}

async fn reopen_phase(
    State(state): State<AppState>,
    current: CurrentUser,
    ApiPath((cycle_id, report_id, phase)): PhasePath,
    OptionalJson(body): OptionalJson<ReasonBody>,
) -> Result<Json<WorkflowPhase>, ApiError> {
    current.require(&state, Resource::Workflow, Action::Approve).await?;
    let phase = state
        .service
        .reopen_phase(&current.actor, &cycle_id, &report_id, phase, body.reason.as_deref())
        .await?;
    Ok(Json(phase))
}

async fn complete_step(
    State(state): State<AppState>,
    current: CurrentUser,
    ApiPath((cycle_id, report_id, phase, step)): ApiPath<(String, String, PhaseName, String)>,
    OptionalJson(body): OptionalJson<NotesBody>,
) -> Result<Json<PhaseView>, ApiError> {
    current.require(&state, Resource::Workflow, Action::Complete).await?;
    let view = state
        .service
        .complete_step(
            &current.actor,
            &cycle_id,
            &report_id,
            phase,
            &step,
            body.notes.as_deref(),
        )
        .await?;
    Ok(Json(view))
}
