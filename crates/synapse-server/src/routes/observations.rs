//! Test observations raised against a report in a cycle.

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use synapse_core::entities::Observation;
use synapse_core::enums::{Action, ObservationStatus, Resource};
use synapse_db::repos::observation::NewObservation;
use synapse_db::updates::observation::ObservationUpdate;

use crate::AppState;
use crate::auth::CurrentUser;
use crate::error::ApiError;
use crate::extract::{ApiJson, ApiPath, ApiQuery};

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/cycles/{cycle_id}/reports/{report_id}/observations",
            get(list_observations).post(create_observation),
        )
        .route("/observations/{id}", get(get_observation).patch(update_observation))
        .route("/observations/{id}/status", post(transition_observation))
}

#[derive(Debug, Deserialize)]
struct ListQuery {
    status: Option<ObservationStatus>,
}

#[derive(Debug, Deserialize)]
struct TransitionBody {
    status: ObservationStatus,
    #[serde(default)]
    reason: Option<String>,
}

async fn list_observations(
    State(state): State<AppState>,
    current: CurrentUser,
    ApiPath((cycle_id, report_id)): ApiPath<(String, String)>,
    ApiQuery(q): ApiQuery<ListQuery>,
) -> Result<Json<Vec<Observation>>, ApiError> {
    current.require(&state, Resource::Observation, Action::Read).await?;
    let observations = state
        .service
        .list_observations(&cycle_id, &report_id, q.status)
        .await?;
    Ok(Json(observations))
}

async fn create_observation(
    State(state): State<AppState>,
    current: CurrentUser,
    ApiPath((cycle_id, report_id)): ApiPath<(String, String)>,
    ApiJson(body): ApiJson<NewObservation>,
) -> Result<(StatusCode, Json<Observation>), ApiError> {
    current.require(&state, Resource::Observation, Action::Create).await?;
    let observation = state
        .service
        .create_observation(&current.actor, &cycle_id, &report_id, &body)
        .await?;
    Ok((StatusCode::CREATED, Json(observation)))
}

async fn get_observation(
    State(state): State<AppState>,
    current: CurrentUser,
    ApiPath(id): ApiPath<String>,
) -> Result<Json<Observation>, ApiError> {
    current.require(&state, Resource::Observation, Action::Read).await?;
    Ok(Json(state.service.get_observation(&id).await?))
}

async fn update_observation(
    State(state): State<AppState>,
    current: CurrentUser,
    ApiPath(id): ApiPath<String>,
    ApiJson(update): ApiJson<ObservationUpdate>,
) -> Result<Json<Observation>, ApiError> {
    current.require(&state, Resource::Observation, Action::Update).await?;
    let observation = state
        .service
        .update_observation(&current.actor, &id, update)
        .await?;
    Ok(Json(observation))
}

/// Approving or rejecting needs `observation:approve`; submit and rework
/// need `observation:update`.
async fn transition_observation(
    State(state): State<AppState>,
    current: CurrentUser,
    ApiPath(id): ApiPath<String>,
    ApiJson(body): ApiJson<TransitionBody>,
) -> Result<Json<Observation>, ApiError> {
    let action = match body.status {
        ObservationStatus::Approved | ObservationStatus::Rejected => Action::Approve,
        _ => Action::Update,
    };
    current.require(&state, Resource::Observation, action).await?;
    let observation = state
        .service
        .transition_observation(&current.actor, &id, body.status, body.reason.as_deref())
        .await?;
    Ok(Json(observation))
}
