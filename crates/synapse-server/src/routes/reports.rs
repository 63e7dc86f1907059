//! Report catalogue and attribute scoping.

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use synapse_core::entities::{Report, ReportAttribute};
use synapse_core::enums::{Action, Resource};
use synapse_db::repos::attribute::NewAttribute;
use synapse_db::repos::report::NewReport;

use crate::AppState;
use crate::auth::CurrentUser;
use crate::error::ApiError;
use crate::extract::{ApiJson, ApiPath, ApiQuery};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/reports", get(list_reports).post(create_report))
        .route("/reports/{report_id}", get(get_report))
        .route("/reports/{report_id}/attributes", get(list_attributes).post(add_attribute))
        .route("/attributes/{id}", get(get_attribute))
        .route("/attributes/{id}/scoping", post(set_scoping))
}

#[derive(Debug, Deserialize)]
struct LimitQuery {
    limit: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ScopingBody {
    in_scope: bool,
}

async fn list_reports(
    State(state): State<AppState>,
    current: CurrentUser,
    ApiQuery(q): ApiQuery<LimitQuery>,
) -> Result<Json<Vec<Report>>, ApiError> {
    current.require(&state, Resource::Report, Action::Read).await?;
    Ok(Json(state.service.list_reports(state.limit(q.limit)).await?))
}

async fn create_report(
    State(state): State<AppState>,
    current: CurrentUser,
    ApiJson(body): ApiJson<NewReport>,
) -> Result<(StatusCode, Json<Report>), ApiError> {
    current.require(&state, Resource::Report, Action::Create).await?;
    let report = state.service.create_report(&current.actor, &body).await?;
    Ok((StatusCode::CREATED, Json(report)))
}

async fn get_report(
    State(state): State<AppState>,
    current: CurrentUser,
    ApiPath(id): ApiPath<String>,
) -> Result<Json<Report>, ApiError> {
    current.require(&state, Resource::Report, Action::Read).await?;
    Ok(Json(state.service.get_report(&id).await?))
}

async fn list_attributes(
    State(state): State<AppState>,
    current: CurrentUser,
    ApiPath(id): ApiPath<String>,
) -> Result<Json<Vec<ReportAttribute>>, ApiError> {
    current.require(&state, Resource::Attribute, Action::Read).await?;
    Ok(Json(state.service.list_attributes(&id).await?))
}

async fn add_attribute(
    State(state): State<AppState>,
    current: CurrentUser,
    ApiPath(id): ApiPath<String>,
    ApiJson(body): ApiJson<NewAttribute>,
) -> Result<(StatusCode, Json<ReportAttribute>), ApiError> {
    current.require(&state, Resource::Attribute, Action::Create).await?;
    let attribute = state.service.add_attribute(&current.actor, &id, &body).await?;
    Ok((StatusCode::CREATED, Json(attribute)))
}

async fn get_attribute(
    State(state): State<AppState>,
    current: CurrentUser,
    ApiPath(id): ApiPath<String>,
) -> Result<Json<ReportAttribute>, ApiError> {
    current.require(&state, Resource::Attribute, Action::Read).await?;
    Ok(Json(state.service.get_attribute(&id).await?))
}

async fn set_scoping(
    State(state): State<AppState>,
    current: CurrentUser,
    ApiPath(id): ApiPath<String>,
    ApiJson(body): ApiJson<ScopingBody>,
) -> Result<Json<ReportAttribute>, ApiError> {
    current.require(&state, Resource::Attribute, Action::Update).await?;
    let attribute = state
        .service
        .set_attribute_scoping(&current.actor, &id, body.in_scope)
        .await?;
    Ok(Json(attribute))
}
