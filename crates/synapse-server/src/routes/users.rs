use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use synapse_core::entities::User;
use synapse_core::enums::{Action, Resource, Role};
use synapse_core::responses::UserCreated;

use crate::AppState;
use crate::auth::CurrentUser;
use crate::error::ApiError;
use crate::extract::{ApiJson, ApiPath, ApiQuery};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/users", get(list_users).post(create_user))
        .route("/users/me", get(me))
        .route("/users/{id}", get(get_user))
        .route("/users/{id}/active", post(set_active))
        .route("/users/{id}/token", post(rotate_token))
}

#[derive(Debug, Deserialize)]
struct ListUsersQuery {
    role: Option<Role>,
    limit: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct CreateUserBody {
    email: String,
    display_name: String,
    role: Role,
}

#[derive(Debug, Deserialize)]
struct ActiveBody {
    active: bool,
}

async fn list_users(
    State(state): State<AppState>,
    current: CurrentUser,
    ApiQuery(q): ApiQuery<ListUsersQuery>,
) -> Result<Json<Vec<User>>, ApiError> {
    current.require(&state, Resource::User, Action::Read).await?;
    let users = state.service.list_users(q.role, state.limit(q.limit)).await?;
    Ok(Json(users))
}

async fn create_user(
    State(state): State<AppState>,
    current: CurrentUser,
    ApiJson(body): ApiJson<CreateUserBody>,
) -> Result<(StatusCode, Json<UserCreated>), ApiError> {
    current.require(&state, Resource::User, Action::Create).await?;
    let created = state
        .service
        .create_user(&current.actor, &body.email, &body.display_name, body.role)
        .await?;
    tracing::info!(user_id = %created.user.id, role = %created.user.role, "user created");
    Ok((StatusCode::CREATED, Json(created)))
}

async fn me(current: CurrentUser) -> Json<User> {
    Json(current.user)
}

async fn get_user(
    State(state): State<AppState>,
    current: CurrentUser,
    ApiPath(id): ApiPath<String>,
) -> Result<Json<User>, ApiError> {
    current.require(&state, Resource::User, Action::Read).await?;
    Ok(Json(state.service.get_user(&id).await?))
}

async fn set_active(
    State(state): State<AppState>,
    current: CurrentUser,
    ApiPath(id): ApiPath<String>,
    ApiJson(body): ApiJson<ActiveBody>,
) -> Result<Json<User>, ApiError> {
    current.require(&state, Resource::User, Action::Update).await?;
    let user = state
        .service
        .set_user_active(&current.actor, &id, body.active)
        .await?;
    Ok(Json(user))
}

/// Users may rotate their own token; rotating someone else's needs `user:update`.
async fn rotate_token(
    State(state): State<AppState>,
    current: CurrentUser,
    ApiPath(id): ApiPath<String>,
) -> Result<Json<UserCreated>, ApiError> {
    if id != current.user.id {
        current.require(&state, Resource::User, Action::Update).await?;
    }
    Ok(Json(state.service.rotate_token(&current.actor, &id).await?))
}
