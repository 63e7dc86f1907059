//! `/api/v1` route table.

pub mod assignments;
pub mod audit;
pub mod cycles;
pub mod health;
pub mod observations;
pub mod permissions;
pub mod reports;
pub mod sla;
pub mod users;
pub mod workflow;

use axum::Router;

use crate::AppState;

pub fn api_router() -> Router<AppState> {
    Router::new()
        .merge(users::router())
        .merge(cycles::router())
        .merge(reports::router())
        .merge(workflow::router())
        .merge(observations::router())
        .merge(assignments::router())
        .merge(sla::router())
        .merge(audit::router())
        .merge(permissions::router())
}
