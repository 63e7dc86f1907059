//! Liveness probe. Unauthenticated.

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{Value, json};

use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}

async fn health_check(State(state): State<AppState>) -> Json<Value> {
    let database = match state.service.permissions_seeded().await {
        Ok(_) => "UP",
        Err(e) => {
            tracing::warn!(error = %e, "health check query failed");
            "DOWN"
        }
    };
    Json(json!({
        "status": if database == "UP" { "UP" } else { "DEGRADED" },
        "version": env!("CARGO_PKG_VERSION"),
        "dependencies": { "database": { "status": database } },
    }))
}
