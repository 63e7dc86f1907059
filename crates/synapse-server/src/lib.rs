//! # synapse-server
//!
//! HTTP surface for SynapseDTE.
//!
//! Every route under `/api/v1` authenticates the bearer token, checks the
//! RBAC matrix for the route's `(resource, action)` and delegates to
//! [`SynapseService`]. A background task runs the SLA monitor while the
//! server is up.

pub mod auth;
pub mod error;
pub mod extract;
pub mod routes;
pub mod scheduler;

use std::sync::Arc;

use axum::Router;
use synapse_config::SynapseConfig;
use synapse_db::service::SynapseService;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::trace::TraceLayer;

pub use error::{ApiError, ServerError};

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<SynapseService>,
    pub config: Arc<SynapseConfig>,
}

impl AppState {
    #[must_use]
    pub fn new(service: SynapseService, config: SynapseConfig) -> Self {
        Self {
            service: Arc::new(service),
            config: Arc::new(config),
        }
    }

    /// `requested` or the configured default, capped at 1000.
    #[must_use]
    pub fn limit(&self, requested: Option<u32>) -> u32 {
        requested
            .unwrap_or(self.config.general.default_limit)
            .clamp(1, 1000)
    }
}

/// Build the full router: `/health` plus the `/api/v1` tree.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(routes::health::router())
        .nest("/api/v1", routes::api_router())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind, serve until ctrl-c, then stop the SLA monitor.
///
/// # Errors
///
/// `ServerError::Io` when the address cannot be bound or the listener fails.
pub async fn serve(state: AppState) -> Result<(), ServerError> {
    let addr = state.config.server.socket_addr();
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "synapse server listening");

    let (stop_tx, stop_rx) = watch::channel(false);
    let monitor = state.config.sla.enabled.then(|| {
        scheduler::spawn_sla_monitor(
            Arc::clone(&state.service),
            state.config.sla.clone(),
            stop_rx,
        )
    });
    if monitor.is_none() {
        tracing::info!("SLA monitor disabled");
    }

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let _ = stop_tx.send(true);
    if let Some(handle) = monitor {
        if let Err(e) = handle.await {
            tracing::warn!(error = %e, "SLA monitor task ended abnormally");
        }
    }
    tracing::info!("synapse server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown requested");
}
