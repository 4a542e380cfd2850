//! Health check endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use serde::Serialize;

use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub services: ServiceHealth,
}

/// Which collaborators this process was wired with.
#[derive(Serialize)]
pub struct ServiceHealth {
    pub inventory: bool,
    pub checkout: bool,
    pub maintenance: bool,
}

/// GET /health: liveness plus the wired services.
pub async fn check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        services: ServiceHealth {
            inventory: state.inventory().is_ok(),
            checkout: state.checkout().is_ok(),
            maintenance: state.sweeper().is_ok(),
        },
    })
}
