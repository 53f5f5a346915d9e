//! Health check endpoint.
//!
//! Reports whether the gateway can still see idle pool capacity. The
//! catalogue itself is not probed per health request; an unreachable
//! catalogue already surfaces as 503 on real traffic.

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;

use crate::state::AppState;

/// Health check response.
#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    idle_sessions: usize,
    spare_capacity: usize,
}

/// Health check handler.
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        idle_sessions: state.pool().available(),
        spare_capacity: state.pool().spare_capacity(),
    })
}

/// Create the health check router.
pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
