//! Session routes.
//!
//! Explicit login against the catalogue plus introspection, refresh and
//! logout of the issued session. Login hits the per-identity cache before
//! paying a catalogue handshake.

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use super::bearer_token;
use crate::error::{GatewayError, GatewayResult};
use crate::state::AppState;

/// Create the session router.
pub fn router() -> Router<AppState> {
    Router::new().route(
        "/sessions",
        post(login).get(details).delete(logout).put(refresh),
    )
}

#[derive(Deserialize)]
struct LoginRequest {
    username: String,
    password: String,
    #[serde(default = "default_mechanism")]
    mechanism: String,
}

fn default_mechanism() -> String {
    "simple".to_string()
}

#[derive(Serialize)]
struct LoginResponse {
    #[serde(rename = "sessionID")]
    session_id: String,
}

#[derive(Serialize)]
struct SessionDetailsResponse {
    #[serde(rename = "ID")]
    id: String,
    #[serde(rename = "EXPIREDATETIME")]
    expire_date_time: String,
    #[serde(rename = "USERNAME")]
    username: String,
}

async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> GatewayResult<Json<LoginResponse>> {
    let session_id = state
        .catalogue()
        .login(&request.mechanism, &request.username, &request.password)
        .await?;
    Ok(Json(LoginResponse { session_id }))
}

async fn details(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> GatewayResult<Json<SessionDetailsResponse>> {
    let session_id = bearer_token(&headers).ok_or(GatewayError::AuthenticationFailed)?;
    let details = state.catalogue().session_details(&session_id).await?;

    let expires_at = chrono::Utc::now()
        + chrono::Duration::seconds((details.remaining_minutes * 60.0) as i64);

    Ok(Json(SessionDetailsResponse {
        id: session_id,
        expire_date_time: expires_at.format("%Y-%m-%d %H:%M:%S").to_string(),
        username: details.user_name,
    }))
}

async fn logout(State(state): State<AppState>, headers: HeaderMap) -> GatewayResult<StatusCode> {
    let session_id = bearer_token(&headers).ok_or(GatewayError::AuthenticationFailed)?;
    state.catalogue().logout(&session_id).await?;
    Ok(StatusCode::OK)
}

async fn refresh(State(state): State<AppState>, headers: HeaderMap) -> GatewayResult<StatusCode> {
    let session_id = bearer_token(&headers).ok_or(GatewayError::AuthenticationFailed)?;
    state.catalogue().refresh(&session_id).await?;
    Ok(StatusCode::OK)
}
