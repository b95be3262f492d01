//! Health and discovery endpoints.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use berth_facade::OverallState;

use crate::state::AppState;

pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let health = state.plane.health().await;
    let status = match health.overall {
        OverallState::Healthy | OverallState::Degraded => StatusCode::OK,
        OverallState::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };
    (status, Json(health))
}

pub async fn catalog(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(state.plane.catalog())
}
