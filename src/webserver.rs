use crate::state::ControllerState;
use axum::extract::State;
use axum::response::Response;
use axum::{Json, Router, http::StatusCode, response::IntoResponse, routing::get};
use std::sync::Arc;

pub async fn liveness_probe() -> impl IntoResponse {
    StatusCode::NO_CONTENT
}

/// Ready once the first reconciliation pass has completed.
pub async fn readiness_probe(State(state): State<Arc<ControllerState>>) -> impl IntoResponse {
    match state.last_pass().await {
        Some(_) => StatusCode::NO_CONTENT,
        None => StatusCode::SERVICE_UNAVAILABLE,
    }
}

pub async fn last_pass(State(state): State<Arc<ControllerState>>) -> Response {
    match state.last_pass().await {
        Some(report) => Json(report).into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    }
}

pub fn create_app(state: Arc<ControllerState>) -> Router {
    Router::new()
        .route("/health/live", get(liveness_probe))
        .route("/health/ready", get(readiness_probe))
        .route("/status", get(last_pass))
        .with_state(state)
}
