//! Liveness endpoints.

use axum::Json;
use axum::extract::State;

use crate::AppState;
use crate::models::{HealthResponse, MessageResponse};

/// `GET /`
pub async fn root() -> Json<MessageResponse> {
    Json(MessageResponse::new("WindGo Chat API is running!"))
}

/// `GET /health`: reports whether the database answers.
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let database = if state.credentials.ping().await {
        "connected"
    } else {
        "unavailable"
    };
    Json(HealthResponse {
        status: "healthy",
        database,
    })
}
