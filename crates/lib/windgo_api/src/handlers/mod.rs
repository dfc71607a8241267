//! Request handlers.

pub mod auth;
pub mod chat;
pub mod devices;
pub mod github;
pub mod health;
pub mod ssh;
pub mod users;

use axum::Json;
use axum::extract::rejection::JsonRejection;

use crate::error::{AppError, AppResult};

/// Unwrap a JSON body, reporting malformed input as a 400.
pub(crate) fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> AppResult<T> {
    payload
        .map(|Json(body)| body)
        .map_err(|e| AppError::Validation(e.body_text()))
}
