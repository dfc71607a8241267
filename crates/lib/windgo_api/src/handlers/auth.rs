//! Password login, registration, refresh and logout handlers.

use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum_extra::extract::CookieJar;
use windgo_core::auth::{local, sessions};
use windgo_core::models::auth::Role;

use super::json_body;
use crate::AppState;
use crate::error::{AppError, AppResult};
use crate::models::{LoginRequest, MessageResponse, RegisterRequest, TokenResponse};
use crate::services::cookies::REFRESH_COOKIE;
use crate::services::session;

/// `POST /auth/register`: create a local account.
pub async fn register_handler(
    State(state): State<AppState>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> AppResult<(StatusCode, Json<TokenResponse>)> {
    let body = json_body(payload)?;
    let role = body
        .role
        .as_deref()
        .map(str::parse::<Role>)
        .transpose()
        .map_err(AppError::Validation)?;

    let result = local::register(
        state.credentials.as_ref(),
        local::Registration {
            username: body.username,
            email: body.email,
            password: body.password,
            role,
        },
    )
    .await?;
    let session = session::mint(&state, result)?;
    Ok((StatusCode::CREATED, Json(session::token_response(session))))
}

/// `POST /auth/login`: authenticate with email + password.
pub async fn login_handler(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> AppResult<Json<TokenResponse>> {
    let body = json_body(payload)?;
    if body.email.trim().is_empty() || body.password.is_empty() {
        return Err(AppError::Validation("Email and password are required".into()));
    }
    let result = local::login(state.credentials.as_ref(), &body.email, &body.password).await?;
    let session = session::mint(&state, result)?;
    Ok(Json(session::token_response(session)))
}

/// `POST /auth/refresh`: rotate the refresh token cookie and mint a new
/// access token for the same device.
pub async fn refresh_handler(
    State(state): State<AppState>,
    jar: CookieJar,
) -> AppResult<(CookieJar, Json<MessageResponse>)> {
    let presented = jar
        .get(REFRESH_COOKIE)
        .map(|c| c.value().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AppError::Unauthorized("No refresh token provided".into()))?;

    let result =
        sessions::refresh(state.credentials.as_ref(), &presented, state.clock.now()).await?;
    let session = session::mint(&state, result)?;
    let jar = session::with_device_cookies(&state, jar, &session)?;
    Ok((jar, Json(MessageResponse::new("Token refreshed successfully"))))
}

/// `POST /auth/logout`: deactivate the device and clear both cookies.
pub async fn logout_handler(
    State(state): State<AppState>,
    jar: CookieJar,
) -> AppResult<(CookieJar, Json<MessageResponse>)> {
    let presented = jar
        .get(REFRESH_COOKIE)
        .map(|c| c.value().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AppError::Validation("No refresh token provided".into()))?;

    sessions::logout(state.credentials.as_ref(), &presented).await?;
    let jar = session::clear_device_cookies(&state, jar);
    Ok((jar, Json(MessageResponse::new("Logged out successfully"))))
}
