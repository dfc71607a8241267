//! GitHub OAuth code flow and device flow handlers.

use std::time::Duration;

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::http::{StatusCode, header};
use axum_extra::extract::CookieJar;
use windgo_core::auth::device_flow::{
    self, DEFAULT_POLL_INTERVAL, DEFAULT_POLL_TIMEOUT, MAX_POLL_TIMEOUT,
};
use windgo_core::auth::github::DeviceAuthorization;
use windgo_core::auth::oauth;

use super::json_body;
use crate::AppState;
use crate::error::{AppError, AppResult};
use crate::models::{CallbackParams, DevicePollRequest, GitHubStatusResponse, TokenResponse};
use crate::services::cookies::{self, OAUTH_STATE_COOKIE};
use crate::services::session;

/// `GET /auth/github/login`: set the state cookie and redirect to GitHub.
pub async fn login_redirect_handler(
    State(state): State<AppState>,
    jar: CookieJar,
) -> AppResult<(StatusCode, CookieJar, [(header::HeaderName, String); 1])> {
    let redirect = oauth::begin(&state.github)?;
    let jar = jar.add(cookies::oauth_state_cookie(
        &redirect.state,
        state.config.secure_cookies,
    ));
    Ok((StatusCode::FOUND, jar, [(header::LOCATION, redirect.url)]))
}

/// `GET /auth/github/callback`: verify state, exchange the code, log in.
pub async fn callback_handler(
    State(state): State<AppState>,
    jar: CookieJar,
    Query(params): Query<CallbackParams>,
) -> AppResult<(CookieJar, Json<TokenResponse>)> {
    let expected = jar.get(OAUTH_STATE_COOKIE).map(|c| c.value().to_string());
    let result = oauth::complete(
        state.credentials.as_ref(),
        &state.github,
        expected.as_deref(),
        oauth::Callback {
            state: params.state.as_deref(),
            code: params.code.as_deref(),
        },
    )
    .await?;

    let session = session::mint(&state, result)?;
    let jar = jar.add(cookies::clear_oauth_state_cookie(state.config.secure_cookies));
    Ok((jar, Json(session::token_response(session))))
}

/// `GET /auth/github/status`
pub async fn status_handler(State(state): State<AppState>) -> Json<GitHubStatusResponse> {
    Json(GitHubStatusResponse {
        configured: state.github.is_configured(),
    })
}

fn require_configured(state: &AppState) -> AppResult<()> {
    if state.github.is_configured() {
        Ok(())
    } else {
        Err(AppError::Validation("GitHub OAuth is not configured".into()))
    }
}

/// `POST /auth/github/device/start`: returns GitHub's device descriptor
/// unmodified.
pub async fn device_start_handler(
    State(state): State<AppState>,
) -> AppResult<Json<DeviceAuthorization>> {
    require_configured(&state)?;
    Ok(Json(device_flow::start(&state.github).await?))
}

/// `POST /auth/github/device/poll`: long-polls GitHub until the user
/// authorizes, the code expires, access is denied, or the timeout elapses.
pub async fn device_poll_handler(
    State(state): State<AppState>,
    payload: Result<Json<DevicePollRequest>, JsonRejection>,
) -> AppResult<Json<TokenResponse>> {
    require_configured(&state)?;
    let body = json_body(payload)?;
    if body.device_code.trim().is_empty() {
        return Err(AppError::Validation("device_code is required".into()));
    }
    let timeout = body
        .timeout
        .filter(|s| *s > 0)
        .map_or(DEFAULT_POLL_TIMEOUT, Duration::from_secs)
        .min(MAX_POLL_TIMEOUT);
    let interval = body
        .interval
        .filter(|s| *s > 0)
        .map_or(DEFAULT_POLL_INTERVAL, Duration::from_secs)
        .min(timeout);

    let result = device_flow::poll(
        state.credentials.as_ref(),
        &state.github,
        &body.device_code,
        timeout,
        interval,
    )
    .await?;
    let session = session::mint(&state, result)?;
    Ok(Json(session::token_response(session)))
}
