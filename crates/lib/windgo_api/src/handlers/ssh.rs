//! SSH signature login handlers.

use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum_extra::extract::CookieJar;
use windgo_core::auth::github::is_valid_login;
use windgo_core::auth::ssh::{self, SshLogin};
use windgo_core::models::auth::DeviceType;

use super::json_body;
use crate::AppState;
use crate::error::{AppError, AppResult};
use crate::models::{NonceResponse, SshLoginRequest, SshLoginResponse};
use crate::services::session;

/// `POST /auth/nonce`: issue a single-use challenge.
pub async fn nonce_handler(State(state): State<AppState>) -> AppResult<Json<NonceResponse>> {
    let challenge = ssh::generate_nonce(state.credentials.as_ref(), state.clock.now()).await?;
    Ok(Json(NonceResponse {
        nonce_id: challenge.nonce_id,
        nonce: challenge.nonce,
    }))
}

/// `POST /auth/login/ssh`: redeem a nonce with a signature, register the
/// device and set both auth cookies.
pub async fn login_handler(
    State(state): State<AppState>,
    jar: CookieJar,
    payload: Result<Json<SshLoginRequest>, JsonRejection>,
) -> AppResult<(CookieJar, Json<SshLoginResponse>)> {
    let body = json_body(payload)?;
    let required = [
        &body.github_user,
        &body.signed,
        &body.pub_fingerprint,
        &body.nonce_id,
        &body.device_name,
    ];
    if required.iter().any(|v| v.trim().is_empty()) {
        return Err(AppError::Validation("Missing required fields".into()));
    }
    if !is_valid_login(&body.github_user) {
        return Err(AppError::Validation("Invalid GitHub username".into()));
    }
    let device_type: DeviceType = body.device_type.parse().map_err(AppError::Validation)?;

    let result = ssh::login(
        state.credentials.as_ref(),
        &state.github,
        &SshLogin {
            github_user: body.github_user,
            signature: body.signed,
            fingerprint: body.pub_fingerprint,
            nonce_id: body.nonce_id,
            device_name: body.device_name,
            device_type,
        },
        state.clock.now(),
    )
    .await?;

    let session = session::mint(&state, result)?;
    let jar = session::with_device_cookies(&state, jar, &session)?;
    let device_id = session
        .device
        .as_ref()
        .map(|g| g.device.device_id.clone())
        .unwrap_or_default();
    Ok((
        jar,
        Json(SshLoginResponse {
            user_id: session.user.id,
            device_id,
            user: session.user,
        }),
    ))
}
