//! Turning login results into responses.

use axum_extra::extract::CookieJar;
use windgo_core::auth::{LoginResult, Session, issue_session};

use crate::AppState;
use crate::error::{AppError, AppResult};
use crate::models::TokenResponse;
use crate::services::cookies;

/// Mint an access token for `result` at the state's current time.
pub fn mint(state: &AppState, result: LoginResult) -> AppResult<Session> {
    Ok(issue_session(&state.tokens, result, state.clock.now())?)
}

/// Body for the flows that return the token in JSON.
pub fn token_response(session: Session) -> TokenResponse {
    TokenResponse {
        token: session.access_token,
        user: session.user,
    }
}

/// Set the access and refresh cookies of a device-bound session.
pub fn with_device_cookies(state: &AppState, jar: CookieJar, session: &Session) -> AppResult<CookieJar> {
    let grant = session
        .device
        .as_ref()
        .ok_or_else(|| AppError::Internal("device session without a device".into()))?;
    let secure = state.config.secure_cookies;
    Ok(jar
        .add(cookies::access_cookie(&session.access_token, secure))
        .add(cookies::refresh_cookie(&grant.refresh_token, secure)))
}

/// Remove both auth cookies.
pub fn clear_device_cookies(state: &AppState, jar: CookieJar) -> CookieJar {
    let secure = state.config.secure_cookies;
    jar.add(cookies::clear_access_cookie(secure))
        .add(cookies::clear_refresh_cookie(secure))
}
