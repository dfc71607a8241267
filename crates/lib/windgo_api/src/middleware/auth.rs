//! Authentication middleware: bearer or cookie token verification.

use axum::http::header::AUTHORIZATION;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use axum_extra::extract::CookieJar;
use tracing::debug;

use crate::AppState;
use crate::error::AppError;
use crate::services::cookies::ACCESS_COOKIE;

/// Identity of the caller, inserted into request extensions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub user_id: i64,
    /// Set for tokens minted by a device-bound login.
    pub device_id: Option<String>,
}

/// Token from `Authorization: Bearer <token>`, else the access token cookie.
fn extract_token(request: &Request) -> Option<String> {
    let bearer = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty());
    if let Some(token) = bearer {
        return Some(token.to_string());
    }
    CookieJar::from_headers(request.headers())
        .get(ACCESS_COOKIE)
        .map(|c| c.value().to_string())
        .filter(|t| !t.is_empty())
}

/// Axum middleware: verifies the access token and injects
/// [`AuthenticatedUser`] into request extensions.
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = extract_token(&request)
        .ok_or_else(|| AppError::Unauthorized("Authorization token required".into()))?;

    let claims = state
        .tokens
        .validate(&token, state.clock.now())
        .map_err(|e| {
            debug!(error = %e, "rejected access token");
            AppError::Unauthorized("Invalid or expired token".into())
        })?;

    request.extensions_mut().insert(AuthenticatedUser {
        user_id: claims.user_id,
        device_id: claims.device_id,
    });

    Ok(next.run(request).await)
}
