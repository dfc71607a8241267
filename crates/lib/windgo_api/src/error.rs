//! Application error types.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;
use tracing::{error, warn};
use windgo_core::auth::AuthError;
use windgo_core::store::StoreError;

/// Convenience alias for handler return types.
pub type AppResult<T> = Result<T, AppError>;

/// JSON body of every error response.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Application-level errors with HTTP status mapping.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Bad gateway: {0}")]
    BadGateway(String),

    #[error("Misconfigured: {0}")]
    Misconfigured(String),

    #[error("Internal server error")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::Validation(m) => (StatusCode::BAD_REQUEST, m.as_str()),
            AppError::Conflict(m) => (StatusCode::CONFLICT, m.as_str()),
            AppError::Unauthorized(m) => (StatusCode::UNAUTHORIZED, m.as_str()),
            AppError::NotFound(m) => (StatusCode::NOT_FOUND, m.as_str()),
            AppError::Timeout(m) => (StatusCode::REQUEST_TIMEOUT, m.as_str()),
            AppError::BadGateway(m) => (StatusCode::BAD_GATEWAY, m.as_str()),
            AppError::Misconfigured(m) => (StatusCode::INTERNAL_SERVER_ERROR, m.as_str()),
            AppError::Internal(detail) => {
                error!(detail = %detail, "internal error");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
            }
        };
        let body = Json(ErrorResponse {
            error: message.to_string(),
        });
        (status, body).into_response()
    }
}

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Conflict(m) => AppError::Conflict(m),
            StoreError::NotFound(m) => AppError::NotFound(m),
            other => AppError::Internal(other.to_string()),
        }
    }
}

impl From<AuthError> for AppError {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::Conflict => {
                AppError::Conflict("User with this email or username already exists".into())
            }
            AuthError::InvalidCredentials => AppError::Unauthorized("Invalid credentials".into()),
            AuthError::Token(_) => AppError::Unauthorized("Invalid or expired token".into()),
            AuthError::StateMismatch => AppError::Validation("Invalid OAuth state".into()),
            AuthError::MissingCode => AppError::Validation("Missing state or code".into()),
            AuthError::NoVerifiedEmail => {
                AppError::Unauthorized("No verified email available from GitHub".into())
            }
            AuthError::NotConfigured => {
                AppError::Misconfigured("GitHub OAuth is not configured".into())
            }
            AuthError::Upstream(detail) => {
                warn!(detail = %detail, "GitHub call failed");
                AppError::BadGateway("Failed to contact GitHub".into())
            }
            AuthError::UpstreamProtocol(detail) => {
                warn!(detail = %detail, "unexpected GitHub response");
                AppError::BadGateway("Invalid response from GitHub".into())
            }
            AuthError::CodeExpired => AppError::Validation("Device code expired".into()),
            AuthError::AccessDenied => AppError::Unauthorized("Access denied".into()),
            AuthError::Timeout(detail) => AppError::Timeout(detail),
            AuthError::InvalidOrExpiredNonce | AuthError::NonceExpired => {
                AppError::Unauthorized("Invalid or expired nonce".into())
            }
            AuthError::SignatureVerificationFailed => {
                AppError::Unauthorized("Invalid credentials".into())
            }
            AuthError::UsernameExhausted(base) => {
                AppError::Conflict(format!("No free username derived from '{base}'"))
            }
            AuthError::InvalidRefreshToken => AppError::Unauthorized("Invalid refresh token".into()),
            AuthError::NotFound(m) => AppError::NotFound(m),
            AuthError::Validation(m) => AppError::Validation(m),
            AuthError::Store(e) => AppError::from(e),
            AuthError::Internal(m) => AppError::Internal(m),
        }
    }
}
