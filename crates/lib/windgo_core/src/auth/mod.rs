//! Authentication core.
//!
//! Every login protocol (password, GitHub authorization code, GitHub device
//! flow, SSH signature) ends in a [`LoginResult`]: the canonical user plus,
//! for device-bound flows, the freshly registered device. [`issue_session`]
//! turns that into a bearer token in one place.

pub mod device_flow;
pub mod github;
pub mod jwt;
pub mod local;
pub mod oauth;
pub mod password;
pub mod random;
pub mod reconcile;
pub mod sessions;
pub mod ssh;

use chrono::{DateTime, Utc};
use thiserror::Error;

pub use jwt::{TokenError, TokenService};

use crate::models::auth::{Device, User};
use crate::store::StoreError;

/// Authentication errors.
///
/// Display strings are for logs. HTTP callers see the generic messages the
/// API layer maps these to.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("User with this email or username already exists")]
    Conflict,

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Token error: {0}")]
    Token(#[from] TokenError),

    #[error("OAuth state mismatch")]
    StateMismatch,

    #[error("Missing authorization code")]
    MissingCode,

    #[error("No verified email on the GitHub account")]
    NoVerifiedEmail,

    #[error("GitHub OAuth is not configured")]
    NotConfigured,

    #[error("Upstream error: {0}")]
    Upstream(String),

    #[error("Upstream protocol error: {0}")]
    UpstreamProtocol(String),

    #[error("Device code expired")]
    CodeExpired,

    #[error("Access denied")]
    AccessDenied,

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Nonce is unknown or already used")]
    InvalidOrExpiredNonce,

    #[error("Nonce expired")]
    NonceExpired,

    #[error("Signature verification failed")]
    SignatureVerificationFailed,

    #[error("No free username derived from '{0}'")]
    UsernameExhausted(String),

    #[error("Invalid refresh token")]
    InvalidRefreshToken,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// A device registered by a successful device-bound login, together with the
/// plaintext refresh token that was handed out for it.
#[derive(Debug, Clone)]
pub struct DeviceGrant {
    pub device: Device,
    pub refresh_token: String,
}

/// Outcome of any login protocol.
#[derive(Debug, Clone)]
pub struct LoginResult {
    pub user: User,
    pub device: Option<DeviceGrant>,
}

impl LoginResult {
    pub fn user(user: User) -> Self {
        Self { user, device: None }
    }

    pub fn with_device(user: User, device: DeviceGrant) -> Self {
        Self {
            user,
            device: Some(device),
        }
    }
}

/// A login result with a minted access token.
#[derive(Debug, Clone)]
pub struct Session {
    pub access_token: String,
    pub user: User,
    pub device: Option<DeviceGrant>,
}

/// Mint the access token for a login result, bound to its device if any.
pub fn issue_session(
    tokens: &TokenService,
    result: LoginResult,
    now: DateTime<Utc>,
) -> Result<Session, AuthError> {
    let device_id = result.device.as_ref().map(|g| g.device.device_id.as_str());
    let access_token = tokens.issue(result.user.id, device_id, now)?;
    Ok(Session {
        access_token,
        user: result.user,
        device: result.device,
    })
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::models::auth::{AuthProvider, DeviceType, Role};

    fn user() -> User {
        let now = Utc::now();
        User {
            id: 42,
            username: "carol".into(),
            email: "carol@x.com".into(),
            role: Role::User,
            provider: AuthProvider::Local,
            github_id: None,
            avatar_url: None,
            last_active_at: None,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    #[test]
    fn session_token_carries_device_binding() {
        let tokens = TokenService::new(b"test-secret");
        let now = Utc::now();
        let grant = DeviceGrant {
            device: Device {
                device_id: "dev_abc".into(),
                user_id: 42,
                device_name: "laptop".into(),
                device_type: DeviceType::Cli,
                last_used_at: now,
                is_active: true,
                refresh_token_hash: "h".into(),
                created_at: now,
            },
            refresh_token: "r".into(),
        };

        let session = issue_session(&tokens, LoginResult::with_device(user(), grant), now).unwrap();
        let claims = tokens.validate(&session.access_token, now).unwrap();
        assert_eq!(claims.user_id, 42);
        assert_eq!(claims.device_id.as_deref(), Some("dev_abc"));

        let session = issue_session(&tokens, LoginResult::user(user()), now).unwrap();
        let claims = tokens.validate(&session.access_token, now).unwrap();
        assert_eq!(claims.device_id, None);
    }
}
