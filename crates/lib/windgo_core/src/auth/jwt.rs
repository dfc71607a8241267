//! Access token issuance and validation.

use std::path::PathBuf;

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use rand::distr::Alphanumeric;
use rand::{Rng, rng};
use thiserror::Error;
use tracing::{info, warn};

use crate::models::auth::TokenClaims;

/// Access token lifetime: 24 hours.
pub const ACCESS_TOKEN_TTL_SECS: i64 = 24 * 60 * 60;

/// Token validation and signing errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("invalid token signature or algorithm")]
    InvalidSignature,

    #[error("token expired")]
    Expired,

    #[error("token not yet valid")]
    NotYetValid,

    #[error("malformed token: {0}")]
    Malformed(String),

    #[error("token signing failed: {0}")]
    Signing(String),
}

/// Signs and validates HMAC bearer tokens with a server-held secret.
#[derive(Clone)]
pub struct TokenService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
}

impl TokenService {
    pub fn new(secret: &[u8]) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.algorithms = vec![Algorithm::HS256, Algorithm::HS384, Algorithm::HS512];
        // exp/nbf are checked against the injected clock in `validate`.
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "nbf"]);
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            validation,
        }
    }

    /// Issue an HS256 token for `user_id`, optionally bound to a device.
    pub fn issue(
        &self,
        user_id: i64,
        device_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<String, TokenError> {
        let claims = TokenClaims {
            user_id,
            device_id: device_id.map(str::to_string),
            iat: now.timestamp(),
            nbf: now.timestamp(),
            exp: (now + Duration::seconds(ACCESS_TOKEN_TTL_SECS)).timestamp(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| TokenError::Signing(e.to_string()))
    }

    /// Validate a token and return its claims.
    pub fn validate(&self, token: &str, now: DateTime<Utc>) -> Result<TokenClaims, TokenError> {
        let claims = decode::<TokenClaims>(token, &self.decoding, &self.validation)
            .map_err(|e| match e.kind() {
                ErrorKind::InvalidSignature
                | ErrorKind::InvalidAlgorithm
                | ErrorKind::InvalidAlgorithmName => TokenError::InvalidSignature,
                _ => TokenError::Malformed(e.to_string()),
            })?
            .claims;

        let now = now.timestamp();
        if now > claims.exp {
            return Err(TokenError::Expired);
        }
        if now < claims.nbf {
            return Err(TokenError::NotYetValid);
        }
        Ok(claims)
    }
}

/// Resolve the signing secret: `JWT_SECRET` → `AUTH_SECRET` → persisted file
/// → freshly generated (and persisted) random secret.
pub fn resolve_jwt_secret() -> String {
    if let Ok(secret) = std::env::var("JWT_SECRET")
        && !secret.is_empty()
    {
        return secret;
    }
    if let Ok(secret) = std::env::var("AUTH_SECRET")
        && !secret.is_empty()
    {
        return secret;
    }
    load_or_create_secret(&jwt_secret_path())
}

fn load_or_create_secret(path: &std::path::Path) -> String {
    if let Ok(existing) = std::fs::read_to_string(path) {
        let trimmed = existing.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }
    let secret: String = rng()
        .sample_iter(&Alphanumeric)
        .take(64)
        .map(char::from)
        .collect();
    if let Some(parent) = path.parent()
        && let Err(e) = std::fs::create_dir_all(parent)
    {
        warn!(path = %parent.display(), error = %e, "could not create secret directory");
    }
    match std::fs::write(path, &secret) {
        Ok(()) => info!(path = %path.display(), "generated new JWT secret"),
        Err(e) => warn!(
            path = %path.display(),
            error = %e,
            "could not persist JWT secret; tokens will not survive a restart"
        ),
    }
    secret
}

/// Path to the persisted JWT secret file.
fn jwt_secret_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("windgo")
        .join("jwt-secret")
}
