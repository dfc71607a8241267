//! Authentication domain models.
//!
//! These are internal domain models. Secrets (password hashes, refresh token
//! hashes) are never serialized.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// User role.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    #[default]
    User,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::User => "user",
        }
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Role::Admin),
            "user" => Ok(Role::User),
            other => Err(format!("unknown role '{other}'")),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which credential proof created (or last linked) the account.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthProvider {
    #[default]
    Local,
    Github,
}

impl AuthProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthProvider::Local => "local",
            AuthProvider::Github => "github",
        }
    }
}

impl FromStr for AuthProvider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "local" => Ok(AuthProvider::Local),
            "github" => Ok(AuthProvider::Github),
            other => Err(format!("unknown auth provider '{other}'")),
        }
    }
}

/// Canonical user identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub role: Role,
    pub provider: AuthProvider,
    pub github_id: Option<i64>,
    pub avatar_url: Option<String>,
    pub last_active_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip)]
    pub deleted_at: Option<DateTime<Utc>>,
}

/// User with password hash (for internal auth flows).
#[derive(Debug, Clone)]
pub struct UserWithPassword {
    pub user: User,
    pub password_hash: String,
}

/// Insert payload for a new user row.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
    pub provider: AuthProvider,
    pub github_id: Option<i64>,
    pub avatar_url: Option<String>,
}

/// An account at the external identity provider, as reported by the provider.
#[derive(Debug, Clone, PartialEq)]
pub struct ExternalIdentity {
    pub external_id: i64,
    pub login: String,
    pub name: Option<String>,
    pub email: String,
    pub avatar_url: Option<String>,
}

/// Link between one GitHub account and exactly one local user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkedIdentity {
    pub user_id: i64,
    pub github_id: i64,
    pub login: String,
    pub name: Option<String>,
    pub email: Option<String>,
    pub avatar_url: Option<String>,
}

impl LinkedIdentity {
    pub fn from_external(user_id: i64, identity: &ExternalIdentity) -> Self {
        Self {
            user_id,
            github_id: identity.external_id,
            login: identity.login.clone(),
            name: identity.name.clone(),
            email: Some(identity.email.clone()).filter(|e| !e.is_empty()),
            avatar_url: identity.avatar_url.clone(),
        }
    }
}

/// One-time challenge handed to a client for signing.
#[derive(Debug, Clone, PartialEq)]
pub struct Nonce {
    pub nonce_id: String,
    pub nonce: String,
    pub used: bool,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Kind of client a device session belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceType {
    Web,
    Cli,
    Mobile,
}

impl DeviceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceType::Web => "web",
            DeviceType::Cli => "cli",
            DeviceType::Mobile => "mobile",
        }
    }
}

impl FromStr for DeviceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "web" => Ok(DeviceType::Web),
            "cli" => Ok(DeviceType::Cli),
            "mobile" => Ok(DeviceType::Mobile),
            other => Err(format!("device_type must be one of web, cli, mobile (got '{other}')")),
        }
    }
}

/// A registered client session with its own refresh token.
///
/// Only the SHA-256 hash of the refresh token is kept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    pub device_id: String,
    pub user_id: i64,
    pub device_name: String,
    pub device_type: DeviceType,
    pub last_used_at: DateTime<Utc>,
    pub is_active: bool,
    #[serde(skip)]
    pub refresh_token_hash: String,
    pub created_at: DateTime<Utc>,
}

/// JWT claims embedded in access tokens.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Local user ID.
    pub user_id: i64,
    /// Device the token is bound to, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
    /// Issued at (unix timestamp).
    pub iat: i64,
    /// Not before (unix timestamp).
    pub nbf: i64,
    /// Expiry (unix timestamp).
    pub exp: i64,
}
