//! Request and response bodies.

use serde::{Deserialize, Serialize};
use windgo_core::models::auth::{Device, User};
use windgo_core::models::chat::{DirectoryUser, Message, Pagination, Room};

// =============================================================================
// Auth
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub role: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Bearer token plus the authenticated user.
#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub token: String,
    pub user: User,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub database: &'static str,
}

// =============================================================================
// GitHub
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct CallbackParams {
    pub state: Option<String>,
    pub code: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct GitHubStatusResponse {
    pub configured: bool,
}

/// Device poll input. `timeout` and `interval` are seconds.
#[derive(Debug, Deserialize)]
pub struct DevicePollRequest {
    pub device_code: String,
    #[serde(default)]
    pub timeout: Option<u64>,
    #[serde(default)]
    pub interval: Option<u64>,
}

// =============================================================================
// SSH
// =============================================================================

#[derive(Debug, Serialize)]
pub struct NonceResponse {
    pub nonce_id: String,
    pub nonce: String,
}

#[derive(Debug, Deserialize)]
pub struct SshLoginRequest {
    pub github_user: String,
    /// Armored SSHSIG over the nonce, or its base64 body.
    pub signed: String,
    pub pub_fingerprint: String,
    pub nonce_id: String,
    pub device_name: String,
    pub device_type: String,
}

#[derive(Debug, Serialize)]
pub struct SshLoginResponse {
    pub user_id: i64,
    pub device_id: String,
    pub user: User,
}

// =============================================================================
// Devices
// =============================================================================

#[derive(Debug, Serialize)]
pub struct MeResponse {
    pub user: User,
    pub current_device: Option<Device>,
    pub devices: Vec<Device>,
}

#[derive(Debug, Serialize)]
pub struct RevokeAllResponse {
    pub revoked: u64,
}

// =============================================================================
// Chat
// =============================================================================

#[derive(Debug, Serialize)]
pub struct RoomsResponse {
    pub rooms: Vec<Room>,
}

#[derive(Debug, Deserialize)]
pub struct CreateRoomRequest {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub room_id: i64,
    pub content: String,
}

#[derive(Debug, Serialize)]
pub struct SendMessageResponse {
    pub message: &'static str,
    pub data: Message,
}

#[derive(Debug, Deserialize)]
pub struct PageParams {
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct MessagesResponse {
    pub messages: Vec<Message>,
    pub pagination: Pagination,
}

#[derive(Debug, Deserialize)]
pub struct UserSearchParams {
    pub search: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct UsersResponse {
    pub users: Vec<DirectoryUser>,
}
