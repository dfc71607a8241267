//! Persistence seams.
//!
//! The auth core and the HTTP handlers only see [`CredentialStore`] and
//! [`ChatStore`]. [`postgres::PgStore`] is the production implementation;
//! [`memory::MemoryStore`] backs tests and `--in-memory` dev runs.
//!
//! Both implementations guarantee that [`CredentialStore::take_nonce`] and
//! [`CredentialStore::rotate_refresh_token`] are atomic compare-and-set
//! operations: of two concurrent callers presenting the same nonce or refresh
//! token, at most one succeeds.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::models::auth::{Device, LinkedIdentity, NewUser, Nonce, User, UserWithPassword};
use crate::models::chat::{Message, Room};

/// Store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
}

/// Result type for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Users, linked GitHub identities, nonces and devices.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Whether the backing database answers.
    async fn ping(&self) -> bool {
        true
    }

    /// Fetch a live (not soft-deleted) user by ID.
    async fn find_user_by_id(&self, user_id: i64) -> StoreResult<Option<User>>;

    /// Fetch a live user and its password hash by email.
    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<UserWithPassword>>;

    /// Whether any user holds this email or this username.
    async fn email_or_username_exists(&self, email: &str, username: &str) -> StoreResult<bool>;

    async fn username_exists(&self, username: &str) -> StoreResult<bool>;

    /// Insert a user. Unique violations surface as [`StoreError::Conflict`].
    async fn create_user(&self, new_user: NewUser) -> StoreResult<User>;

    /// Resolve the user linked to a GitHub account, via `github_users` or
    /// `users.github_id`.
    async fn find_user_by_github_id(&self, github_id: i64) -> StoreResult<Option<User>>;

    /// Mark `identity.user_id` as GitHub-linked (github_id, provider, avatar)
    /// and upsert its `github_users` row. Returns the updated user.
    async fn link_github_identity(&self, identity: &LinkedIdentity) -> StoreResult<User>;

    async fn find_linked_identity(&self, github_id: i64) -> StoreResult<Option<LinkedIdentity>>;

    /// Best-effort presence timestamp.
    async fn touch_user_activity(&self, user_id: i64, at: DateTime<Utc>) -> StoreResult<()>;

    async fn insert_nonce(&self, nonce: &Nonce) -> StoreResult<()>;

    /// Atomically flip an unused nonce to used and return it as it was before
    /// the flip. Returns `None` when the ID is unknown or already used.
    async fn take_nonce(&self, nonce_id: &str) -> StoreResult<Option<Nonce>>;

    /// Delete every nonce with `expires_at < now`, used or not.
    async fn delete_expired_nonces(&self, now: DateTime<Utc>) -> StoreResult<u64>;

    async fn create_device(&self, device: &Device) -> StoreResult<()>;

    /// Atomically replace the refresh token hash of the *active* device holding
    /// `old_hash` and bump `last_used_at`. Returns the updated device, or
    /// `None` when no active device holds `old_hash`.
    async fn rotate_refresh_token(
        &self,
        old_hash: &str,
        new_hash: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<Device>>;

    /// Deactivate the device holding this refresh token hash (no-op if none).
    async fn deactivate_device_by_refresh_hash(&self, refresh_hash: &str) -> StoreResult<()>;

    /// Deactivate a device owned by `user_id`. Returns `false` if the device
    /// does not exist or belongs to someone else.
    async fn deactivate_device(&self, user_id: i64, device_id: &str) -> StoreResult<bool>;

    /// Deactivate every active device of a user; returns how many changed.
    async fn deactivate_all_devices(&self, user_id: i64) -> StoreResult<u64>;

    async fn list_active_devices(&self, user_id: i64) -> StoreResult<Vec<Device>>;
}

/// Rooms, messages and the user directory.
#[async_trait]
pub trait ChatStore: Send + Sync {
    async fn list_rooms(&self) -> StoreResult<Vec<Room>>;

    async fn create_room(&self, name: &str) -> StoreResult<Room>;

    async fn find_room(&self, room_id: i64) -> StoreResult<Option<Room>>;

    async fn create_message(&self, room_id: i64, user_id: i64, content: &str)
    -> StoreResult<Message>;

    /// Messages of a room, newest first.
    async fn list_messages(&self, room_id: i64, limit: u32, offset: u64)
    -> StoreResult<Vec<Message>>;

    async fn count_messages(&self, room_id: i64) -> StoreResult<i64>;

    /// Users other than `exclude_user_id`, ordered by username. `search` is a
    /// lowercase substring matched against username and email.
    async fn list_users(&self, exclude_user_id: i64, search: Option<&str>)
    -> StoreResult<Vec<User>>;
}
