//! PostgreSQL implementation of the store traits.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use super::{ChatStore, CredentialStore, StoreError, StoreResult};
use crate::models::auth::{
    AuthProvider, Device, DeviceType, LinkedIdentity, NewUser, Nonce, Role, User,
    UserWithPassword,
};
use crate::models::chat::{Message, Room};

const USER_COLUMNS: &str = "u.id, u.username, u.email, u.password_hash, u.role, u.provider, \
     u.github_id, u.avatar_url, u.last_active_at, u.created_at, u.updated_at, u.deleted_at";

const DEVICE_COLUMNS: &str = "device_id, user_id, device_name, device_type, last_used_at, \
     is_active, refresh_token_hash, created_at";

const MESSAGE_COLUMNS: &str =
    "m.id, m.content, m.user_id, u.username, m.room_id, m.created_at";

/// Store backed by a `PgPool`.
#[derive(Clone, Debug)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Run embedded migrations.
    pub async fn migrate(&self) -> StoreResult<()> {
        crate::migrate::migrate(&self.pool).await?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

#[derive(sqlx::FromRow)]
struct UserRow {
    id: i64,
    username: String,
    email: String,
    password_hash: String,
    role: String,
    provider: String,
    github_id: Option<i64>,
    avatar_url: Option<String>,
    last_active_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    deleted_at: Option<DateTime<Utc>>,
}

impl TryFrom<UserRow> for UserWithPassword {
    type Error = sqlx::Error;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        let role = row.role.parse::<Role>().map_err(decode_err)?;
        let provider = row.provider.parse::<AuthProvider>().map_err(decode_err)?;
        Ok(UserWithPassword {
            user: User {
                id: row.id,
                username: row.username,
                email: row.email,
                role,
                provider,
                github_id: row.github_id,
                avatar_url: row.avatar_url,
                last_active_at: row.last_active_at,
                created_at: row.created_at,
                updated_at: row.updated_at,
                deleted_at: row.deleted_at,
            },
            password_hash: row.password_hash,
        })
    }
}

fn into_user(row: UserRow) -> StoreResult<User> {
    Ok(UserWithPassword::try_from(row)?.user)
}

#[derive(sqlx::FromRow)]
struct DeviceRow {
    device_id: String,
    user_id: i64,
    device_name: String,
    device_type: String,
    last_used_at: DateTime<Utc>,
    is_active: bool,
    refresh_token_hash: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<DeviceRow> for Device {
    type Error = sqlx::Error;

    fn try_from(row: DeviceRow) -> Result<Self, Self::Error> {
        Ok(Device {
            device_id: row.device_id,
            user_id: row.user_id,
            device_name: row.device_name,
            device_type: row.device_type.parse::<DeviceType>().map_err(decode_err)?,
            last_used_at: row.last_used_at,
            is_active: row.is_active,
            refresh_token_hash: row.refresh_token_hash,
            created_at: row.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct LinkedIdentityRow {
    user_id: i64,
    github_id: i64,
    login: String,
    name: Option<String>,
    email: Option<String>,
    avatar_url: Option<String>,
}

impl From<LinkedIdentityRow> for LinkedIdentity {
    fn from(row: LinkedIdentityRow) -> Self {
        LinkedIdentity {
            user_id: row.user_id,
            github_id: row.github_id,
            login: row.login,
            name: row.name,
            email: row.email,
            avatar_url: row.avatar_url,
        }
    }
}

#[derive(sqlx::FromRow)]
struct RoomRow {
    id: i64,
    name: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<RoomRow> for Room {
    fn from(row: RoomRow) -> Self {
        Room {
            id: row.id,
            name: row.name,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct MessageRow {
    id: i64,
    content: String,
    user_id: i64,
    username: String,
    room_id: i64,
    created_at: DateTime<Utc>,
}

impl From<MessageRow> for Message {
    fn from(row: MessageRow) -> Self {
        Message {
            id: row.id,
            content: row.content,
            user_id: row.user_id,
            username: row.username,
            room_id: row.room_id,
            created_at: row.created_at,
        }
    }
}

fn decode_err(msg: String) -> sqlx::Error {
    sqlx::Error::Decode(msg.into())
}

/// Map unique violations to [`StoreError::Conflict`].
fn conflict_or_db(e: sqlx::Error, what: &str) -> StoreError {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            StoreError::Conflict(format!("{what} already exists"))
        }
        _ => StoreError::Database(e),
    }
}

// ---------------------------------------------------------------------------
// Credential store
// ---------------------------------------------------------------------------

#[async_trait]
impl CredentialStore for PgStore {
    async fn ping(&self) -> bool {
        sqlx::query_scalar::<_, i32>("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .is_ok()
    }

    async fn find_user_by_id(&self, user_id: i64) -> StoreResult<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users u WHERE u.id = $1 AND u.deleted_at IS NULL"
        ))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(into_user).transpose()
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<UserWithPassword>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users u WHERE u.email = $1 AND u.deleted_at IS NULL"
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(UserWithPassword::try_from).transpose()?)
    }

    async fn email_or_username_exists(&self, email: &str, username: &str) -> StoreResult<bool> {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM users WHERE email = $1 OR username = $2)",
        )
        .bind(email)
        .bind(username)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn username_exists(&self, username: &str) -> StoreResult<bool> {
        let exists =
            sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM users WHERE username = $1)")
                .bind(username)
                .fetch_one(&self.pool)
                .await?;
        Ok(exists)
    }

    async fn create_user(&self, new_user: NewUser) -> StoreResult<User> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "INSERT INTO users AS u (username, email, password_hash, role, provider, github_id, avatar_url) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             RETURNING {USER_COLUMNS}"
        ))
        .bind(&new_user.username)
        .bind(&new_user.email)
        .bind(&new_user.password_hash)
        .bind(new_user.role.as_str())
        .bind(new_user.provider.as_str())
        .bind(new_user.github_id)
        .bind(&new_user.avatar_url)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| conflict_or_db(e, "user"))?;
        into_user(row)
    }

    async fn find_user_by_github_id(&self, github_id: i64) -> StoreResult<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users u \
             LEFT JOIN github_users g ON g.user_id = u.id \
             WHERE (g.github_id = $1 OR u.github_id = $1) AND u.deleted_at IS NULL \
             LIMIT 1"
        ))
        .bind(github_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(into_user).transpose()
    }

    async fn link_github_identity(&self, identity: &LinkedIdentity) -> StoreResult<User> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, UserRow>(&format!(
            "UPDATE users AS u SET github_id = $2, provider = 'github', \
                 avatar_url = COALESCE($3, u.avatar_url), updated_at = now() \
             WHERE u.id = $1 AND u.deleted_at IS NULL \
             RETURNING {USER_COLUMNS}"
        ))
        .bind(identity.user_id)
        .bind(identity.github_id)
        .bind(&identity.avatar_url)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| conflict_or_db(e, "github link"))?
        .ok_or_else(|| StoreError::NotFound(format!("user {}", identity.user_id)))?;

        sqlx::query("DELETE FROM github_users WHERE user_id = $1 AND github_id <> $2")
            .bind(identity.user_id)
            .bind(identity.github_id)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            "INSERT INTO github_users (user_id, github_id, login, name, email, avatar_url) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             ON CONFLICT (github_id) DO UPDATE SET \
                 user_id = EXCLUDED.user_id, login = EXCLUDED.login, name = EXCLUDED.name, \
                 email = EXCLUDED.email, avatar_url = EXCLUDED.avatar_url, updated_at = now()",
        )
        .bind(identity.user_id)
        .bind(identity.github_id)
        .bind(&identity.login)
        .bind(&identity.name)
        .bind(&identity.email)
        .bind(&identity.avatar_url)
        .execute(&mut *tx)
        .await
        .map_err(|e| conflict_or_db(e, "github link"))?;

        tx.commit().await?;
        into_user(row)
    }

    async fn find_linked_identity(&self, github_id: i64) -> StoreResult<Option<LinkedIdentity>> {
        let row = sqlx::query_as::<_, LinkedIdentityRow>(
            "SELECT user_id, github_id, login, name, email, avatar_url \
             FROM github_users WHERE github_id = $1",
        )
        .bind(github_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(LinkedIdentity::from))
    }

    async fn touch_user_activity(&self, user_id: i64, at: DateTime<Utc>) -> StoreResult<()> {
        sqlx::query("UPDATE users SET last_active_at = $2 WHERE id = $1")
            .bind(user_id)
            .bind(at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn insert_nonce(&self, nonce: &Nonce) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO nonces (nonce_id, nonce, used, expires_at, created_at) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(&nonce.nonce_id)
        .bind(&nonce.nonce)
        .bind(nonce.used)
        .bind(nonce.expires_at)
        .bind(nonce.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| conflict_or_db(e, "nonce"))?;
        Ok(())
    }

    async fn take_nonce(&self, nonce_id: &str) -> StoreResult<Option<Nonce>> {
        let row = sqlx::query_as::<_, (String, String, DateTime<Utc>, DateTime<Utc>)>(
            "UPDATE nonces SET used = TRUE \
             WHERE nonce_id = $1 AND used = FALSE \
             RETURNING nonce_id, nonce, expires_at, created_at",
        )
        .bind(nonce_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|(nonce_id, nonce, expires_at, created_at)| Nonce {
            nonce_id,
            nonce,
            used: false,
            expires_at,
            created_at,
        }))
    }

    async fn delete_expired_nonces(&self, now: DateTime<Utc>) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM nonces WHERE expires_at < $1")
            .bind(now)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn create_device(&self, device: &Device) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO devices \
                 (device_id, user_id, device_name, device_type, last_used_at, is_active, refresh_token_hash, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(&device.device_id)
        .bind(device.user_id)
        .bind(&device.device_name)
        .bind(device.device_type.as_str())
        .bind(device.last_used_at)
        .bind(device.is_active)
        .bind(&device.refresh_token_hash)
        .bind(device.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| conflict_or_db(e, "device"))?;
        Ok(())
    }

    async fn rotate_refresh_token(
        &self,
        old_hash: &str,
        new_hash: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<Device>> {
        let row = sqlx::query_as::<_, DeviceRow>(&format!(
            "UPDATE devices SET refresh_token_hash = $2, last_used_at = $3, updated_at = now() \
             WHERE refresh_token_hash = $1 AND is_active = TRUE \
             RETURNING {DEVICE_COLUMNS}"
        ))
        .bind(old_hash)
        .bind(new_hash)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Device::try_from).transpose()?)
    }

    async fn deactivate_device_by_refresh_hash(&self, refresh_hash: &str) -> StoreResult<()> {
        sqlx::query(
            "UPDATE devices SET is_active = FALSE, updated_at = now() WHERE refresh_token_hash = $1",
        )
        .bind(refresh_hash)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn deactivate_device(&self, user_id: i64, device_id: &str) -> StoreResult<bool> {
        let result = sqlx::query(
            "UPDATE devices SET is_active = FALSE, updated_at = now() \
             WHERE device_id = $1 AND user_id = $2",
        )
        .bind(device_id)
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn deactivate_all_devices(&self, user_id: i64) -> StoreResult<u64> {
        let result = sqlx::query(
            "UPDATE devices SET is_active = FALSE, updated_at = now() \
             WHERE user_id = $1 AND is_active = TRUE",
        )
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn list_active_devices(&self, user_id: i64) -> StoreResult<Vec<Device>> {
        let rows = sqlx::query_as::<_, DeviceRow>(&format!(
            "SELECT {DEVICE_COLUMNS} FROM devices \
             WHERE user_id = $1 AND is_active = TRUE \
             ORDER BY last_used_at DESC"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(Device::try_from)
            .collect::<Result<Vec<_>, _>>()?)
    }
}

// ---------------------------------------------------------------------------
// Chat store
// ---------------------------------------------------------------------------

#[async_trait]
impl ChatStore for PgStore {
    async fn list_rooms(&self) -> StoreResult<Vec<Room>> {
        let rows = sqlx::query_as::<_, RoomRow>(
            "SELECT id, name, created_at, updated_at FROM rooms \
             WHERE deleted_at IS NULL ORDER BY id ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Room::from).collect())
    }

    async fn create_room(&self, name: &str) -> StoreResult<Room> {
        let row = sqlx::query_as::<_, RoomRow>(
            "INSERT INTO rooms (name) VALUES ($1) RETURNING id, name, created_at, updated_at",
        )
        .bind(name)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.into())
    }

    async fn find_room(&self, room_id: i64) -> StoreResult<Option<Room>> {
        let row = sqlx::query_as::<_, RoomRow>(
            "SELECT id, name, created_at, updated_at FROM rooms \
             WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(room_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Room::from))
    }

    async fn create_message(
        &self,
        room_id: i64,
        user_id: i64,
        content: &str,
    ) -> StoreResult<Message> {
        let row = sqlx::query_as::<_, MessageRow>(&format!(
            "WITH m AS ( \
                 INSERT INTO messages (content, user_id, room_id) VALUES ($1, $2, $3) \
                 RETURNING id, content, user_id, room_id, created_at \
             ) \
             SELECT {MESSAGE_COLUMNS} FROM m JOIN users u ON u.id = m.user_id"
        ))
        .bind(content)
        .bind(user_id)
        .bind(room_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.into())
    }

    async fn list_messages(
        &self,
        room_id: i64,
        limit: u32,
        offset: u64,
    ) -> StoreResult<Vec<Message>> {
        let rows = sqlx::query_as::<_, MessageRow>(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages m JOIN users u ON u.id = m.user_id \
             WHERE m.room_id = $1 AND m.deleted_at IS NULL \
             ORDER BY m.created_at DESC, m.id DESC \
             LIMIT $2 OFFSET $3"
        ))
        .bind(room_id)
        .bind(i64::from(limit))
        .bind(i64::try_from(offset).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Message::from).collect())
    }

    async fn count_messages(&self, room_id: i64) -> StoreResult<i64> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM messages WHERE room_id = $1 AND deleted_at IS NULL",
        )
        .bind(room_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    async fn list_users(
        &self,
        exclude_user_id: i64,
        search: Option<&str>,
    ) -> StoreResult<Vec<User>> {
        let pattern = search.map(|s| format!("%{s}%"));
        let rows = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users u \
             WHERE u.id <> $1 AND u.deleted_at IS NULL \
               AND ($2::text IS NULL OR LOWER(u.username) LIKE $2 OR LOWER(u.email) LIKE $2) \
             ORDER BY u.username ASC"
        ))
        .bind(exclude_user_id)
        .bind(pattern)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(into_user).collect()
    }
}
