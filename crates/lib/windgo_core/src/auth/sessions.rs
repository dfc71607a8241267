//! Device sessions: registration, refresh token rotation, revocation and the
//! nonce sweep.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use super::random::{hash_refresh_token, new_device_id, new_refresh_token};
use super::{AuthError, DeviceGrant, LoginResult};
use crate::clock::Clock;
use crate::models::auth::{Device, DeviceType};
use crate::store::CredentialStore;

/// Refresh token lifetime (cookie max-age): 7 days.
pub const REFRESH_TOKEN_TTL_SECS: i64 = 7 * 24 * 60 * 60;

/// How often the server sweeps expired nonces.
pub const NONCE_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Register a new active device for `user_id` with a fresh refresh token.
pub async fn register_device(
    store: &dyn CredentialStore,
    user_id: i64,
    device_name: &str,
    device_type: DeviceType,
    now: DateTime<Utc>,
) -> Result<DeviceGrant, AuthError> {
    let refresh_token = new_refresh_token();
    let device = Device {
        device_id: new_device_id(),
        user_id,
        device_name: device_name.to_string(),
        device_type,
        last_used_at: now,
        is_active: true,
        refresh_token_hash: hash_refresh_token(&refresh_token),
        created_at: now,
    };
    store.create_device(&device).await?;
    info!(user_id, device_id = %device.device_id, device_type = device_type.as_str(), "registered device");
    Ok(DeviceGrant {
        device,
        refresh_token,
    })
}

/// Redeem a refresh token: rotate it and return the device's user with the
/// new token. The presented token is invalid from then on.
pub async fn refresh(
    store: &dyn CredentialStore,
    refresh_token: &str,
    now: DateTime<Utc>,
) -> Result<LoginResult, AuthError> {
    let new_token = new_refresh_token();
    let device = store
        .rotate_refresh_token(
            &hash_refresh_token(refresh_token),
            &hash_refresh_token(&new_token),
            now,
        )
        .await?
        .ok_or(AuthError::InvalidRefreshToken)?;

    let Some(user) = store.find_user_by_id(device.user_id).await? else {
        warn!(device_id = %device.device_id, "refresh for device of a missing user");
        return Err(AuthError::InvalidRefreshToken);
    };
    debug!(user_id = user.id, device_id = %device.device_id, "rotated refresh token");
    Ok(LoginResult::with_device(
        user,
        DeviceGrant {
            device,
            refresh_token: new_token,
        },
    ))
}

/// Deactivate the device holding `refresh_token`. Idempotent.
pub async fn logout(store: &dyn CredentialStore, refresh_token: &str) -> Result<(), AuthError> {
    store
        .deactivate_device_by_refresh_hash(&hash_refresh_token(refresh_token))
        .await?;
    Ok(())
}

/// Deactivate a device of `user_id`.
pub async fn revoke_device(
    store: &dyn CredentialStore,
    user_id: i64,
    device_id: &str,
) -> Result<(), AuthError> {
    if !store.deactivate_device(user_id, device_id).await? {
        return Err(AuthError::NotFound(format!("device {device_id}")));
    }
    info!(user_id, device_id, "revoked device");
    Ok(())
}

/// Deactivate every device of `user_id`; returns how many were active.
pub async fn revoke_all_devices(store: &dyn CredentialStore, user_id: i64) -> Result<u64, AuthError> {
    let revoked = store.deactivate_all_devices(user_id).await?;
    info!(user_id, revoked, "revoked all devices");
    Ok(revoked)
}

/// Delete nonces that expired before `now`, used or not.
pub async fn cleanup_expired_nonces(
    store: &dyn CredentialStore,
    now: DateTime<Utc>,
) -> Result<u64, AuthError> {
    let deleted = store.delete_expired_nonces(now).await?;
    if deleted > 0 {
        debug!(deleted, "swept expired nonces");
    }
    Ok(deleted)
}

/// Run [`cleanup_expired_nonces`] every `every` on a detached task.
pub fn spawn_nonce_sweeper(
    store: Arc<dyn CredentialStore>,
    clock: Arc<dyn Clock>,
    every: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        loop {
            interval.tick().await;
            if let Err(e) = cleanup_expired_nonces(store.as_ref(), clock.now()).await {
                warn!(error = %e, "nonce sweep failed");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use chrono::Duration as ChronoDuration;

    use super::*;
    use crate::clock::ManualClock;
    use crate::models::auth::{AuthProvider, NewUser, Nonce, Role};
    use crate::store::memory::MemoryStore;

    async fn user(store: &MemoryStore) -> i64 {
        store
            .create_user(NewUser {
                username: "frank".into(),
                email: "frank@x.com".into(),
                password_hash: "x".into(),
                role: Role::User,
                provider: AuthProvider::Local,
                github_id: None,
                avatar_url: None,
            })
            .await
            .unwrap()
            .id
    }

    #[tokio::test]
    async fn refresh_rotates_single_use() {
        let store = MemoryStore::new();
        let uid = user(&store).await;
        let now = Utc::now();
        let grant = register_device(&store, uid, "laptop", DeviceType::Cli, now).await.unwrap();

        let rotated = refresh(&store, &grant.refresh_token, now).await.unwrap();
        let new_grant = rotated.device.unwrap();
        assert_eq!(new_grant.device.device_id, grant.device.device_id);
        assert_ne!(new_grant.refresh_token, grant.refresh_token);

        let err = refresh(&store, &grant.refresh_token, now).await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidRefreshToken));
        assert!(refresh(&store, &new_grant.refresh_token, now).await.is_ok());
    }

    #[tokio::test]
    async fn logout_is_idempotent_and_final() {
        let store = MemoryStore::new();
        let uid = user(&store).await;
        let grant = register_device(&store, uid, "web", DeviceType::Web, Utc::now()).await.unwrap();

        logout(&store, &grant.refresh_token).await.unwrap();
        logout(&store, &grant.refresh_token).await.unwrap();
        logout(&store, "never-issued").await.unwrap();
        assert!(refresh(&store, &grant.refresh_token, Utc::now()).await.is_err());
    }

    #[tokio::test]
    async fn revoke_requires_ownership() {
        let store = MemoryStore::new();
        let uid = user(&store).await;
        let grant = register_device(&store, uid, "phone", DeviceType::Mobile, Utc::now()).await.unwrap();

        let err = revoke_device(&store, uid + 1, &grant.device.device_id).await.unwrap_err();
        assert!(matches!(err, AuthError::NotFound(_)));
        revoke_device(&store, uid, &grant.device.device_id).await.unwrap();
        assert!(matches!(
            refresh(&store, &grant.refresh_token, Utc::now()).await,
            Err(AuthError::InvalidRefreshToken)
        ));
    }

    #[tokio::test]
    async fn revoke_all_counts_active_devices() {
        let store = MemoryStore::new();
        let uid = user(&store).await;
        let now = Utc::now();
        register_device(&store, uid, "a", DeviceType::Cli, now).await.unwrap();
        register_device(&store, uid, "b", DeviceType::Web, now).await.unwrap();
        assert_eq!(revoke_all_devices(&store, uid).await.unwrap(), 2);
        assert_eq!(revoke_all_devices(&store, uid).await.unwrap(), 0);
        assert!(store.list_active_devices(uid).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn sweeper_task_deletes_expired_nonces() {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::default());
        let now = clock.now();
        store
            .insert_nonce(&Nonce {
                nonce_id: "old".into(),
                nonce: "n".into(),
                used: true,
                expires_at: now - ChronoDuration::seconds(5),
                created_at: now - ChronoDuration::seconds(65),
            })
            .await
            .unwrap();

        let handle = spawn_nonce_sweeper(store.clone(), clock, Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.abort();
        assert_eq!(store.delete_expired_nonces(now).await.unwrap(), 0);
    }
}
