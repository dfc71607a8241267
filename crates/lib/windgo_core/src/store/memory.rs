//! In-memory store for tests and `--in-memory` dev runs.
//!
//! All tables live behind a single mutex, so every trait method is atomic
//! with respect to every other.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{ChatStore, CredentialStore, StoreError, StoreResult};
use crate::models::auth::{
    AuthProvider, Device, LinkedIdentity, NewUser, Nonce, User, UserWithPassword,
};
use crate::models::chat::{Message, Room};

#[derive(Default)]
struct Tables {
    next_user_id: i64,
    users: Vec<UserWithPassword>,
    github_users: HashMap<i64, LinkedIdentity>,
    nonces: HashMap<String, Nonce>,
    devices: Vec<Device>,
    next_room_id: i64,
    rooms: Vec<Room>,
    next_message_id: i64,
    messages: Vec<Message>,
}

impl Tables {
    fn live_user(&self, user_id: i64) -> Option<&UserWithPassword> {
        self.users
            .iter()
            .find(|u| u.user.id == user_id && u.user.deleted_at.is_none())
    }
}

/// Process-local store; state is lost on drop.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store pre-seeded with the `general` and `random` rooms, like the
    /// initial migration.
    pub fn seeded() -> Self {
        let store = Self::new();
        {
            let mut t = store.lock();
            let now = Utc::now();
            for name in ["general", "random"] {
                t.next_room_id += 1;
                let id = t.next_room_id;
                t.rooms.push(Room {
                    id,
                    name: name.to_string(),
                    created_at: now,
                    updated_at: now,
                });
            }
        }
        store
    }

    fn lock(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn find_user_by_id(&self, user_id: i64) -> StoreResult<Option<User>> {
        Ok(self.lock().live_user(user_id).map(|u| u.user.clone()))
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<UserWithPassword>> {
        Ok(self
            .lock()
            .users
            .iter()
            .find(|u| u.user.email == email && u.user.deleted_at.is_none())
            .cloned())
    }

    async fn email_or_username_exists(&self, email: &str, username: &str) -> StoreResult<bool> {
        Ok(self
            .lock()
            .users
            .iter()
            .any(|u| u.user.email == email || u.user.username == username))
    }

    async fn username_exists(&self, username: &str) -> StoreResult<bool> {
        Ok(self.lock().users.iter().any(|u| u.user.username == username))
    }

    async fn create_user(&self, new_user: NewUser) -> StoreResult<User> {
        let mut t = self.lock();
        let clash = t.users.iter().any(|u| {
            u.user.username == new_user.username
                || u.user.email == new_user.email
                || (new_user.github_id.is_some() && u.user.github_id == new_user.github_id)
        });
        if clash {
            return Err(StoreError::Conflict("user already exists".into()));
        }
        t.next_user_id += 1;
        let now = Utc::now();
        let user = User {
            id: t.next_user_id,
            username: new_user.username,
            email: new_user.email,
            role: new_user.role,
            provider: new_user.provider,
            github_id: new_user.github_id,
            avatar_url: new_user.avatar_url,
            last_active_at: None,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        t.users.push(UserWithPassword {
            user: user.clone(),
            password_hash: new_user.password_hash,
        });
        Ok(user)
    }

    async fn find_user_by_github_id(&self, github_id: i64) -> StoreResult<Option<User>> {
        let t = self.lock();
        let linked_user = t.github_users.get(&github_id).map(|l| l.user_id);
        Ok(t
            .users
            .iter()
            .find(|u| {
                u.user.deleted_at.is_none()
                    && (Some(u.user.id) == linked_user || u.user.github_id == Some(github_id))
            })
            .map(|u| u.user.clone()))
    }

    async fn link_github_identity(&self, identity: &LinkedIdentity) -> StoreResult<User> {
        let mut t = self.lock();
        let taken = t.users.iter().any(|u| {
            u.user.id != identity.user_id && u.user.github_id == Some(identity.github_id)
        });
        if taken {
            return Err(StoreError::Conflict("github link already exists".into()));
        }
        let user = {
            let entry = t
                .users
                .iter_mut()
                .find(|u| u.user.id == identity.user_id && u.user.deleted_at.is_none())
                .ok_or_else(|| StoreError::NotFound(format!("user {}", identity.user_id)))?;
            entry.user.github_id = Some(identity.github_id);
            entry.user.provider = AuthProvider::Github;
            if identity.avatar_url.is_some() {
                entry.user.avatar_url = identity.avatar_url.clone();
            }
            entry.user.updated_at = Utc::now();
            entry.user.clone()
        };
        t.github_users
            .retain(|gid, l| l.user_id != identity.user_id || *gid == identity.github_id);
        t.github_users.insert(identity.github_id, identity.clone());
        Ok(user)
    }

    async fn find_linked_identity(&self, github_id: i64) -> StoreResult<Option<LinkedIdentity>> {
        Ok(self.lock().github_users.get(&github_id).cloned())
    }

    async fn touch_user_activity(&self, user_id: i64, at: DateTime<Utc>) -> StoreResult<()> {
        if let Some(u) = self.lock().users.iter_mut().find(|u| u.user.id == user_id) {
            u.user.last_active_at = Some(at);
        }
        Ok(())
    }

    async fn insert_nonce(&self, nonce: &Nonce) -> StoreResult<()> {
        let mut t = self.lock();
        if t.nonces.contains_key(&nonce.nonce_id) {
            return Err(StoreError::Conflict("nonce already exists".into()));
        }
        t.nonces.insert(nonce.nonce_id.clone(), nonce.clone());
        Ok(())
    }

    async fn take_nonce(&self, nonce_id: &str) -> StoreResult<Option<Nonce>> {
        let mut t = self.lock();
        match t.nonces.get_mut(nonce_id) {
            Some(n) if !n.used => {
                let before = n.clone();
                n.used = true;
                Ok(Some(before))
            }
            _ => Ok(None),
        }
    }

    async fn delete_expired_nonces(&self, now: DateTime<Utc>) -> StoreResult<u64> {
        let mut t = self.lock();
        let before = t.nonces.len();
        t.nonces.retain(|_, n| n.expires_at >= now);
        Ok((before - t.nonces.len()) as u64)
    }

    async fn create_device(&self, device: &Device) -> StoreResult<()> {
        let mut t = self.lock();
        let clash = t.devices.iter().any(|d| {
            d.device_id == device.device_id || d.refresh_token_hash == device.refresh_token_hash
        });
        if clash {
            return Err(StoreError::Conflict("device already exists".into()));
        }
        t.devices.push(device.clone());
        Ok(())
    }

    async fn rotate_refresh_token(
        &self,
        old_hash: &str,
        new_hash: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<Device>> {
        let mut t = self.lock();
        let Some(device) = t
            .devices
            .iter_mut()
            .find(|d| d.is_active && d.refresh_token_hash == old_hash)
        else {
            return Ok(None);
        };
        device.refresh_token_hash = new_hash.to_string();
        device.last_used_at = now;
        Ok(Some(device.clone()))
    }

    async fn deactivate_device_by_refresh_hash(&self, refresh_hash: &str) -> StoreResult<()> {
        let mut t = self.lock();
        for d in t
            .devices
            .iter_mut()
            .filter(|d| d.refresh_token_hash == refresh_hash)
        {
            d.is_active = false;
        }
        Ok(())
    }

    async fn deactivate_device(&self, user_id: i64, device_id: &str) -> StoreResult<bool> {
        let mut t = self.lock();
        match t
            .devices
            .iter_mut()
            .find(|d| d.device_id == device_id && d.user_id == user_id)
        {
            Some(d) => {
                d.is_active = false;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn deactivate_all_devices(&self, user_id: i64) -> StoreResult<u64> {
        let mut t = self.lock();
        let mut changed = 0;
        for d in t
            .devices
            .iter_mut()
            .filter(|d| d.user_id == user_id && d.is_active)
        {
            d.is_active = false;
            changed += 1;
        }
        Ok(changed)
    }

    async fn list_active_devices(&self, user_id: i64) -> StoreResult<Vec<Device>> {
        let mut devices: Vec<Device> = self
            .lock()
            .devices
            .iter()
            .filter(|d| d.user_id == user_id && d.is_active)
            .cloned()
            .collect();
        devices.sort_by(|a, b| b.last_used_at.cmp(&a.last_used_at));
        Ok(devices)
    }
}

#[async_trait]
impl ChatStore for MemoryStore {
    async fn list_rooms(&self) -> StoreResult<Vec<Room>> {
        Ok(self.lock().rooms.clone())
    }

    async fn create_room(&self, name: &str) -> StoreResult<Room> {
        let mut t = self.lock();
        t.next_room_id += 1;
        let now = Utc::now();
        let room = Room {
            id: t.next_room_id,
            name: name.to_string(),
            created_at: now,
            updated_at: now,
        };
        t.rooms.push(room.clone());
        Ok(room)
    }

    async fn find_room(&self, room_id: i64) -> StoreResult<Option<Room>> {
        Ok(self.lock().rooms.iter().find(|r| r.id == room_id).cloned())
    }

    async fn create_message(
        &self,
        room_id: i64,
        user_id: i64,
        content: &str,
    ) -> StoreResult<Message> {
        let mut t = self.lock();
        if !t.rooms.iter().any(|r| r.id == room_id) {
            return Err(StoreError::NotFound(format!("room {room_id}")));
        }
        let username = t
            .live_user(user_id)
            .map(|u| u.user.username.clone())
            .ok_or_else(|| StoreError::NotFound(format!("user {user_id}")))?;
        t.next_message_id += 1;
        let message = Message {
            id: t.next_message_id,
            content: content.to_string(),
            user_id,
            username,
            room_id,
            created_at: Utc::now(),
        };
        t.messages.push(message.clone());
        Ok(message)
    }

    async fn list_messages(
        &self,
        room_id: i64,
        limit: u32,
        offset: u64,
    ) -> StoreResult<Vec<Message>> {
        let t = self.lock();
        Ok(t.messages
            .iter()
            .rev()
            .filter(|m| m.room_id == room_id)
            .skip(usize::try_from(offset).unwrap_or(usize::MAX))
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn count_messages(&self, room_id: i64) -> StoreResult<i64> {
        Ok(self
            .lock()
            .messages
            .iter()
            .filter(|m| m.room_id == room_id)
            .count() as i64)
    }

    async fn list_users(
        &self,
        exclude_user_id: i64,
        search: Option<&str>,
    ) -> StoreResult<Vec<User>> {
        let t = self.lock();
        let mut users: Vec<User> = t
            .users
            .iter()
            .map(|u| &u.user)
            .filter(|u| u.id != exclude_user_id && u.deleted_at.is_none())
            .filter(|u| match search {
                Some(s) => {
                    u.username.to_lowercase().contains(s) || u.email.to_lowercase().contains(s)
                }
                None => true,
            })
            .cloned()
            .collect();
        users.sort_by(|a, b| a.username.cmp(&b.username));
        Ok(users)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Duration;

    use super::*;
    use crate::models::auth::{DeviceType, Role};

    fn new_user(username: &str, email: &str) -> NewUser {
        NewUser {
            username: username.into(),
            email: email.into(),
            password_hash: "hash".into(),
            role: Role::User,
            provider: AuthProvider::Local,
            github_id: None,
            avatar_url: None,
        }
    }

    fn nonce(id: &str, expires_at: DateTime<Utc>) -> Nonce {
        Nonce {
            nonce_id: id.into(),
            nonce: format!("value-{id}"),
            used: false,
            expires_at,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn duplicate_email_is_a_conflict() {
        let store = MemoryStore::new();
        store.create_user(new_user("a", "a@x.com")).await.unwrap();
        let err = store.create_user(new_user("b", "a@x.com")).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn take_nonce_succeeds_once() {
        let store = MemoryStore::new();
        let n = nonce("n1", Utc::now() + Duration::seconds(60));
        store.insert_nonce(&n).await.unwrap();

        let first = store.take_nonce("n1").await.unwrap().unwrap();
        assert!(!first.used);
        assert!(store.take_nonce("n1").await.unwrap().is_none());
        assert!(store.take_nonce("missing").await.unwrap().is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn concurrent_nonce_takes_have_one_winner() {
        let store = Arc::new(MemoryStore::new());
        store
            .insert_nonce(&nonce("race", Utc::now() + Duration::seconds(60)))
            .await
            .unwrap();

        let (a, b) = tokio::join!(
            tokio::spawn({
                let store = store.clone();
                async move { store.take_nonce("race").await }
            }),
            tokio::spawn({
                let store = store.clone();
                async move { store.take_nonce("race").await }
            }),
        );
        let winners = [a.unwrap().unwrap(), b.unwrap().unwrap()]
            .into_iter()
            .filter(Option::is_some)
            .count();
        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn sweep_removes_only_expired_nonces() {
        let store = MemoryStore::new();
        let now = Utc::now();
        store.insert_nonce(&nonce("old", now - Duration::seconds(1))).await.unwrap();
        store.insert_nonce(&nonce("fresh", now + Duration::seconds(30))).await.unwrap();

        assert_eq!(store.delete_expired_nonces(now).await.unwrap(), 1);
        assert!(store.take_nonce("fresh").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn rotation_requires_active_device_and_current_hash() {
        let store = MemoryStore::new();
        let user = store.create_user(new_user("a", "a@x.com")).await.unwrap();
        let now = Utc::now();
        store
            .create_device(&Device {
                device_id: "dev_1".into(),
                user_id: user.id,
                device_name: "laptop".into(),
                device_type: DeviceType::Cli,
                last_used_at: now,
                is_active: true,
                refresh_token_hash: "h1".into(),
                created_at: now,
            })
            .await
            .unwrap();

        assert!(store.rotate_refresh_token("h1", "h2", now).await.unwrap().is_some());
        assert!(store.rotate_refresh_token("h1", "h3", now).await.unwrap().is_none());

        assert!(store.deactivate_device(user.id, "dev_1").await.unwrap());
        assert!(store.rotate_refresh_token("h2", "h4", now).await.unwrap().is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn concurrent_rotations_have_one_winner() {
        let store = Arc::new(MemoryStore::new());
        let user = store.create_user(new_user("a", "a@x.com")).await.unwrap();
        let now = Utc::now();
        store
            .create_device(&Device {
                device_id: "dev_1".into(),
                user_id: user.id,
                device_name: "laptop".into(),
                device_type: DeviceType::Cli,
                last_used_at: now,
                is_active: true,
                refresh_token_hash: "h1".into(),
                created_at: now,
            })
            .await
            .unwrap();

        let (a, b) = tokio::join!(
            tokio::spawn({
                let store = store.clone();
                async move { store.rotate_refresh_token("h1", "h2a", now).await }
            }),
            tokio::spawn({
                let store = store.clone();
                async move { store.rotate_refresh_token("h1", "h2b", now).await }
            }),
        );
        let winners = [a.unwrap().unwrap(), b.unwrap().unwrap()]
            .into_iter()
            .filter(Option::is_some)
            .count();
        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn messages_are_listed_newest_first() {
        let store = MemoryStore::seeded();
        let user = store.create_user(new_user("a", "a@x.com")).await.unwrap();
        for i in 0..3 {
            store.create_message(1, user.id, &format!("m{i}")).await.unwrap();
        }
        let page = store.list_messages(1, 2, 0).await.unwrap();
        assert_eq!(
            page.iter().map(|m| m.content.as_str()).collect::<Vec<_>>(),
            ["m2", "m1"]
        );
        assert_eq!(store.count_messages(1).await.unwrap(), 3);
    }
}
