//! Map an external GitHub identity onto exactly one local user.
//!
//! Lookup order: linked external ID, then email, then create. A user created
//! here gets a probed username (`login`, `login1`, `login2`, ...) and an
//! unusable placeholder password.

use tracing::{debug, info};

use super::AuthError;
use super::password::placeholder_password_hash;
use crate::models::auth::{AuthProvider, ExternalIdentity, LinkedIdentity, NewUser, Role, User};
use crate::store::{CredentialStore, StoreError};

/// Highest numeric suffix tried when the base username is taken.
pub const MAX_USERNAME_SUFFIX: u32 = 10;

/// Resolve (or create) the local user for `identity` and refresh its link.
pub async fn reconcile_identity(
    store: &dyn CredentialStore,
    identity: &ExternalIdentity,
) -> Result<User, AuthError> {
    if let Some(user) = link_existing(store, identity).await? {
        return Ok(user);
    }

    match create_linked_user(store, identity).await {
        Ok(user) => Ok(user),
        // A concurrent login for the same account may have won the insert.
        Err(AuthError::Store(StoreError::Conflict(_))) => link_existing(store, identity)
            .await?
            .ok_or(AuthError::Conflict),
        Err(e) => Err(e),
    }
}

async fn link_existing(
    store: &dyn CredentialStore,
    identity: &ExternalIdentity,
) -> Result<Option<User>, AuthError> {
    if let Some(user) = store.find_user_by_github_id(identity.external_id).await? {
        debug!(user_id = user.id, github_id = identity.external_id, "matched linked identity");
        let linked = LinkedIdentity::from_external(user.id, identity);
        return Ok(Some(store.link_github_identity(&linked).await?));
    }

    if !identity.email.is_empty()
        && let Some(found) = store.find_user_by_email(&identity.email).await?
    {
        info!(
            user_id = found.user.id,
            github_id = identity.external_id,
            "linking GitHub account to existing user by email"
        );
        let linked = LinkedIdentity::from_external(found.user.id, identity);
        return Ok(Some(store.link_github_identity(&linked).await?));
    }

    Ok(None)
}

async fn create_linked_user(
    store: &dyn CredentialStore,
    identity: &ExternalIdentity,
) -> Result<User, AuthError> {
    let base = base_username(identity);
    let username = free_username(store, &base).await?;
    let user = store
        .create_user(NewUser {
            username,
            email: identity.email.clone(),
            password_hash: placeholder_password_hash()?,
            role: Role::User,
            provider: AuthProvider::Github,
            github_id: Some(identity.external_id),
            avatar_url: identity.avatar_url.clone(),
        })
        .await?;
    info!(user_id = user.id, username = %user.username, "created user from GitHub identity");

    let linked = LinkedIdentity::from_external(user.id, identity);
    Ok(store.link_github_identity(&linked).await?)
}

/// The login name, or the local part of the email when the login is empty.
fn base_username(identity: &ExternalIdentity) -> String {
    if !identity.login.is_empty() {
        return identity.login.clone();
    }
    identity
        .email
        .split('@')
        .next()
        .unwrap_or_default()
        .to_string()
}

async fn free_username(store: &dyn CredentialStore, base: &str) -> Result<String, AuthError> {
    if base.is_empty() {
        return Err(AuthError::Validation(
            "external identity has neither login nor email".into(),
        ));
    }
    if !store.username_exists(base).await? {
        return Ok(base.to_string());
    }
    for n in 1..=MAX_USERNAME_SUFFIX {
        let candidate = format!("{base}{n}");
        if !store.username_exists(&candidate).await? {
            return Ok(candidate);
        }
    }
    Err(AuthError::UsernameExhausted(base.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::ChatStore;
    use crate::store::memory::MemoryStore;

    fn identity(id: i64, login: &str, email: &str) -> ExternalIdentity {
        ExternalIdentity {
            external_id: id,
            login: login.into(),
            name: None,
            email: email.into(),
            avatar_url: Some(format!("https://avatars.example/{id}")),
        }
    }

    async fn local_user(store: &MemoryStore, username: &str, email: &str) -> User {
        store
            .create_user(NewUser {
                username: username.into(),
                email: email.into(),
                password_hash: "x".into(),
                role: Role::User,
                provider: AuthProvider::Local,
                github_id: None,
                avatar_url: None,
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn same_external_id_resolves_to_same_user() {
        let store = MemoryStore::new();
        let first = reconcile_identity(&store, &identity(1, "octo", "octo@x.com")).await.unwrap();
        let second = reconcile_identity(&store, &identity(1, "octo-renamed", "new@x.com"))
            .await
            .unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(store.list_users(0, None).await.unwrap().len(), 1);
        let link = store.find_linked_identity(1).await.unwrap().unwrap();
        assert_eq!(link.login, "octo-renamed");
    }

    #[tokio::test]
    async fn email_match_links_existing_local_user() {
        let store = MemoryStore::new();
        let local = local_user(&store, "dave", "dave@x.com").await;
        let user = reconcile_identity(&store, &identity(5, "dgh", "dave@x.com")).await.unwrap();
        assert_eq!(user.id, local.id);
        assert_eq!(user.github_id, Some(5));
        assert_eq!(user.provider, AuthProvider::Github);
    }

    #[tokio::test]
    async fn username_collision_gets_suffix() {
        let store = MemoryStore::new();
        local_user(&store, "alice", "alice@local").await;
        let user = reconcile_identity(&store, &identity(9, "alice", "alice@gh.com")).await.unwrap();
        assert_eq!(user.username, "alice1");
    }

    #[tokio::test]
    async fn email_local_part_when_login_empty() {
        let store = MemoryStore::new();
        let user = reconcile_identity(&store, &identity(3, "", "erin@x.com")).await.unwrap();
        assert_eq!(user.username, "erin");
    }

    #[tokio::test]
    async fn exhausted_suffixes_fail() {
        let store = MemoryStore::new();
        local_user(&store, "bob", "bob0@x").await;
        for n in 1..=MAX_USERNAME_SUFFIX {
            local_user(&store, &format!("bob{n}"), &format!("bob{n}@x")).await;
        }
        let err = reconcile_identity(&store, &identity(2, "bob", "bob@gh.com")).await.unwrap_err();
        assert!(matches!(err, AuthError::UsernameExhausted(base) if base == "bob"));
    }
}
