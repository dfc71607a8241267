//! Local username/password accounts.

use tracing::{debug, info};

use super::password::{hash_password, verify_password};
use super::{AuthError, LoginResult};
use crate::models::auth::{AuthProvider, NewUser, Role};
use crate::store::{CredentialStore, StoreError};

pub const MIN_PASSWORD_LEN: usize = 6;

/// Registration input.
#[derive(Debug, Clone)]
pub struct Registration {
    pub username: String,
    pub email: String,
    pub password: String,
    pub role: Option<Role>,
}

impl Registration {
    pub fn validate(&self) -> Result<(), AuthError> {
        if self.username.trim().is_empty() {
            return Err(AuthError::Validation("username is required".into()));
        }
        if !self.email.contains('@') {
            return Err(AuthError::Validation("a valid email is required".into()));
        }
        if self.password.chars().count() < MIN_PASSWORD_LEN {
            return Err(AuthError::Validation(format!(
                "password must be at least {MIN_PASSWORD_LEN} characters"
            )));
        }
        Ok(())
    }
}

/// Create a local account. Role defaults to `user`.
pub async fn register(
    store: &dyn CredentialStore,
    input: Registration,
) -> Result<LoginResult, AuthError> {
    input.validate()?;
    let username = input.username.trim().to_string();

    if store.email_or_username_exists(&input.email, &username).await? {
        return Err(AuthError::Conflict);
    }

    let user = store
        .create_user(NewUser {
            username,
            email: input.email,
            password_hash: hash_password(&input.password)?,
            role: input.role.unwrap_or_default(),
            provider: AuthProvider::Local,
            github_id: None,
            avatar_url: None,
        })
        .await
        .map_err(|e| match e {
            StoreError::Conflict(_) => AuthError::Conflict,
            other => AuthError::Store(other),
        })?;

    info!(user_id = user.id, username = %user.username, "registered user");
    Ok(LoginResult::user(user))
}

/// Authenticate with email and password. Unknown email and wrong password
/// fail identically.
pub async fn login(
    store: &dyn CredentialStore,
    email: &str,
    password: &str,
) -> Result<LoginResult, AuthError> {
    let Some(found) = store.find_user_by_email(email).await? else {
        debug!("login for unknown email");
        return Err(AuthError::InvalidCredentials);
    };
    if !verify_password(password, &found.password_hash)? {
        debug!(user_id = found.user.id, "login with wrong password");
        return Err(AuthError::InvalidCredentials);
    }
    Ok(LoginResult::user(found.user))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;

    fn registration(username: &str, email: &str) -> Registration {
        Registration {
            username: username.into(),
            email: email.into(),
            password: "secret1".into(),
            role: None,
        }
    }

    #[tokio::test]
    async fn register_then_login() {
        let store = MemoryStore::new();
        let created = register(&store, registration("bob", "bob@x.com")).await.unwrap();
        assert_eq!(created.user.role, Role::User);

        let logged_in = login(&store, "bob@x.com", "secret1").await.unwrap();
        assert_eq!(logged_in.user.id, created.user.id);
    }

    #[tokio::test]
    async fn duplicate_username_or_email_conflicts() {
        let store = MemoryStore::new();
        register(&store, registration("bob", "bob@x.com")).await.unwrap();
        assert!(matches!(
            register(&store, registration("bob", "other@x.com")).await,
            Err(AuthError::Conflict)
        ));
        assert!(matches!(
            register(&store, registration("robert", "bob@x.com")).await,
            Err(AuthError::Conflict)
        ));
    }

    #[tokio::test]
    async fn bad_password_and_unknown_email_look_the_same() {
        let store = MemoryStore::new();
        register(&store, registration("bob", "bob@x.com")).await.unwrap();
        assert!(matches!(
            login(&store, "bob@x.com", "wrong").await,
            Err(AuthError::InvalidCredentials)
        ));
        assert!(matches!(
            login(&store, "nobody@x.com", "secret1").await,
            Err(AuthError::InvalidCredentials)
        ));
    }

    #[test]
    fn validation_rules() {
        let mut r = registration("bob", "bob@x.com");
        assert!(r.validate().is_ok());
        r.password = "12345".into();
        assert!(r.validate().is_err());
        let r = registration("bob", "not-an-email");
        assert!(matches!(r.validate(), Err(AuthError::Validation(_))));
        let r = registration("  ", "bob@x.com");
        assert!(r.validate().is_err());
    }
}
