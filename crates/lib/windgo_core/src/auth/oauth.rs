//! GitHub OAuth authorization-code flow.
//!
//! `begin` produces the state value and the redirect target. The caller keeps
//! the state in a short-lived cookie and hands it back to `complete`, which
//! compares it with the callback's `state` before any network call.

use tracing::{info, warn};

use super::github::GitHubClient;
use super::random::random_token;
use super::reconcile::reconcile_identity;
use super::{AuthError, LoginResult};
use crate::store::CredentialStore;

/// Bytes of entropy in the OAuth state value.
pub const OAUTH_STATE_BYTES: usize = 24;

/// Where to send the user agent, and the state to remember.
#[derive(Debug, Clone)]
pub struct AuthorizationRedirect {
    pub state: String,
    pub url: String,
}

pub fn begin(github: &GitHubClient) -> Result<AuthorizationRedirect, AuthError> {
    let state = random_token(OAUTH_STATE_BYTES);
    let url = github.authorize_url(&state)?;
    Ok(AuthorizationRedirect { state, url })
}

/// Callback query parameters.
#[derive(Debug, Clone, Default)]
pub struct Callback<'a> {
    pub state: Option<&'a str>,
    pub code: Option<&'a str>,
}

/// Finish the flow: check state, exchange the code, fetch the profile and
/// reconcile it.
pub async fn complete(
    store: &dyn CredentialStore,
    github: &GitHubClient,
    expected_state: Option<&str>,
    callback: Callback<'_>,
) -> Result<LoginResult, AuthError> {
    github.config()?;

    let state = callback
        .state
        .filter(|s| !s.is_empty())
        .ok_or(AuthError::StateMismatch)?;
    let code = callback
        .code
        .filter(|c| !c.is_empty())
        .ok_or(AuthError::MissingCode)?;

    match expected_state {
        Some(expected) if !expected.is_empty() && expected == state => {}
        _ => {
            warn!(has_cookie = expected_state.is_some(), "OAuth state mismatch");
            return Err(AuthError::StateMismatch);
        }
    }

    let access_token = github.exchange_code(code).await?;
    let identity = github.fetch_identity(&access_token).await?;
    let user = reconcile_identity(store, &identity).await?;
    info!(user_id = user.id, github_id = identity.external_id, "GitHub OAuth login");
    Ok(LoginResult::user(user))
}
