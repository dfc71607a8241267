//! GitHub OAuth device flow for headless clients.
//!
//! The poll is a synchronous long-poll bounded by a wall-clock deadline. GitHub
//! dictates the backoff: `slow_down` adds [`SLOW_DOWN_INCREMENT`] to the wait.

use std::time::Duration;

use tokio::time::{Instant, sleep_until, timeout_at};
use tracing::{debug, info};

use super::github::{DeviceAuthorization, GitHubClient, TokenEndpointResponse};
use super::reconcile::reconcile_identity;
use super::{AuthError, LoginResult};
use crate::store::CredentialStore;

pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);
pub const SLOW_DOWN_INCREMENT: Duration = Duration::from_secs(5);
/// Upper bound on one long-poll; GitHub device codes live 15 minutes.
pub const MAX_POLL_TIMEOUT: Duration = Duration::from_secs(900);

/// What a single token-endpoint response means for the poll loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceCodePoll {
    Pending,
    SlowDown,
    Authorized { access_token: String },
    AccessDenied,
    Expired,
}

/// Classify one token-endpoint response.
///
/// A response with neither token nor error is treated as pending.
pub fn classify(resp: &TokenEndpointResponse) -> Result<DeviceCodePoll, AuthError> {
    if let Some(token) = resp.access_token.as_deref()
        && !token.is_empty()
    {
        return Ok(DeviceCodePoll::Authorized {
            access_token: token.to_string(),
        });
    }
    match resp.error.as_deref().unwrap_or("") {
        "" | "authorization_pending" => Ok(DeviceCodePoll::Pending),
        "slow_down" => Ok(DeviceCodePoll::SlowDown),
        "expired_token" => Ok(DeviceCodePoll::Expired),
        "access_denied" => Ok(DeviceCodePoll::AccessDenied),
        other => Err(AuthError::UpstreamProtocol(format!("device flow error: {other}"))),
    }
}

/// Obtain a device code and user code from GitHub.
pub async fn start(github: &GitHubClient) -> Result<DeviceAuthorization, AuthError> {
    let auth = github.start_device_flow().await?;
    info!(
        verification_uri = %auth.verification_uri,
        expires_in = auth.expires_in,
        "device flow started"
    );
    Ok(auth)
}

/// Poll until the user authorizes `device_code`, then reconcile the account.
pub async fn poll(
    store: &dyn CredentialStore,
    github: &GitHubClient,
    device_code: &str,
    timeout: Duration,
    interval: Duration,
) -> Result<LoginResult, AuthError> {
    let access_token = wait_for_authorization(github, device_code, timeout, interval).await?;
    let identity = github.fetch_identity(&access_token).await?;
    let user = reconcile_identity(store, &identity).await?;
    info!(user_id = user.id, github_id = identity.external_id, "device flow login");
    Ok(LoginResult::user(user))
}

/// Poll the token endpoint until it yields a GitHub access token, a terminal
/// error, or `timeout` elapses.
///
/// `timeout` is capped at [`MAX_POLL_TIMEOUT`] and `interval` at `timeout`.
pub async fn wait_for_authorization(
    github: &GitHubClient,
    device_code: &str,
    timeout: Duration,
    interval: Duration,
) -> Result<String, AuthError> {
    poll_token_endpoint(github, device_code, timeout, interval, SLOW_DOWN_INCREMENT).await
}

async fn poll_token_endpoint(
    github: &GitHubClient,
    device_code: &str,
    timeout: Duration,
    interval: Duration,
    slow_down: Duration,
) -> Result<String, AuthError> {
    let timeout = timeout.min(MAX_POLL_TIMEOUT);
    let deadline = Instant::now() + timeout;
    let mut wait = interval.min(timeout);

    while Instant::now() < deadline {
        let resp = timeout_at(deadline, github.poll_device_token(device_code))
            .await
            .map_err(|_| device_timeout())??;

        match classify(&resp)? {
            DeviceCodePoll::Authorized { access_token } => return Ok(access_token),
            DeviceCodePoll::Pending => {}
            DeviceCodePoll::SlowDown => {
                wait = wait.saturating_add(slow_down).min(timeout);
                debug!(wait_secs = wait.as_secs(), "GitHub asked to slow down");
            }
            DeviceCodePoll::AccessDenied => return Err(AuthError::AccessDenied),
            DeviceCodePoll::Expired => return Err(AuthError::CodeExpired),
        }

        match Instant::now().checked_add(wait) {
            Some(next) if next < deadline => sleep_until(next).await,
            _ => {
                sleep_until(deadline).await;
                break;
            }
        }
    }

    Err(device_timeout())
}

fn device_timeout() -> AuthError {
    AuthError::Timeout("device authorization not completed in time".into())
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::auth::github::{DEFAULT_SCOPES, GitHubOAuthConfig};

    fn response(token: Option<&str>, error: Option<&str>) -> TokenEndpointResponse {
        TokenEndpointResponse {
            access_token: token.map(str::to_string),
            error: error.map(str::to_string),
            ..Default::default()
        }
    }

    fn client(server: &MockServer) -> GitHubClient {
        GitHubClient::new(Some(GitHubOAuthConfig {
            client_id: "cid".into(),
            client_secret: "csecret".into(),
            redirect_url: "http://localhost/cb".into(),
            scopes: DEFAULT_SCOPES.into(),
        }))
        .unwrap()
        .with_oauth_url(server.uri())
        .with_api_url(server.uri())
    }

    #[test]
    fn classify_covers_every_outcome() {
        assert_eq!(
            classify(&response(Some("gho_x"), None)).unwrap(),
            DeviceCodePoll::Authorized {
                access_token: "gho_x".into()
            }
        );
        assert_eq!(
            classify(&response(None, Some("authorization_pending"))).unwrap(),
            DeviceCodePoll::Pending
        );
        assert_eq!(classify(&response(None, None)).unwrap(), DeviceCodePoll::Pending);
        assert_eq!(
            classify(&response(None, Some("slow_down"))).unwrap(),
            DeviceCodePoll::SlowDown
        );
        assert_eq!(
            classify(&response(None, Some("expired_token"))).unwrap(),
            DeviceCodePoll::Expired
        );
        assert_eq!(
            classify(&response(None, Some("access_denied"))).unwrap(),
            DeviceCodePoll::AccessDenied
        );
        assert!(matches!(
            classify(&response(None, Some("unsupported_grant_type"))),
            Err(AuthError::UpstreamProtocol(_))
        ));
    }

    #[tokio::test]
    async fn pending_until_deadline_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/login/oauth/access_token"))
            .and(body_string_contains("device_code=dc-1"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"error": "authorization_pending"})),
            )
            .mount(&server)
            .await;

        let started = std::time::Instant::now();
        let err = wait_for_authorization(
            &client(&server),
            "dc-1",
            Duration::from_millis(300),
            Duration::from_millis(50),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AuthError::Timeout(_)));
        assert!(started.elapsed() >= Duration::from_millis(300));
    }

    #[tokio::test]
    async fn access_denied_is_terminal() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/login/oauth/access_token"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"error": "access_denied"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let err = wait_for_authorization(
            &client(&server),
            "dc-2",
            Duration::from_secs(5),
            Duration::from_millis(10),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AuthError::AccessDenied));
    }

    #[tokio::test]
    async fn slow_down_stretches_the_wait_before_the_next_poll() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/login/oauth/access_token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"error": "slow_down"})))
            .up_to_n_times(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/login/oauth/access_token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"access_token": "gho_slow"})))
            .expect(1)
            .mount(&server)
            .await;

        let started = std::time::Instant::now();
        let token = poll_token_endpoint(
            &client(&server),
            "dc-4",
            Duration::from_secs(5),
            Duration::from_millis(20),
            Duration::from_millis(300),
        )
        .await
        .unwrap();
        assert_eq!(token, "gho_slow");
        assert!(started.elapsed() >= Duration::from_millis(320));
    }

    #[tokio::test]
    async fn expired_code_is_terminal() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/login/oauth/access_token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"error": "expired_token"})))
            .expect(1)
            .mount(&server)
            .await;

        let err = wait_for_authorization(
            &client(&server),
            "dc-5",
            Duration::from_secs(5),
            Duration::from_millis(10),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AuthError::CodeExpired));
    }

    #[tokio::test]
    async fn oversized_durations_are_capped() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/login/oauth/access_token"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"error": "authorization_pending"})),
            )
            .mount(&server)
            .await;

        let err = poll_token_endpoint(
            &client(&server),
            "dc-6",
            Duration::from_millis(200),
            Duration::MAX,
            Duration::MAX,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AuthError::Timeout(_)));
    }

    #[tokio::test]
    async fn authorized_returns_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/login/oauth/access_token"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"access_token": "gho_ok", "token_type": "bearer"})),
            )
            .mount(&server)
            .await;

        let token = wait_for_authorization(
            &client(&server),
            "dc-3",
            Duration::from_secs(5),
            Duration::from_millis(10),
        )
        .await
        .unwrap();
        assert_eq!(token, "gho_ok");
    }
}
