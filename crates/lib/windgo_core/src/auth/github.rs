//! GitHub as external identity provider.
//!
//! Covers the OAuth endpoints (authorize, code exchange, device code, device
//! token) on `github.com` and the REST endpoints (profile, emails, public
//! user, public SSH keys) on `api.github.com`. Both bases are overridable so
//! tests can point the client at a mock server.

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::AuthError;
use crate::models::auth::ExternalIdentity;

pub const DEFAULT_OAUTH_URL: &str = "https://github.com";
pub const DEFAULT_API_URL: &str = "https://api.github.com";
pub const DEFAULT_SCOPES: &str = "read:user user:email";

/// Upper bound for any single call to GitHub.
pub const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

const USER_AGENT: &str = concat!("windgo/", env!("CARGO_PKG_VERSION"));
const DEVICE_GRANT_TYPE: &str = "urn:ietf:params:oauth:grant-type:device_code";

// =============================================================================
// Configuration
// =============================================================================

/// OAuth application credentials.
#[derive(Debug, Clone)]
pub struct GitHubOAuthConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_url: String,
    pub scopes: String,
}

impl GitHubOAuthConfig {
    /// Read `GITHUB_CLIENT_ID`, `GITHUB_CLIENT_SECRET` and
    /// `GITHUB_REDIRECT_URL`. Returns `None` unless all three are set.
    pub fn from_env() -> Option<Self> {
        let var = |name: &str| std::env::var(name).ok().filter(|v| !v.trim().is_empty());
        Some(Self {
            client_id: var("GITHUB_CLIENT_ID")?,
            client_secret: var("GITHUB_CLIENT_SECRET")?,
            redirect_url: var("GITHUB_REDIRECT_URL")?,
            scopes: DEFAULT_SCOPES.to_string(),
        })
    }
}

// =============================================================================
// Wire types
// =============================================================================

/// Device authorization descriptor, passed through to the caller unmodified.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceAuthorization {
    #[serde(default)]
    pub device_code: String,
    #[serde(default)]
    pub user_code: String,
    #[serde(default)]
    pub verification_uri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verification_uri_complete: Option<String>,
    #[serde(default)]
    pub expires_in: u64,
    #[serde(default)]
    pub interval: u64,
}

/// Body of GitHub's token endpoint, shared by the code and device grants.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TokenEndpointResponse {
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub error_description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GitHubProfile {
    id: i64,
    #[serde(default)]
    login: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    avatar_url: Option<String>,
}

/// One entry of `GET /user/emails`.
#[derive(Debug, Clone, Deserialize)]
pub struct GitHubEmail {
    pub email: String,
    #[serde(default)]
    pub primary: bool,
    #[serde(default)]
    pub verified: bool,
}

#[derive(Debug, Deserialize)]
struct GitHubKey {
    key: String,
}

/// Pick the address to identify an account by: primary and verified, else
/// any verified, else the first listed.
pub fn resolve_email(emails: &[GitHubEmail]) -> Option<String> {
    emails
        .iter()
        .find(|e| e.primary && e.verified)
        .or_else(|| emails.iter().find(|e| e.verified))
        .or_else(|| emails.first())
        .map(|e| e.email.clone())
        .filter(|e| !e.is_empty())
}

/// Whether `login` has the shape of a GitHub username: 1 to 39 ASCII
/// alphanumerics or hyphens, not starting with a hyphen.
pub fn is_valid_login(login: &str) -> bool {
    (1..=39).contains(&login.len())
        && !login.starts_with('-')
        && login.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-')
}

/// Stand-in address for accounts without a public email.
pub fn noreply_email(id: i64, login: &str) -> String {
    format!("{id}+{login}@users.noreply.github.com")
}

// =============================================================================
// Client
// =============================================================================

/// HTTP client for GitHub.
#[derive(Debug, Clone)]
pub struct GitHubClient {
    http: reqwest::Client,
    oauth: Option<GitHubOAuthConfig>,
    oauth_url: String,
    api_url: String,
}

impl GitHubClient {
    pub fn new(oauth: Option<GitHubOAuthConfig>) -> Result<Self, AuthError> {
        let http = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| AuthError::Internal(format!("http client: {e}")))?;
        Ok(Self {
            http,
            oauth,
            oauth_url: DEFAULT_OAUTH_URL.to_string(),
            api_url: DEFAULT_API_URL.to_string(),
        })
    }

    pub fn with_oauth_url(mut self, url: impl Into<String>) -> Self {
        self.oauth_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_api_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn is_configured(&self) -> bool {
        self.oauth.is_some()
    }

    pub fn config(&self) -> Result<&GitHubOAuthConfig, AuthError> {
        self.oauth.as_ref().ok_or(AuthError::NotConfigured)
    }

    /// Authorization page URL carrying `state`.
    pub fn authorize_url(&self, state: &str) -> Result<String, AuthError> {
        let cfg = self.config()?;
        let url = url::Url::parse_with_params(
            &format!("{}/login/oauth/authorize", self.oauth_url),
            &[
                ("client_id", cfg.client_id.as_str()),
                ("redirect_uri", cfg.redirect_url.as_str()),
                ("scope", cfg.scopes.as_str()),
                ("state", state),
            ],
        )
        .map_err(|e| AuthError::Internal(format!("authorize url: {e}")))?;
        Ok(url.into())
    }

    /// Exchange an authorization code for a GitHub access token.
    pub async fn exchange_code(&self, code: &str) -> Result<String, AuthError> {
        let cfg = self.config()?;
        let resp: TokenEndpointResponse = self
            .send_json(
                self.http
                    .post(format!("{}/login/oauth/access_token", self.oauth_url))
                    .header("Accept", "application/json")
                    .form(&[
                        ("client_id", cfg.client_id.as_str()),
                        ("client_secret", cfg.client_secret.as_str()),
                        ("code", code),
                        ("redirect_uri", cfg.redirect_url.as_str()),
                    ]),
                "code exchange",
            )
            .await?;
        match resp.access_token.filter(|t| !t.is_empty()) {
            Some(token) => Ok(token),
            None => {
                debug!(
                    error = resp.error.as_deref().unwrap_or(""),
                    description = resp.error_description.as_deref().unwrap_or(""),
                    "GitHub rejected authorization code"
                );
                Err(AuthError::InvalidCredentials)
            }
        }
    }

    /// Profile of the account behind `access_token`, with its email resolved.
    pub async fn fetch_identity(&self, access_token: &str) -> Result<ExternalIdentity, AuthError> {
        let profile: GitHubProfile = self
            .send_json(
                self.api_get(&format!("{}/user", self.api_url))
                    .bearer_auth(access_token),
                "GET /user",
            )
            .await?;

        let email = match profile.email.clone().filter(|e| !e.is_empty()) {
            Some(email) => email,
            None => {
                let emails: Vec<GitHubEmail> = self
                    .send_json(
                        self.api_get(&format!("{}/user/emails", self.api_url))
                            .bearer_auth(access_token),
                        "GET /user/emails",
                    )
                    .await?;
                resolve_email(&emails).ok_or(AuthError::NoVerifiedEmail)?
            }
        };

        Ok(ExternalIdentity {
            external_id: profile.id,
            login: profile.login,
            name: profile.name.filter(|n| !n.is_empty()),
            email,
            avatar_url: profile.avatar_url.filter(|a| !a.is_empty()),
        })
    }

    /// Public profile of `login`. Accounts without a public email get the
    /// noreply address.
    pub async fn public_identity(&self, login: &str) -> Result<ExternalIdentity, AuthError> {
        let profile: GitHubProfile = self
            .send_json(
                self.api_get(&format!("{}/users/{login}", self.api_url)),
                "GET /users/{login}",
            )
            .await?;
        let login = if profile.login.is_empty() {
            login.to_string()
        } else {
            profile.login
        };
        let email = profile
            .email
            .filter(|e| !e.is_empty())
            .unwrap_or_else(|| noreply_email(profile.id, &login));
        Ok(ExternalIdentity {
            external_id: profile.id,
            login,
            name: profile.name.filter(|n| !n.is_empty()),
            email,
            avatar_url: profile.avatar_url.filter(|a| !a.is_empty()),
        })
    }

    /// Public SSH keys published for `login`, in authorized_keys format. An
    /// unknown account has no keys.
    pub async fn public_keys(&self, login: &str) -> Result<Vec<String>, AuthError> {
        let resp = self
            .api_get(&format!("{}/users/{login}/keys", self.api_url))
            .send()
            .await
            .map_err(|e| transport_error("GET /users/{login}/keys", e))?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }
        let keys: Vec<GitHubKey> = read_json(resp, "GET /users/{login}/keys").await?;
        Ok(keys.into_iter().map(|k| k.key).collect())
    }

    /// Request a device and user code.
    pub async fn start_device_flow(&self) -> Result<DeviceAuthorization, AuthError> {
        let cfg = self.config()?;
        let auth: DeviceAuthorization = self
            .send_json(
                self.http
                    .post(format!("{}/login/device/code", self.oauth_url))
                    .header("Accept", "application/json")
                    .form(&[
                        ("client_id", cfg.client_id.as_str()),
                        ("scope", cfg.scopes.as_str()),
                    ]),
                "device code request",
            )
            .await?;
        if auth.device_code.is_empty() || auth.user_code.is_empty() {
            return Err(AuthError::UpstreamProtocol(
                "device code response lacks device_code or user_code".into(),
            ));
        }
        Ok(auth)
    }

    /// One poll of the token endpoint for a device code.
    pub async fn poll_device_token(
        &self,
        device_code: &str,
    ) -> Result<TokenEndpointResponse, AuthError> {
        let cfg = self.config()?;
        self.send_json(
            self.http
                .post(format!("{}/login/oauth/access_token", self.oauth_url))
                .header("Accept", "application/json")
                .form(&[
                    ("client_id", cfg.client_id.as_str()),
                    ("client_secret", cfg.client_secret.as_str()),
                    ("device_code", device_code),
                    ("grant_type", DEVICE_GRANT_TYPE),
                ]),
            "device token poll",
        )
        .await
    }

    fn api_get(&self, url: &str) -> reqwest::RequestBuilder {
        self.http
            .get(url)
            .header("Accept", "application/vnd.github+json")
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        req: reqwest::RequestBuilder,
        what: &str,
    ) -> Result<T, AuthError> {
        let resp = req.send().await.map_err(|e| transport_error(what, e))?;
        read_json(resp, what).await
    }
}

async fn read_json<T: DeserializeOwned>(resp: reqwest::Response, what: &str) -> Result<T, AuthError> {
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        debug!(%status, body = %body, call = what, "GitHub call failed");
        return Err(AuthError::Upstream(format!("{what} returned HTTP {status}")));
    }
    resp.json::<T>()
        .await
        .map_err(|e| AuthError::UpstreamProtocol(format!("{what}: {e}")))
}

fn transport_error(what: &str, e: reqwest::Error) -> AuthError {
    if e.is_timeout() {
        AuthError::Timeout(format!("{what} to GitHub"))
    } else {
        AuthError::Upstream(format!("{what}: {e}"))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn email(addr: &str, primary: bool, verified: bool) -> GitHubEmail {
        GitHubEmail {
            email: addr.into(),
            primary,
            verified,
        }
    }

    #[test]
    fn login_shape_is_checked() {
        let longest = "x".repeat(39);
        let too_long = "x".repeat(40);
        for ok in ["octo", "octo-cat", "a", "A1b2", longest.as_str()] {
            assert!(is_valid_login(ok), "{ok}");
        }
        for bad in ["", "-octo", "a/../b", "x?y=", "octo cat", "octo%2F", "ünï", too_long.as_str()] {
            assert!(!is_valid_login(bad), "{bad}");
        }
    }

    fn config() -> GitHubOAuthConfig {
        GitHubOAuthConfig {
            client_id: "cid".into(),
            client_secret: "csecret".into(),
            redirect_url: "http://localhost:8080/auth/github/callback".into(),
            scopes: DEFAULT_SCOPES.into(),
        }
    }

    fn client(server: &MockServer) -> GitHubClient {
        GitHubClient::new(Some(config()))
            .unwrap()
            .with_oauth_url(server.uri())
            .with_api_url(server.uri())
    }

    #[test]
    fn email_resolution_order() {
        let list = [
            email("first@x", false, false),
            email("verified@x", false, true),
            email("primary@x", true, true),
        ];
        assert_eq!(resolve_email(&list).as_deref(), Some("primary@x"));
        assert_eq!(resolve_email(&list[..2]).as_deref(), Some("verified@x"));
        assert_eq!(resolve_email(&list[..1]).as_deref(), Some("first@x"));
        assert_eq!(resolve_email(&[]), None);
    }

    #[test]
    fn authorize_url_carries_state_and_scopes() {
        let gh = GitHubClient::new(Some(config())).unwrap();
        let url = gh.authorize_url("st4te").unwrap();
        assert!(url.starts_with("https://github.com/login/oauth/authorize?"));
        assert!(url.contains("state=st4te"));
        assert!(url.contains("client_id=cid"));
        assert!(url.contains("scope=read%3Auser+user%3Aemail"));
    }

    #[test]
    fn unconfigured_client_refuses_oauth() {
        let gh = GitHubClient::new(None).unwrap();
        assert!(!gh.is_configured());
        assert!(matches!(gh.authorize_url("s"), Err(AuthError::NotConfigured)));
    }

    #[tokio::test]
    async fn identity_falls_back_to_email_list() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/user"))
            .and(header("authorization", "Bearer gho_tok"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": 77, "login": "octo", "name": "Octo Cat", "email": null,
                "avatar_url": "https://avatars/77"
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/user/emails"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"email": "old@x.com", "primary": false, "verified": true},
                {"email": "main@x.com", "primary": true, "verified": true}
            ])))
            .mount(&server)
            .await;

        let identity = client(&server).fetch_identity("gho_tok").await.unwrap();
        assert_eq!(identity.external_id, 77);
        assert_eq!(identity.email, "main@x.com");
        assert_eq!(identity.name.as_deref(), Some("Octo Cat"));
    }

    #[tokio::test]
    async fn identity_without_any_email_fails() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/user"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"id": 1, "login": "x"})),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/user/emails"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&server)
            .await;

        let err = client(&server).fetch_identity("t").await.unwrap_err();
        assert!(matches!(err, AuthError::NoVerifiedEmail));
    }

    #[tokio::test]
    async fn device_start_requires_codes() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/login/device/code"))
            .and(body_string_contains("client_id=cid"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "verification_uri": "https://github.com/login/device",
                "expires_in": 900, "interval": 5
            })))
            .mount(&server)
            .await;

        let err = client(&server).start_device_flow().await.unwrap_err();
        assert!(matches!(err, AuthError::UpstreamProtocol(_)));
    }

    #[tokio::test]
    async fn unknown_user_has_no_keys() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/users/ghost/keys"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        assert!(client(&server).public_keys("ghost").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn public_identity_uses_noreply_email() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/users/octo"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"id": 9, "login": "octo"})),
            )
            .mount(&server)
            .await;

        let identity = client(&server).public_identity("octo").await.unwrap();
        assert_eq!(identity.email, "9+octo@users.noreply.github.com");
    }

    #[tokio::test]
    async fn server_errors_become_upstream() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/user"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = client(&server).fetch_identity("t").await.unwrap_err();
        assert!(matches!(err, AuthError::Upstream(_)));
    }
}
