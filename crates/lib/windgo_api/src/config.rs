//! API server configuration.

use windgo_core::auth::github::{DEFAULT_API_URL, DEFAULT_OAUTH_URL, GitHubOAuthConfig};
use windgo_core::auth::jwt::resolve_jwt_secret;

/// Configuration for the API server.
#[derive(Clone, Debug)]
pub struct ApiConfig {
    /// Address to bind the HTTP listener (e.g. "127.0.0.1:8080").
    pub bind_addr: String,
    /// PostgreSQL connection URL.
    pub database_url: String,
    /// JWT signing secret.
    pub jwt_secret: String,
    /// GitHub OAuth app credentials; `None` when not configured.
    pub github: Option<GitHubOAuthConfig>,
    /// Base URL of GitHub's OAuth endpoints.
    pub github_oauth_url: String,
    /// Base URL of GitHub's REST API.
    pub github_api_url: String,
    /// Browser origin allowed by CORS.
    pub cors_origin: String,
    /// Set the `Secure` attribute on auth cookies.
    pub secure_cookies: bool,
}

impl ApiConfig {
    /// Reads configuration from environment variables with sensible defaults.
    ///
    /// | Variable                     | Default                             |
    /// |------------------------------|-------------------------------------|
    /// | `BIND_ADDR`                  | `127.0.0.1:8080`                    |
    /// | `DATABASE_URL`               | `postgres://localhost:5432/windgo`  |
    /// | `JWT_SECRET` / `AUTH_SECRET` | generated & persisted to file       |
    /// | `GITHUB_CLIENT_ID`, `GITHUB_CLIENT_SECRET`, `GITHUB_REDIRECT_URL` | unset (OAuth disabled) |
    /// | `GITHUB_OAUTH_URL`           | `https://github.com`                |
    /// | `GITHUB_API_URL`             | `https://api.github.com`            |
    /// | `CORS_ORIGIN`                | `http://localhost:3000`             |
    /// | `SECURE_COOKIES`             | `true`                              |
    pub fn from_env() -> Self {
        Self {
            bind_addr: std::env::var("BIND_ADDR").unwrap_or_else(|_| "127.0.0.1:8080".into()),
            database_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "postgres://localhost:5432/windgo".into()),
            jwt_secret: resolve_jwt_secret(),
            github: GitHubOAuthConfig::from_env(),
            github_oauth_url: std::env::var("GITHUB_OAUTH_URL")
                .unwrap_or_else(|_| DEFAULT_OAUTH_URL.into()),
            github_api_url: std::env::var("GITHUB_API_URL")
                .unwrap_or_else(|_| DEFAULT_API_URL.into()),
            cors_origin: std::env::var("CORS_ORIGIN")
                .unwrap_or_else(|_| "http://localhost:3000".into()),
            secure_cookies: std::env::var("SECURE_COOKIES")
                .map(|v| parse_bool(&v))
                .unwrap_or(true),
        }
    }

    /// Configuration for tests: fixed secret, no GitHub app, insecure cookies.
    pub fn for_tests(jwt_secret: &str) -> Self {
        Self {
            bind_addr: "127.0.0.1:0".into(),
            database_url: String::new(),
            jwt_secret: jwt_secret.into(),
            github: None,
            github_oauth_url: DEFAULT_OAUTH_URL.into(),
            github_api_url: DEFAULT_API_URL.into(),
            cors_origin: "http://localhost:3000".into(),
            secure_cookies: false,
        }
    }
}

fn parse_bool(v: &str) -> bool {
    !matches!(v.trim().to_ascii_lowercase().as_str(), "0" | "false" | "no" | "off")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_bool_accepts_common_spellings() {
        assert!(parse_bool("true"));
        assert!(parse_bool("1"));
        assert!(!parse_bool("false"));
        assert!(!parse_bool(" OFF "));
    }
}
