//! # windgo_api
//!
//! HTTP API library for WindGo Chat.

pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;

use std::sync::Arc;

use axum::Router;
use axum::http::{HeaderValue, Method, header};
use axum::routing::{get, post};
use tower_http::cors::CorsLayer;
use tracing::warn;
use windgo_core::auth::github::GitHubClient;
use windgo_core::auth::{AuthError, TokenService};
use windgo_core::clock::Clock;
use windgo_core::store::{ChatStore, CredentialStore};

use crate::config::ApiConfig;
use crate::handlers::{auth, chat, devices, github, health, ssh, users};

/// Shared application state passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Users, identities, nonces and devices.
    pub credentials: Arc<dyn CredentialStore>,
    /// Rooms, messages and the user directory.
    pub chat: Arc<dyn ChatStore>,
    pub tokens: TokenService,
    pub github: GitHubClient,
    pub clock: Arc<dyn Clock>,
    pub config: ApiConfig,
}

impl AppState {
    /// Build state from stores, a clock and configuration.
    pub fn new(
        credentials: Arc<dyn CredentialStore>,
        chat: Arc<dyn ChatStore>,
        clock: Arc<dyn Clock>,
        config: ApiConfig,
    ) -> Result<Self, AuthError> {
        let github = GitHubClient::new(config.github.clone())?
            .with_oauth_url(config.github_oauth_url.clone())
            .with_api_url(config.github_api_url.clone());
        Ok(Self {
            credentials,
            chat,
            tokens: TokenService::new(config.jwt_secret.as_bytes()),
            github,
            clock,
            config,
        })
    }
}

fn cors(config: &ApiConfig) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_credentials(true);
    match HeaderValue::from_str(&config.cors_origin) {
        Ok(origin) => layer.allow_origin(origin),
        Err(e) => {
            warn!(origin = %config.cors_origin, error = %e, "ignoring invalid CORS origin");
            layer
        }
    }
}

/// Builds the Axum router with all routes and shared state.
pub fn router(state: AppState) -> Router {
    // Public routes (no auth required)
    let public = Router::new()
        .route("/", get(health::root))
        .route("/health", get(health::health))
        .route("/auth/register", post(auth::register_handler))
        .route("/auth/login", post(auth::login_handler))
        .route("/auth/refresh", post(auth::refresh_handler))
        .route("/auth/logout", post(auth::logout_handler))
        .route("/auth/github/login", get(github::login_redirect_handler))
        .route("/auth/github/callback", get(github::callback_handler))
        .route("/auth/github/status", get(github::status_handler))
        .route("/auth/github/device/start", post(github::device_start_handler))
        .route("/auth/github/device/poll", post(github::device_poll_handler))
        .route("/auth/nonce", post(ssh::nonce_handler))
        .route("/auth/login/ssh", post(ssh::login_handler))
        .route("/api/v1/rooms", get(chat::list_rooms_handler));

    // Protected routes (require auth)
    let protected = Router::new()
        .route("/me", get(devices::me_handler))
        .route("/auth/profile", get(users::profile_handler))
        .route("/devices/revoke/{device_id}", post(devices::revoke_handler))
        .route("/devices/revoke-all", post(devices::revoke_all_handler))
        .route("/api/v1/rooms", post(chat::create_room_handler))
        .route("/api/v1/messages", post(chat::send_message_handler))
        .route(
            "/api/v1/rooms/{room_id}/messages",
            get(chat::list_messages_handler),
        )
        .route("/api/v1/users", get(users::list_users_handler))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::activity::track_activity,
        ))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::require_auth,
        ));

    Router::new()
        .merge(public)
        .merge(protected)
        .layer(cors(&state.config))
        .with_state(state)
}
