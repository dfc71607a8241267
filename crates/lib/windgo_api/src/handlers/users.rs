//! Profile and user directory handlers.

use axum::extract::{Query, State};
use axum::{Extension, Json};
use windgo_core::chat::with_presence;
use windgo_core::models::auth::User;

use crate::AppState;
use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthenticatedUser;
use crate::models::{UserSearchParams, UsersResponse};

/// `GET /auth/profile`
pub async fn profile_handler(
    State(state): State<AppState>,
    Extension(caller): Extension<AuthenticatedUser>,
) -> AppResult<Json<User>> {
    let user = state
        .credentials
        .find_user_by_id(caller.user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".into()))?;
    Ok(Json(user))
}

/// `GET /api/v1/users?search=`: everyone but the caller, with presence.
pub async fn list_users_handler(
    State(state): State<AppState>,
    Extension(caller): Extension<AuthenticatedUser>,
    Query(params): Query<UserSearchParams>,
) -> AppResult<Json<UsersResponse>> {
    let search = params
        .search
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty());
    let now = state.clock.now();
    let users = state
        .chat
        .list_users(caller.user_id, search.as_deref())
        .await?
        .into_iter()
        .map(|u| with_presence(u, now))
        .collect();
    Ok(Json(UsersResponse { users }))
}
