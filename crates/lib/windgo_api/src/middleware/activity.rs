//! Presence tracking for authenticated requests.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use tracing::debug;

use crate::AppState;
use crate::middleware::auth::AuthenticatedUser;

/// Records `last_active_at` for the caller on a detached task. Never fails
/// the request.
pub async fn track_activity(State(state): State<AppState>, request: Request, next: Next) -> Response {
    if let Some(caller) = request.extensions().get::<AuthenticatedUser>() {
        let store = state.credentials.clone();
        let user_id = caller.user_id;
        let now = state.clock.now();
        tokio::spawn(async move {
            if let Err(e) = store.touch_user_activity(user_id, now).await {
                debug!(user_id, error = %e, "failed to record activity");
            }
        });
    }
    next.run(request).await
}
