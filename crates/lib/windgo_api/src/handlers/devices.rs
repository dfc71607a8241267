//! Device listing and revocation handlers.

use axum::extract::{Path, State};
use axum::{Extension, Json};
use windgo_core::auth::{AuthError, sessions};

use crate::AppState;
use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthenticatedUser;
use crate::models::{MeResponse, MessageResponse, RevokeAllResponse};

/// `GET /me`: the caller, the device its token is bound to, and all of its
/// active devices.
pub async fn me_handler(
    State(state): State<AppState>,
    Extension(caller): Extension<AuthenticatedUser>,
) -> AppResult<Json<MeResponse>> {
    let user = state
        .credentials
        .find_user_by_id(caller.user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".into()))?;
    let devices = state.credentials.list_active_devices(caller.user_id).await?;
    let current_device = caller
        .device_id
        .as_deref()
        .and_then(|id| devices.iter().find(|d| d.device_id == id).cloned());
    Ok(Json(MeResponse {
        user,
        current_device,
        devices,
    }))
}

/// `POST /devices/revoke/{device_id}`
pub async fn revoke_handler(
    State(state): State<AppState>,
    Extension(caller): Extension<AuthenticatedUser>,
    Path(device_id): Path<String>,
) -> AppResult<Json<MessageResponse>> {
    if device_id.trim().is_empty() {
        return Err(AppError::Validation("Device ID is required".into()));
    }
    sessions::revoke_device(state.credentials.as_ref(), caller.user_id, &device_id)
        .await
        .map_err(|e| match e {
            AuthError::NotFound(_) => AppError::NotFound("Device not found".into()),
            other => other.into(),
        })?;
    Ok(Json(MessageResponse::new("Device revoked successfully")))
}

/// `POST /devices/revoke-all`
pub async fn revoke_all_handler(
    State(state): State<AppState>,
    Extension(caller): Extension<AuthenticatedUser>,
) -> AppResult<Json<RevokeAllResponse>> {
    let revoked = sessions::revoke_all_devices(state.credentials.as_ref(), caller.user_id).await?;
    Ok(Json(RevokeAllResponse { revoked }))
}
