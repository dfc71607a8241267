//! Room and message handlers.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use windgo_core::chat::PageRequest;
use windgo_core::models::chat::Room;

use super::json_body;
use crate::AppState;
use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthenticatedUser;
use crate::models::{
    CreateRoomRequest, MessagesResponse, PageParams, RoomsResponse, SendMessageRequest,
    SendMessageResponse,
};

/// `GET /api/v1/rooms`
pub async fn list_rooms_handler(State(state): State<AppState>) -> AppResult<Json<RoomsResponse>> {
    let rooms = state.chat.list_rooms().await?;
    Ok(Json(RoomsResponse { rooms }))
}

/// `POST /api/v1/rooms`
pub async fn create_room_handler(
    State(state): State<AppState>,
    payload: Result<Json<CreateRoomRequest>, JsonRejection>,
) -> AppResult<(StatusCode, Json<Room>)> {
    let body = json_body(payload)?;
    let name = body.name.trim();
    if name.is_empty() {
        return Err(AppError::Validation("Room name is required".into()));
    }
    let room = state.chat.create_room(name).await?;
    Ok((StatusCode::CREATED, Json(room)))
}

/// `POST /api/v1/messages`
pub async fn send_message_handler(
    State(state): State<AppState>,
    Extension(caller): Extension<AuthenticatedUser>,
    payload: Result<Json<SendMessageRequest>, JsonRejection>,
) -> AppResult<(StatusCode, Json<SendMessageResponse>)> {
    let body = json_body(payload)?;
    let content = body.content.trim();
    if content.is_empty() {
        return Err(AppError::Validation("Message content is required".into()));
    }
    if state.chat.find_room(body.room_id).await?.is_none() {
        return Err(AppError::NotFound("Room not found".into()));
    }
    let message = state
        .chat
        .create_message(body.room_id, caller.user_id, content)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(SendMessageResponse {
            message: "Message sent successfully",
            data: message,
        }),
    ))
}

/// `GET /api/v1/rooms/{room_id}/messages?page&limit`: newest first.
pub async fn list_messages_handler(
    State(state): State<AppState>,
    Path(room_id): Path<i64>,
    Query(params): Query<PageParams>,
) -> AppResult<Json<MessagesResponse>> {
    if state.chat.find_room(room_id).await?.is_none() {
        return Err(AppError::NotFound("Room not found".into()));
    }
    let page = PageRequest::new(params.page, params.limit);
    let messages = state
        .chat
        .list_messages(room_id, page.limit, page.offset())
        .await?;
    let total = state.chat.count_messages(room_id).await?;
    Ok(Json(MessagesResponse {
        messages,
        pagination: page.pagination(total),
    }))
}
