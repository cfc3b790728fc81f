//! Message handlers.
//!
//! - `GET /v1/rooms/:room_id/messages` - Room history, oldest first (member)
//! - `POST /v1/rooms/:room_id/messages` - Post a message (member with `can_post`)
//! - `PATCH /v1/messages/:message_id` - Edit a message (author or admin)
//! - `DELETE /v1/messages/:message_id` - Delete a message (author or admin)
//!
//! An unknown message id answers 403, the same as a message in a room the
//! caller cannot see.

use crate::context::RequestContext;
use crate::errors::EnclaveError;
use crate::handlers::parse_json;
use crate::models::{
    CreateMessageRequest, DeletedResponse, Message, NewMessage, UpdateMessageRequest,
    DEFAULT_CONTENT_TYPE, DEFAULT_ENCRYPTION_SCHEME,
};
use crate::repositories::MessagesRepository;
use crate::routes::AppState;
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use common::{MessageId, RoomId, UserId};
use std::sync::Arc;
use tracing::instrument;

/// Handler for GET /v1/rooms/:room_id/messages
#[instrument(skip_all, name = "enclave.messages.list", fields(room_id = %room_id))]
pub async fn list_messages(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<RequestContext>,
    Path(room_id): Path<RoomId>,
) -> Result<Json<Vec<Message>>, EnclaveError> {
    let user_id = ctx.user_id()?;
    state.guard.require_member(room_id, user_id).await?;

    let messages = MessagesRepository::list_for_room(&state.pool, room_id).await?;
    Ok(Json(messages))
}

/// Handler for POST /v1/rooms/:room_id/messages
#[instrument(skip_all, name = "enclave.messages.create", fields(room_id = %room_id))]
pub async fn create_message(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<RequestContext>,
    Path(room_id): Path<RoomId>,
    body: Bytes,
) -> Result<(StatusCode, Json<Message>), EnclaveError> {
    let user_id = ctx.user_id()?;
    let request: CreateMessageRequest = parse_json(&body, "create_message")?;
    state.guard.require_poster(room_id, user_id).await?;

    if request.cipher_text.is_empty() {
        return Err(EnclaveError::BadRequest(
            "cipher_text is required".to_string(),
        ));
    }

    let message = MessagesRepository::insert(
        &state.pool,
        &NewMessage {
            room_id,
            sender_id: user_id,
            cipher_text: request.cipher_text,
            content_type: non_empty_or(request.content_type, DEFAULT_CONTENT_TYPE),
            encryption_scheme: non_empty_or(request.encryption_scheme, DEFAULT_ENCRYPTION_SCHEME),
        },
    )
    .await?;

    tracing::debug!(
        target: "enclave.handlers.messages",
        message_id = %message.id,
        room_id = %room_id,
        sender_id = %user_id,
        "Message created"
    );
    Ok((StatusCode::CREATED, Json(message)))
}

/// Handler for PATCH /v1/messages/:message_id
#[instrument(skip_all, name = "enclave.messages.update", fields(message_id = %message_id))]
pub async fn update_message(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<RequestContext>,
    Path(message_id): Path<MessageId>,
    body: Bytes,
) -> Result<Json<Message>, EnclaveError> {
    let user_id = ctx.user_id()?;
    let update: UpdateMessageRequest = parse_json(&body, "update_message")?;
    if matches!(update.cipher_text.as_deref(), Some("")) {
        return Err(EnclaveError::BadRequest(
            "cipher_text must not be empty".to_string(),
        ));
    }

    authorize_message_change(&state, message_id, user_id).await?;

    let message = MessagesRepository::update(&state.pool, message_id, &update)
        .await?
        .ok_or(EnclaveError::Forbidden)?;
    Ok(Json(message))
}

/// Handler for DELETE /v1/messages/:message_id
#[instrument(skip_all, name = "enclave.messages.delete", fields(message_id = %message_id))]
pub async fn delete_message(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<RequestContext>,
    Path(message_id): Path<MessageId>,
) -> Result<Json<DeletedResponse>, EnclaveError> {
    let user_id = ctx.user_id()?;
    authorize_message_change(&state, message_id, user_id).await?;

    let deleted = MessagesRepository::delete(&state.pool, message_id).await?;
    tracing::debug!(target: "enclave.handlers.messages", message_id = %message_id, deleted_by = %user_id, "Message deleted");
    Ok(Json(DeletedResponse { deleted }))
}

async fn authorize_message_change(
    state: &AppState,
    message_id: MessageId,
    user_id: UserId,
) -> Result<(), EnclaveError> {
    let message = MessagesRepository::find_by_id(&state.pool, message_id)
        .await?
        .ok_or(EnclaveError::Forbidden)?;

    state
        .guard
        .require_author_or_admin(message.room_id, user_id, message.sender_id)
        .await?;
    Ok(())
}

fn non_empty_or(value: Option<String>, default: &str) -> String {
    value
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}
