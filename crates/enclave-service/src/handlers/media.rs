//! Media handlers.
//!
//! - `POST /v1/media` - Record an uploaded blob, optionally attached to a message
//! - `GET /v1/messages/:message_id/media` - Media attached to a message (member)
//! - `DELETE /v1/media/:media_id` - Delete a record (uploader only)
//!
//! Attaching to a message requires authorship of that message or
//! admin-or-above in its room. An unknown message answers 403.

use crate::context::RequestContext;
use crate::errors::EnclaveError;
use crate::handlers::parse_json;
use crate::models::{CreateMediaRequest, DeletedResponse, Media, NewMedia};
use crate::repositories::{MediaRepository, MessagesRepository};
use crate::routes::AppState;
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use common::{MediaId, MessageId};
use std::sync::Arc;
use tracing::instrument;

/// Handler for POST /v1/media
#[instrument(skip_all, name = "enclave.media.create")]
pub async fn create_media(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<RequestContext>,
    body: Bytes,
) -> Result<(StatusCode, Json<Media>), EnclaveError> {
    let user_id = ctx.user_id()?;
    let request: CreateMediaRequest = parse_json(&body, "create_media")?;

    if let Some(field) = request.blank_field() {
        return Err(EnclaveError::BadRequest(format!("{field} is required")));
    }
    if request.size_bytes < 0 {
        return Err(EnclaveError::BadRequest(
            "size_bytes must not be negative".to_string(),
        ));
    }

    if let Some(message_id) = request.message_id {
        let message = MessagesRepository::find_by_id(&state.pool, message_id)
            .await?
            .ok_or(EnclaveError::Forbidden)?;
        state
            .guard
            .require_author_or_admin(message.room_id, user_id, message.sender_id)
            .await?;
    }

    let media = MediaRepository::insert(
        &state.pool,
        &NewMedia {
            uploader_id: user_id,
            message_id: request.message_id,
            filename: request.filename,
            content_type: request.content_type,
            storage_path: request.storage_path,
            checksum: request.checksum,
            size_bytes: request.size_bytes,
        },
    )
    .await?;

    tracing::debug!(
        target: "enclave.handlers.media",
        media_id = %media.id,
        uploader_id = %user_id,
        size_bytes = media.size_bytes,
        "Media recorded"
    );
    Ok((StatusCode::CREATED, Json(media)))
}

/// Handler for GET /v1/messages/:message_id/media
#[instrument(skip_all, name = "enclave.media.list", fields(message_id = %message_id))]
pub async fn list_message_media(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<RequestContext>,
    Path(message_id): Path<MessageId>,
) -> Result<Json<Vec<Media>>, EnclaveError> {
    let user_id = ctx.user_id()?;
    let room_id = MessagesRepository::find_room(&state.pool, message_id)
        .await?
        .ok_or(EnclaveError::Forbidden)?;
    state.guard.require_member(room_id, user_id).await?;

    let media = MediaRepository::list_for_message(&state.pool, message_id).await?;
    Ok(Json(media))
}

/// Handler for DELETE /v1/media/:media_id
#[instrument(skip_all, name = "enclave.media.delete", fields(media_id = %media_id))]
pub async fn delete_media(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<RequestContext>,
    Path(media_id): Path<MediaId>,
) -> Result<Json<DeletedResponse>, EnclaveError> {
    let user_id = ctx.user_id()?;
    let media = MediaRepository::find_by_id(&state.pool, media_id)
        .await?
        .ok_or_else(|| EnclaveError::NotFound("Media not found".to_string()))?;

    if media.uploader_id != user_id {
        return Err(EnclaveError::Forbidden);
    }

    let deleted = MediaRepository::delete(&state.pool, media_id).await?;
    Ok(Json(DeletedResponse { deleted }))
}
