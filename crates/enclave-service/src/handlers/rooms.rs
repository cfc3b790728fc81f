//! Room handlers.
//!
//! - `GET /v1/rooms` - Rooms the caller belongs to
//! - `POST /v1/rooms` - Provision a room with its initial members
//! - `GET /v1/rooms/:room_id` - Room details (member)
//! - `PATCH /v1/rooms/:room_id` - Update name, description, privacy (admin)
//! - `DELETE /v1/rooms/:room_id` - Delete the room and everything in it (owner)

use crate::context::RequestContext;
use crate::errors::EnclaveError;
use crate::handlers::parse_json;
use crate::models::{
    CreateRoomRequest, DeletedResponse, Room, UpdateRoomRequest, MAX_ROOM_NAME_LENGTH,
};
use crate::repositories::RoomsRepository;
use crate::routes::AppState;
use crate::services::RoomSpec;
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use common::RoomId;
use std::sync::Arc;
use tracing::instrument;

/// Handler for GET /v1/rooms
#[instrument(skip_all, name = "enclave.rooms.list")]
pub async fn list_rooms(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<RequestContext>,
) -> Result<Json<Vec<Room>>, EnclaveError> {
    let user_id = ctx.user_id()?;
    let rooms = RoomsRepository::list_for_user(&state.pool, user_id).await?;
    Ok(Json(rooms))
}

/// Handler for POST /v1/rooms
///
/// The caller becomes the owner. One other participant makes a direct room
/// where the peer is admin; otherwise participants join as members.
///
/// # Response
///
/// - 201 Created: Room and memberships committed
/// - 400 Bad Request: Invalid body or name
/// - 409 Conflict: Duplicate or unknown participant (nothing is created)
#[instrument(skip_all, name = "enclave.rooms.create")]
pub async fn create_room(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<RequestContext>,
    body: Bytes,
) -> Result<(StatusCode, Json<Room>), EnclaveError> {
    let owner_id = ctx.user_id()?;
    let request: CreateRoomRequest = parse_json(&body, "create_room")?;

    let room = state
        .provisioner
        .create_room(RoomSpec {
            owner_id,
            name: request.name,
            description: request.description,
            is_private: request.is_private,
            participant_ids: request.participant_ids,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(room)))
}

/// Handler for GET /v1/rooms/:room_id
#[instrument(skip_all, name = "enclave.rooms.get", fields(room_id = %room_id))]
pub async fn get_room(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<RequestContext>,
    Path(room_id): Path<RoomId>,
) -> Result<Json<Room>, EnclaveError> {
    let user_id = ctx.user_id()?;
    state.guard.require_member(room_id, user_id).await?;

    RoomsRepository::find_by_id(&state.pool, room_id)
        .await?
        .map(Json)
        .ok_or_else(|| EnclaveError::NotFound("Room not found".to_string()))
}

/// Handler for PATCH /v1/rooms/:room_id
#[instrument(skip_all, name = "enclave.rooms.update", fields(room_id = %room_id))]
pub async fn update_room(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<RequestContext>,
    Path(room_id): Path<RoomId>,
    body: Bytes,
) -> Result<Json<Room>, EnclaveError> {
    let user_id = ctx.user_id()?;
    let mut update: UpdateRoomRequest = parse_json(&body, "update_room")?;
    state.guard.require_admin(room_id, user_id).await?;

    if let Some(name) = update.name.take() {
        let name = name.trim().to_string();
        if name.is_empty() || name.chars().count() > MAX_ROOM_NAME_LENGTH {
            return Err(EnclaveError::BadRequest(format!(
                "Room name must be between 1 and {MAX_ROOM_NAME_LENGTH} characters"
            )));
        }
        update.name = Some(name);
    }

    let room = RoomsRepository::update(&state.pool, room_id, &update)
        .await?
        .ok_or_else(|| EnclaveError::NotFound("Room not found".to_string()))?;

    tracing::info!(target: "enclave.handlers.rooms", room_id = %room.id, updated_by = %user_id, "Room updated");
    Ok(Json(room))
}

/// Handler for DELETE /v1/rooms/:room_id
///
/// Memberships and messages go with the room; notifications that pointed at
/// it keep their record with the room cleared.
#[instrument(skip_all, name = "enclave.rooms.delete", fields(room_id = %room_id))]
pub async fn delete_room(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<RequestContext>,
    Path(room_id): Path<RoomId>,
) -> Result<Json<DeletedResponse>, EnclaveError> {
    let user_id = ctx.user_id()?;
    state.guard.require_owner(room_id, user_id).await?;

    let deleted = RoomsRepository::delete(&state.pool, room_id).await?;
    tracing::info!(target: "enclave.handlers.rooms", room_id = %room_id, deleted, "Room deleted");
    Ok(Json(DeletedResponse { deleted }))
}
