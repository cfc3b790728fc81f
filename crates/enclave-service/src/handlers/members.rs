//! Membership handlers.
//!
//! - `GET /v1/rooms/:room_id/members` - List memberships (member)
//! - `POST /v1/rooms/:room_id/members` - Add members in one transaction (admin)
//! - `PATCH /v1/rooms/:room_id/members/:user_id` - Change role or permissions (admin)
//! - `DELETE /v1/rooms/:room_id/members/:user_id` - Remove a member (admin)
//!
//! The owner role is only granted by room provisioning, so a room keeps
//! exactly one owner.

use crate::context::RequestContext;
use crate::errors::EnclaveError;
use crate::handlers::parse_json;
use crate::models::{
    AddMemberEntry, AddMembersRequest, DeletedResponse, Membership, NewMembership, Role,
    UpdateMemberRequest,
};
use crate::repositories::{abort, MembershipsRepository, Storage, StorageTransaction};
use crate::routes::AppState;
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use common::{RoomId, UserId};
use std::sync::Arc;
use tracing::instrument;

/// Handler for GET /v1/rooms/:room_id/members
#[instrument(skip_all, name = "enclave.members.list", fields(room_id = %room_id))]
pub async fn list_members(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<RequestContext>,
    Path(room_id): Path<RoomId>,
) -> Result<Json<Vec<Membership>>, EnclaveError> {
    let user_id = ctx.user_id()?;
    state.guard.require_member(room_id, user_id).await?;

    let members = MembershipsRepository::list_for_room(&state.pool, room_id).await?;
    Ok(Json(members))
}

/// Handler for POST /v1/rooms/:room_id/members
///
/// # Response
///
/// - 201 Created: All memberships committed
/// - 400 Bad Request: Empty list or an entry asks for the owner role
/// - 403 Forbidden: Caller is not an admin of the room
/// - 409 Conflict: An entry is already a member or names an unknown user
#[instrument(skip_all, name = "enclave.members.add", fields(room_id = %room_id))]
pub async fn add_members(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<RequestContext>,
    Path(room_id): Path<RoomId>,
    body: Bytes,
) -> Result<(StatusCode, Json<Vec<Membership>>), EnclaveError> {
    let user_id = ctx.user_id()?;
    let request: AddMembersRequest = parse_json(&body, "add_members")?;
    state.guard.require_admin(room_id, user_id).await?;

    let added = insert_members(state.storage.as_ref(), room_id, &request.members).await?;

    tracing::info!(
        target: "enclave.handlers.members",
        room_id = %room_id,
        added_by = %user_id,
        count = added.len(),
        "Members added"
    );
    Ok((StatusCode::CREATED, Json(added)))
}

/// Handler for PATCH /v1/rooms/:room_id/members/:user_id
#[instrument(skip_all, name = "enclave.members.update", fields(room_id = %room_id, member_id = %member_id))]
pub async fn update_member(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<RequestContext>,
    Path((room_id, member_id)): Path<(RoomId, UserId)>,
    body: Bytes,
) -> Result<Json<Membership>, EnclaveError> {
    let user_id = ctx.user_id()?;
    let update: UpdateMemberRequest = parse_json(&body, "update_member")?;
    state.guard.require_admin(room_id, user_id).await?;

    if update.role == Some(Role::Owner) {
        return Err(owner_role_rejected());
    }

    let existing = MembershipsRepository::find(&state.pool, room_id, member_id)
        .await?
        .ok_or_else(|| EnclaveError::NotFound("Membership not found".to_string()))?;
    if existing.role == Role::Owner && update.role.is_some() {
        return Err(EnclaveError::BadRequest(
            "The owner's role cannot be changed".to_string(),
        ));
    }

    let membership = MembershipsRepository::update(&state.pool, room_id, member_id, &update)
        .await?
        .ok_or_else(|| EnclaveError::NotFound("Membership not found".to_string()))?;

    tracing::info!(
        target: "enclave.handlers.members",
        room_id = %room_id,
        member_id = %member_id,
        role = %membership.role,
        "Membership updated"
    );
    Ok(Json(membership))
}

/// Handler for DELETE /v1/rooms/:room_id/members/:user_id
#[instrument(skip_all, name = "enclave.members.remove", fields(room_id = %room_id, member_id = %member_id))]
pub async fn remove_member(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<RequestContext>,
    Path((room_id, member_id)): Path<(RoomId, UserId)>,
) -> Result<Json<DeletedResponse>, EnclaveError> {
    let user_id = ctx.user_id()?;
    state.guard.require_admin(room_id, user_id).await?;

    if let Some(target) = MembershipsRepository::find(&state.pool, room_id, member_id).await? {
        if target.role == Role::Owner {
            return Err(EnclaveError::BadRequest(
                "The owner cannot be removed from the room".to_string(),
            ));
        }
    }

    let deleted = MembershipsRepository::delete(&state.pool, room_id, member_id).await?;
    Ok(Json(DeletedResponse { deleted }))
}

fn owner_role_rejected() -> EnclaveError {
    EnclaveError::BadRequest("The owner role cannot be granted".to_string())
}

/// Insert every entry or none of them.
async fn insert_members(
    storage: &dyn Storage,
    room_id: RoomId,
    entries: &[AddMemberEntry],
) -> Result<Vec<Membership>, EnclaveError> {
    if entries.is_empty() {
        return Err(EnclaveError::BadRequest(
            "At least one member is required".to_string(),
        ));
    }
    if entries.iter().any(|entry| entry.role == Some(Role::Owner)) {
        return Err(owner_role_rejected());
    }

    let mut tx = storage.begin().await?;
    let inserted = insert_each(tx.as_mut(), room_id, entries).await;
    match inserted {
        Ok(members) => {
            tx.commit().await?;
            Ok(members)
        }
        Err(e) => Err(abort(tx, e).await),
    }
}

async fn insert_each(
    tx: &mut dyn StorageTransaction,
    room_id: RoomId,
    entries: &[AddMemberEntry],
) -> Result<Vec<Membership>, EnclaveError> {
    let mut members = Vec::with_capacity(entries.len());
    for entry in entries {
        let mut new = NewMembership::with_role(
            room_id,
            entry.user_id,
            entry.role.unwrap_or(Role::Member),
        );
        new.can_post = entry.can_post.unwrap_or(true);
        new.can_call = entry.can_call.unwrap_or(true);
        members.push(tx.insert_membership(&new).await?);
    }
    Ok(members)
}
