//! Room provisioning.
//!
//! Creates a room and its initial memberships in a single transaction:
//!
//! 1. Count the participants that are not the owner
//! 2. The room is direct when exactly one such participant exists
//! 3. Insert the room, then the owner membership with role `owner`
//! 4. Insert each other participant as `admin` in a direct room, `member`
//!    otherwise
//! 5. Commit
//!
//! Any failure rolls the whole transaction back; a partially provisioned
//! room is never visible. Owner ids listed among the participants are
//! skipped. Duplicate participant ids are not collapsed, so the second
//! insert hits the unique (room, user) constraint and the call fails.

use crate::errors::EnclaveError;
use crate::models::{NewMembership, NewRoom, Role, Room, MAX_ROOM_NAME_LENGTH};
use crate::observability::metrics::record_room_provisioned;
use crate::repositories::{abort, Storage, StorageTransaction};
use common::UserId;
use std::sync::Arc;
use std::time::Instant;
use tracing::instrument;

/// Parameters for [`RoomProvisioner::create_room`].
#[derive(Debug, Clone)]
pub struct RoomSpec {
    pub owner_id: UserId,
    pub name: String,
    pub description: String,
    pub is_private: bool,
    pub participant_ids: Vec<UserId>,
}

/// Number of participants other than the owner.
pub fn non_owner_count(owner_id: UserId, participant_ids: &[UserId]) -> usize {
    participant_ids.iter().filter(|id| **id != owner_id).count()
}

/// A room is direct when exactly one non-owner participant is listed.
pub fn is_direct(owner_id: UserId, participant_ids: &[UserId]) -> bool {
    non_owner_count(owner_id, participant_ids) == 1
}

/// Role granted to non-owner participants.
pub fn participant_role(is_direct: bool) -> Role {
    if is_direct {
        Role::Admin
    } else {
        Role::Member
    }
}

/// Transactional room creation.
#[derive(Clone)]
pub struct RoomProvisioner {
    storage: Arc<dyn Storage>,
}

impl RoomProvisioner {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    /// Create a room with its owner and participant memberships.
    ///
    /// Not idempotent: each call creates a new room.
    #[instrument(
        skip_all,
        name = "enclave.provisioner.create_room",
        fields(owner_id = %spec.owner_id, participants = spec.participant_ids.len())
    )]
    pub async fn create_room(&self, spec: RoomSpec) -> Result<Room, EnclaveError> {
        let start = Instant::now();
        let name = spec.name.trim().to_string();
        if name.is_empty() {
            return Err(EnclaveError::BadRequest("Room name is required".to_string()));
        }
        if name.chars().count() > MAX_ROOM_NAME_LENGTH {
            return Err(EnclaveError::BadRequest(format!(
                "Room name must be at most {MAX_ROOM_NAME_LENGTH} characters"
            )));
        }

        let direct = is_direct(spec.owner_id, &spec.participant_ids);
        let kind = if direct { "direct" } else { "group" };

        let new_room = NewRoom {
            name,
            description: spec.description,
            is_private: spec.is_private,
            is_direct: direct,
            owner_id: spec.owner_id,
        };

        let result = self.provision(&new_room, &spec.participant_ids).await;

        match &result {
            Ok(room) => {
                record_room_provisioned(kind, "success", start.elapsed());
                tracing::info!(
                    target: "enclave.provisioner",
                    room_id = %room.id,
                    owner_id = %room.owner_id,
                    kind,
                    members = 1 + non_owner_count(spec.owner_id, &spec.participant_ids),
                    "Room provisioned"
                );
            }
            Err(e) => {
                record_room_provisioned(kind, "error", start.elapsed());
                tracing::warn!(
                    target: "enclave.provisioner",
                    owner_id = %spec.owner_id,
                    kind,
                    error = %e,
                    "Room provisioning failed"
                );
            }
        }

        result
    }

    async fn provision(
        &self,
        new_room: &NewRoom,
        participant_ids: &[UserId],
    ) -> Result<Room, EnclaveError> {
        let mut tx = self.storage.begin().await?;

        let inserted = insert_all(tx.as_mut(), new_room, participant_ids).await;
        match inserted {
            Ok(room) => {
                tx.commit().await?;
                Ok(room)
            }
            Err(e) => Err(abort(tx, e).await),
        }
    }
}

async fn insert_all(
    tx: &mut dyn StorageTransaction,
    new_room: &NewRoom,
    participant_ids: &[UserId],
) -> Result<Room, EnclaveError> {
    let room = tx.insert_room(new_room).await?;

    tx.insert_membership(&NewMembership::with_role(
        room.id,
        new_room.owner_id,
        Role::Owner,
    ))
    .await?;

    let role = participant_role(new_room.is_direct);
    for participant in participant_ids.iter().filter(|id| **id != new_room.owner_id) {
        tx.insert_membership(&NewMembership::with_role(room.id, *participant, role))
            .await?;
    }

    Ok(room)
}
