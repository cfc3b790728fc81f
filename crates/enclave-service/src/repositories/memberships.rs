//! Room memberships repository.

use crate::errors::EnclaveError;
use crate::models::{Membership, NewMembership, Role, UpdateMemberRequest};
use chrono::{DateTime, Utc};
use common::{RoomId, UserId};
use sqlx::{Executor, Sqlite, SqlitePool};
use tracing::instrument;

const MEMBERSHIP_COLUMNS: &str =
    "id, room_id, user_id, role, can_post, can_call, joined_at, updated_at";

/// Repository for membership rows.
pub struct MembershipsRepository;

impl MembershipsRepository {
    /// Insert a membership. A duplicate (room, user) pair is a unique violation.
    #[instrument(skip_all, fields(room_id = %new.room_id, user_id = %new.user_id, role = %new.role))]
    pub async fn insert<'e, E>(executor: E, new: &NewMembership) -> Result<Membership, EnclaveError>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let now = Utc::now();
        let row: MembershipRow = sqlx::query_as(&format!(
            "INSERT INTO room_memberships (room_id, user_id, role, can_post, can_call, joined_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?) RETURNING {MEMBERSHIP_COLUMNS}"
        ))
        .bind(new.room_id.get())
        .bind(new.user_id.get())
        .bind(new.role.as_str())
        .bind(new.can_post)
        .bind(new.can_call)
        .bind(now)
        .bind(now)
        .fetch_one(executor)
        .await?;

        row.try_into()
    }

    /// Find the membership for a (room, user) pair.
    #[instrument(skip_all, fields(room_id = %room_id, user_id = %user_id))]
    pub async fn find<'e, E>(
        executor: E,
        room_id: RoomId,
        user_id: UserId,
    ) -> Result<Option<Membership>, EnclaveError>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let row: Option<MembershipRow> = sqlx::query_as(&format!(
            "SELECT {MEMBERSHIP_COLUMNS} FROM room_memberships WHERE room_id = ? AND user_id = ?"
        ))
        .bind(room_id.get())
        .bind(user_id.get())
        .fetch_optional(executor)
        .await?;

        row.map(Membership::try_from).transpose()
    }

    /// All memberships of a room, in join order.
    #[instrument(skip_all, fields(room_id = %room_id))]
    pub async fn list_for_room(
        pool: &SqlitePool,
        room_id: RoomId,
    ) -> Result<Vec<Membership>, EnclaveError> {
        let rows: Vec<MembershipRow> = sqlx::query_as(&format!(
            "SELECT {MEMBERSHIP_COLUMNS} FROM room_memberships WHERE room_id = ? ORDER BY id ASC"
        ))
        .bind(room_id.get())
        .fetch_all(pool)
        .await?;

        rows.into_iter().map(Membership::try_from).collect()
    }

    /// Apply a partial update. Returns `None` when no such membership exists.
    #[instrument(skip_all, fields(room_id = %room_id, user_id = %user_id))]
    pub async fn update(
        pool: &SqlitePool,
        room_id: RoomId,
        user_id: UserId,
        update: &UpdateMemberRequest,
    ) -> Result<Option<Membership>, EnclaveError> {
        let row: Option<MembershipRow> = sqlx::query_as(&format!(
            "UPDATE room_memberships SET \
                role = COALESCE(?, role), \
                can_post = COALESCE(?, can_post), \
                can_call = COALESCE(?, can_call), \
                updated_at = ? \
             WHERE room_id = ? AND user_id = ? RETURNING {MEMBERSHIP_COLUMNS}"
        ))
        .bind(update.role.map(|role| role.as_str()))
        .bind(update.can_post)
        .bind(update.can_call)
        .bind(Utc::now())
        .bind(room_id.get())
        .bind(user_id.get())
        .fetch_optional(pool)
        .await?;

        row.map(Membership::try_from).transpose()
    }

    /// Remove a membership.
    #[instrument(skip_all, fields(room_id = %room_id, user_id = %user_id))]
    pub async fn delete(
        pool: &SqlitePool,
        room_id: RoomId,
        user_id: UserId,
    ) -> Result<bool, EnclaveError> {
        let result = sqlx::query("DELETE FROM room_memberships WHERE room_id = ? AND user_id = ?")
            .bind(room_id.get())
            .bind(user_id.get())
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[derive(Debug, sqlx::FromRow)]
struct MembershipRow {
    id: i64,
    room_id: i64,
    user_id: i64,
    role: String,
    can_post: bool,
    can_call: bool,
    joined_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<MembershipRow> for Membership {
    type Error = EnclaveError;

    fn try_from(row: MembershipRow) -> Result<Self, Self::Error> {
        let role = Role::parse(&row.role).ok_or_else(|| {
            EnclaveError::Database(format!("unknown membership role '{}'", row.role))
        })?;

        Ok(Membership {
            id: row.id,
            room_id: RoomId(row.room_id),
            user_id: UserId(row.user_id),
            role,
            can_post: row.can_post,
            can_call: row.can_call,
            joined_at: row.joined_at,
            updated_at: row.updated_at,
        })
    }
}
