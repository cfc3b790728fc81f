//! Rooms repository.
//!
//! Inserts take any SQLite executor so the provisioner can run them inside
//! its transaction; reads and updates run against the pool.

use crate::errors::EnclaveError;
use crate::models::{NewRoom, Room, UpdateRoomRequest};
use chrono::{DateTime, Utc};
use common::{RoomId, UserId};
use sqlx::{Executor, Sqlite, SqlitePool};
use tracing::instrument;

const ROOM_COLUMNS: &str =
    "id, name, description, is_private, is_direct, owner_id, created_at, updated_at";

/// Repository for room rows.
pub struct RoomsRepository;

impl RoomsRepository {
    /// Insert a room and return the stored row.
    #[instrument(skip_all, fields(owner_id = %new.owner_id, is_direct = new.is_direct))]
    pub async fn insert<'e, E>(executor: E, new: &NewRoom) -> Result<Room, EnclaveError>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let now = Utc::now();
        let row: RoomRow = sqlx::query_as(&format!(
            "INSERT INTO rooms (name, description, is_private, is_direct, owner_id, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?) RETURNING {ROOM_COLUMNS}"
        ))
        .bind(new.name.as_str())
        .bind(new.description.as_str())
        .bind(new.is_private)
        .bind(new.is_direct)
        .bind(new.owner_id.get())
        .bind(now)
        .bind(now)
        .fetch_one(executor)
        .await?;

        Ok(row.into())
    }

    /// Find a room by id.
    #[instrument(skip_all, fields(room_id = %room_id))]
    pub async fn find_by_id(
        pool: &SqlitePool,
        room_id: RoomId,
    ) -> Result<Option<Room>, EnclaveError> {
        let row: Option<RoomRow> =
            sqlx::query_as(&format!("SELECT {ROOM_COLUMNS} FROM rooms WHERE id = ?"))
                .bind(room_id.get())
                .fetch_optional(pool)
                .await?;

        Ok(row.map(Room::from))
    }

    /// Rooms the user belongs to, oldest first.
    #[instrument(skip_all, fields(user_id = %user_id))]
    pub async fn list_for_user(
        pool: &SqlitePool,
        user_id: UserId,
    ) -> Result<Vec<Room>, EnclaveError> {
        let rows: Vec<RoomRow> = sqlx::query_as(
            r#"
            SELECT r.id, r.name, r.description, r.is_private, r.is_direct,
                   r.owner_id, r.created_at, r.updated_at
            FROM rooms r
            JOIN room_memberships m ON m.room_id = r.id
            WHERE m.user_id = ?
            ORDER BY r.created_at ASC, r.id ASC
            "#,
        )
        .bind(user_id.get())
        .fetch_all(pool)
        .await?;

        Ok(rows.into_iter().map(Room::from).collect())
    }

    /// Apply a partial update. Returns `None` when the room does not exist.
    #[instrument(skip_all, fields(room_id = %room_id))]
    pub async fn update(
        pool: &SqlitePool,
        room_id: RoomId,
        update: &UpdateRoomRequest,
    ) -> Result<Option<Room>, EnclaveError> {
        let row: Option<RoomRow> = sqlx::query_as(&format!(
            "UPDATE rooms SET \
                name = COALESCE(?, name), \
                description = COALESCE(?, description), \
                is_private = COALESCE(?, is_private), \
                updated_at = ? \
             WHERE id = ? RETURNING {ROOM_COLUMNS}"
        ))
        .bind(update.name.as_deref())
        .bind(update.description.as_deref())
        .bind(update.is_private)
        .bind(Utc::now())
        .bind(room_id.get())
        .fetch_optional(pool)
        .await?;

        Ok(row.map(Room::from))
    }

    /// Delete a room. Memberships and messages cascade.
    #[instrument(skip_all, fields(room_id = %room_id))]
    pub async fn delete(pool: &SqlitePool, room_id: RoomId) -> Result<bool, EnclaveError> {
        let result = sqlx::query("DELETE FROM rooms WHERE id = ?")
            .bind(room_id.get())
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[derive(Debug, sqlx::FromRow)]
struct RoomRow {
    id: i64,
    name: String,
    description: String,
    is_private: bool,
    is_direct: bool,
    owner_id: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<RoomRow> for Room {
    fn from(row: RoomRow) -> Self {
        Room {
            id: RoomId(row.id),
            name: row.name,
            description: row.description,
            is_private: row.is_private,
            is_direct: row.is_direct,
            owner_id: UserId(row.owner_id),
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}
