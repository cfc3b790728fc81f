//! Messages repository.
//!
//! Ciphertext is stored and returned verbatim and never logged.

use crate::errors::EnclaveError;
use crate::models::{Message, NewMessage, UpdateMessageRequest};
use chrono::{DateTime, Utc};
use common::{MessageId, RoomId, UserId};
use sqlx::SqlitePool;
use tracing::instrument;

const MESSAGE_COLUMNS: &str = "id, room_id, sender_id, cipher_text, content_type, \
     encryption_scheme, edited, created_at, updated_at";

/// Repository for message rows.
pub struct MessagesRepository;

impl MessagesRepository {
    #[instrument(skip_all, fields(room_id = %new.room_id, sender_id = %new.sender_id))]
    pub async fn insert(pool: &SqlitePool, new: &NewMessage) -> Result<Message, EnclaveError> {
        let now = Utc::now();
        let row: MessageRow = sqlx::query_as(&format!(
            "INSERT INTO messages (room_id, sender_id, cipher_text, content_type, encryption_scheme, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?) RETURNING {MESSAGE_COLUMNS}"
        ))
        .bind(new.room_id.get())
        .bind(new.sender_id.get())
        .bind(new.cipher_text.as_str())
        .bind(new.content_type.as_str())
        .bind(new.encryption_scheme.as_str())
        .bind(now)
        .bind(now)
        .fetch_one(pool)
        .await?;

        Ok(row.into())
    }

    #[instrument(skip_all, fields(message_id = %message_id))]
    pub async fn find_by_id(
        pool: &SqlitePool,
        message_id: MessageId,
    ) -> Result<Option<Message>, EnclaveError> {
        let row: Option<MessageRow> =
            sqlx::query_as(&format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = ?"))
                .bind(message_id.get())
                .fetch_optional(pool)
                .await?;

        Ok(row.map(Message::from))
    }

    /// Room a message belongs to.
    #[instrument(skip_all, fields(message_id = %message_id))]
    pub async fn find_room(
        pool: &SqlitePool,
        message_id: MessageId,
    ) -> Result<Option<RoomId>, EnclaveError> {
        let room_id: Option<i64> = sqlx::query_scalar("SELECT room_id FROM messages WHERE id = ?")
            .bind(message_id.get())
            .fetch_optional(pool)
            .await?;

        Ok(room_id.map(RoomId))
    }

    /// Messages of a room, oldest first.
    #[instrument(skip_all, fields(room_id = %room_id))]
    pub async fn list_for_room(
        pool: &SqlitePool,
        room_id: RoomId,
    ) -> Result<Vec<Message>, EnclaveError> {
        let rows: Vec<MessageRow> = sqlx::query_as(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages WHERE room_id = ? ORDER BY created_at ASC, id ASC"
        ))
        .bind(room_id.get())
        .fetch_all(pool)
        .await?;

        Ok(rows.into_iter().map(Message::from).collect())
    }

    /// Edit a message and mark it edited.
    #[instrument(skip_all, fields(message_id = %message_id))]
    pub async fn update(
        pool: &SqlitePool,
        message_id: MessageId,
        update: &UpdateMessageRequest,
    ) -> Result<Option<Message>, EnclaveError> {
        let row: Option<MessageRow> = sqlx::query_as(&format!(
            "UPDATE messages SET \
                cipher_text = COALESCE(?, cipher_text), \
                content_type = COALESCE(?, content_type), \
                edited = 1, \
                updated_at = ? \
             WHERE id = ? RETURNING {MESSAGE_COLUMNS}"
        ))
        .bind(update.cipher_text.as_deref())
        .bind(update.content_type.as_deref())
        .bind(Utc::now())
        .bind(message_id.get())
        .fetch_optional(pool)
        .await?;

        Ok(row.map(Message::from))
    }

    #[instrument(skip_all, fields(message_id = %message_id))]
    pub async fn delete(pool: &SqlitePool, message_id: MessageId) -> Result<bool, EnclaveError> {
        let result = sqlx::query("DELETE FROM messages WHERE id = ?")
            .bind(message_id.get())
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[derive(Debug, sqlx::FromRow)]
struct MessageRow {
    id: i64,
    room_id: i64,
    sender_id: i64,
    cipher_text: String,
    content_type: String,
    encryption_scheme: String,
    edited: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<MessageRow> for Message {
    fn from(row: MessageRow) -> Self {
        Message {
            id: MessageId(row.id),
            room_id: RoomId(row.room_id),
            sender_id: UserId(row.sender_id),
            cipher_text: row.cipher_text,
            content_type: row.content_type,
            encryption_scheme: row.encryption_scheme,
            edited: row.edited,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}
