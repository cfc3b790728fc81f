//! Notifications repository.
//!
//! Every lookup is scoped to the recipient, so a caller can never read or
//! modify someone else's notification.

use crate::errors::EnclaveError;
use crate::models::{NewNotification, Notification, NotificationUpdate};
use chrono::{DateTime, Utc};
use common::{MessageId, NotificationId, RoomId, UserId};
use sqlx::{Executor, Sqlite, SqlitePool};
use tracing::instrument;

const NOTIFICATION_COLUMNS: &str = "id, recipient_id, room_id, message_id, kind, cipher_text, \
     encryption_scheme, read, created_at, updated_at";

/// Repository for notification rows.
pub struct NotificationsRepository;

impl NotificationsRepository {
    #[instrument(skip_all, fields(recipient_id = %new.recipient_id, kind = %new.kind))]
    pub async fn insert<'e, E>(
        executor: E,
        new: &NewNotification,
    ) -> Result<Notification, EnclaveError>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let now = Utc::now();
        let row: NotificationRow = sqlx::query_as(&format!(
            "INSERT INTO notifications (recipient_id, room_id, message_id, kind, cipher_text, encryption_scheme, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?) RETURNING {NOTIFICATION_COLUMNS}"
        ))
        .bind(new.recipient_id.get())
        .bind(new.room_id.map(RoomId::get))
        .bind(new.message_id.map(MessageId::get))
        .bind(new.kind.as_str())
        .bind(new.cipher_text.as_str())
        .bind(new.encryption_scheme.as_str())
        .bind(now)
        .bind(now)
        .fetch_one(executor)
        .await?;

        Ok(row.into())
    }

    #[instrument(skip_all, fields(notification_id = %id, recipient_id = %recipient_id))]
    pub async fn find_for_recipient(
        pool: &SqlitePool,
        id: NotificationId,
        recipient_id: UserId,
    ) -> Result<Option<Notification>, EnclaveError> {
        let row: Option<NotificationRow> = sqlx::query_as(&format!(
            "SELECT {NOTIFICATION_COLUMNS} FROM notifications WHERE id = ? AND recipient_id = ?"
        ))
        .bind(id.get())
        .bind(recipient_id.get())
        .fetch_optional(pool)
        .await?;

        Ok(row.map(Notification::from))
    }

    /// The recipient's notifications, newest first.
    #[instrument(skip_all, fields(recipient_id = %recipient_id, unread_only = unread_only))]
    pub async fn list_for_recipient(
        pool: &SqlitePool,
        recipient_id: UserId,
        unread_only: bool,
    ) -> Result<Vec<Notification>, EnclaveError> {
        let rows: Vec<NotificationRow> = sqlx::query_as(&format!(
            "SELECT {NOTIFICATION_COLUMNS} FROM notifications \
             WHERE recipient_id = ? AND (? = 0 OR read = 0) \
             ORDER BY created_at DESC, id DESC"
        ))
        .bind(recipient_id.get())
        .bind(unread_only)
        .fetch_all(pool)
        .await?;

        Ok(rows.into_iter().map(Notification::from).collect())
    }

    /// Apply a partial update and refresh `updated_at`.
    ///
    /// Returns `None` when the notification does not exist or belongs to
    /// another recipient.
    #[instrument(skip_all, fields(notification_id = %id, recipient_id = %recipient_id))]
    pub async fn update<'e, E>(
        executor: E,
        id: NotificationId,
        recipient_id: UserId,
        update: &NotificationUpdate,
    ) -> Result<Option<Notification>, EnclaveError>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let row: Option<NotificationRow> = sqlx::query_as(&format!(
            "UPDATE notifications SET \
                kind = COALESCE(?, kind), \
                cipher_text = COALESCE(?, cipher_text), \
                encryption_scheme = COALESCE(?, encryption_scheme), \
                read = COALESCE(?, read), \
                updated_at = ? \
             WHERE id = ? AND recipient_id = ? RETURNING {NOTIFICATION_COLUMNS}"
        ))
        .bind(update.kind.as_deref())
        .bind(update.cipher_text.as_deref())
        .bind(update.encryption_scheme.as_deref())
        .bind(update.read)
        .bind(Utc::now())
        .bind(id.get())
        .bind(recipient_id.get())
        .fetch_optional(executor)
        .await?;

        Ok(row.map(Notification::from))
    }

    #[instrument(skip_all, fields(notification_id = %id, recipient_id = %recipient_id))]
    pub async fn delete(
        pool: &SqlitePool,
        id: NotificationId,
        recipient_id: UserId,
    ) -> Result<bool, EnclaveError> {
        let result = sqlx::query("DELETE FROM notifications WHERE id = ? AND recipient_id = ?")
            .bind(id.get())
            .bind(recipient_id.get())
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[derive(Debug, sqlx::FromRow)]
struct NotificationRow {
    id: i64,
    recipient_id: i64,
    room_id: Option<i64>,
    message_id: Option<i64>,
    kind: String,
    cipher_text: String,
    encryption_scheme: String,
    read: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<NotificationRow> for Notification {
    fn from(row: NotificationRow) -> Self {
        Notification {
            id: NotificationId(row.id),
            recipient_id: UserId(row.recipient_id),
            room_id: row.room_id.map(RoomId),
            message_id: row.message_id.map(MessageId),
            kind: row.kind,
            cipher_text: row.cipher_text,
            encryption_scheme: row.encryption_scheme,
            read: row.read,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}
