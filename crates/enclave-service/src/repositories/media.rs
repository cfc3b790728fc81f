//! Media repository.
//!
//! Rows carry metadata only. Blob upload and download happen out of band.

use crate::errors::EnclaveError;
use crate::models::{Media, NewMedia};
use chrono::{DateTime, Utc};
use common::{MediaId, MessageId, UserId};
use sqlx::SqlitePool;
use tracing::instrument;

const MEDIA_COLUMNS: &str = "id, uploader_id, message_id, filename, content_type, \
     storage_path, checksum, size_bytes, created_at";

/// Repository for media rows.
pub struct MediaRepository;

impl MediaRepository {
    #[instrument(skip_all, fields(uploader_id = %new.uploader_id))]
    pub async fn insert(pool: &SqlitePool, new: &NewMedia) -> Result<Media, EnclaveError> {
        let row: MediaRow = sqlx::query_as(&format!(
            "INSERT INTO media \
                (uploader_id, message_id, filename, content_type, storage_path, checksum, \
                 size_bytes, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?) RETURNING {MEDIA_COLUMNS}"
        ))
        .bind(new.uploader_id.get())
        .bind(new.message_id.map(MessageId::get))
        .bind(new.filename.as_str())
        .bind(new.content_type.as_str())
        .bind(new.storage_path.as_str())
        .bind(new.checksum.as_str())
        .bind(new.size_bytes)
        .bind(Utc::now())
        .fetch_one(pool)
        .await?;

        Ok(row.into())
    }

    #[instrument(skip_all, fields(media_id = %media_id))]
    pub async fn find_by_id(
        pool: &SqlitePool,
        media_id: MediaId,
    ) -> Result<Option<Media>, EnclaveError> {
        let row: Option<MediaRow> =
            sqlx::query_as(&format!("SELECT {MEDIA_COLUMNS} FROM media WHERE id = ?"))
                .bind(media_id.get())
                .fetch_optional(pool)
                .await?;

        Ok(row.map(Media::from))
    }

    /// Media attached to a message, oldest first.
    #[instrument(skip_all, fields(message_id = %message_id))]
    pub async fn list_for_message(
        pool: &SqlitePool,
        message_id: MessageId,
    ) -> Result<Vec<Media>, EnclaveError> {
        let rows: Vec<MediaRow> = sqlx::query_as(&format!(
            "SELECT {MEDIA_COLUMNS} FROM media WHERE message_id = ? ORDER BY created_at ASC, id ASC"
        ))
        .bind(message_id.get())
        .fetch_all(pool)
        .await?;

        Ok(rows.into_iter().map(Media::from).collect())
    }

    #[instrument(skip_all, fields(media_id = %media_id))]
    pub async fn delete(pool: &SqlitePool, media_id: MediaId) -> Result<bool, EnclaveError> {
        let result = sqlx::query("DELETE FROM media WHERE id = ?")
            .bind(media_id.get())
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[derive(Debug, sqlx::FromRow)]
struct MediaRow {
    id: i64,
    uploader_id: i64,
    message_id: Option<i64>,
    filename: String,
    content_type: String,
    storage_path: String,
    checksum: String,
    size_bytes: i64,
    created_at: DateTime<Utc>,
}

impl From<MediaRow> for Media {
    fn from(row: MediaRow) -> Self {
        Media {
            id: MediaId(row.id),
            uploader_id: UserId(row.uploader_id),
            message_id: row.message_id.map(MessageId),
            filename: row.filename,
            content_type: row.content_type,
            storage_path: row.storage_path,
            checksum: row.checksum,
            size_bytes: row.size_bytes,
            created_at: row.created_at,
        }
    }
}
