//! Repository layer for Enclave.
//!
//! The access guard, room provisioner and notification service depend only
//! on the [`Storage`] trait; [`SqliteStorage`] is the production
//! implementation and [`mock::MockStorage`] backs unit tests. The remaining
//! per-table queries live on the repository structs and are called with the
//! pool directly by handlers.

pub mod media;
pub mod memberships;
pub mod messages;
pub mod mock;
pub mod notifications;
pub mod rooms;

pub use media::MediaRepository;
pub use memberships::MembershipsRepository;
pub use messages::MessagesRepository;
pub use notifications::NotificationsRepository;
pub use rooms::RoomsRepository;

use crate::errors::EnclaveError;
use crate::models::{
    Membership, NewMembership, NewNotification, NewRoom, Notification, NotificationUpdate, Room,
};
use async_trait::async_trait;
use common::{MessageId, NotificationId, RoomId, UserId};
use sqlx::{Sqlite, SqlitePool, Transaction};

/// Storage operations the core services need.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Membership for a (room, user) pair, if any.
    async fn find_membership(
        &self,
        room_id: RoomId,
        user_id: UserId,
    ) -> Result<Option<Membership>, EnclaveError>;

    /// Start a transaction.
    async fn begin(&self) -> Result<Box<dyn StorageTransaction>, EnclaveError>;

    async fn insert_notification(
        &self,
        new: NewNotification,
    ) -> Result<Notification, EnclaveError>;

    /// Update a notification owned by `recipient_id`. `None` if absent.
    async fn update_notification(
        &self,
        id: NotificationId,
        recipient_id: UserId,
        update: NotificationUpdate,
    ) -> Result<Option<Notification>, EnclaveError>;

    /// Room that holds a message, if the message exists.
    async fn find_message_room(&self, message_id: MessageId)
        -> Result<Option<RoomId>, EnclaveError>;
}

/// Writes that must land atomically.
///
/// Dropping a transaction without calling `commit` discards its writes.
#[async_trait]
pub trait StorageTransaction: Send {
    async fn insert_room(&mut self, new: &NewRoom) -> Result<Room, EnclaveError>;

    async fn insert_membership(&mut self, new: &NewMembership)
        -> Result<Membership, EnclaveError>;

    async fn commit(self: Box<Self>) -> Result<(), EnclaveError>;

    async fn rollback(self: Box<Self>) -> Result<(), EnclaveError>;
}

/// Roll back `tx` after `original` and return the error to surface.
///
/// When the rollback itself fails the returned error names both failures.
pub async fn abort(tx: Box<dyn StorageTransaction>, original: EnclaveError) -> EnclaveError {
    match tx.rollback().await {
        Ok(()) => original,
        Err(rollback_err) => {
            tracing::error!(
                target: "enclave.storage",
                error = %rollback_err,
                original_error = %original,
                "Transaction rollback failed"
            );
            EnclaveError::Database(format!(
                "rollback failed: {rollback_err} (original error: {original})"
            ))
        }
    }
}

/// SQLite-backed [`Storage`].
#[derive(Clone)]
pub struct SqliteStorage {
    pool: SqlitePool,
}

impl SqliteStorage {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl Storage for SqliteStorage {
    async fn find_membership(
        &self,
        room_id: RoomId,
        user_id: UserId,
    ) -> Result<Option<Membership>, EnclaveError> {
        MembershipsRepository::find(&self.pool, room_id, user_id).await
    }

    async fn begin(&self) -> Result<Box<dyn StorageTransaction>, EnclaveError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(SqliteTransaction { tx }))
    }

    async fn insert_notification(
        &self,
        new: NewNotification,
    ) -> Result<Notification, EnclaveError> {
        NotificationsRepository::insert(&self.pool, &new).await
    }

    async fn update_notification(
        &self,
        id: NotificationId,
        recipient_id: UserId,
        update: NotificationUpdate,
    ) -> Result<Option<Notification>, EnclaveError> {
        NotificationsRepository::update(&self.pool, id, recipient_id, &update).await
    }

    async fn find_message_room(
        &self,
        message_id: MessageId,
    ) -> Result<Option<RoomId>, EnclaveError> {
        MessagesRepository::find_room(&self.pool, message_id).await
    }
}

/// A pooled SQLite transaction.
struct SqliteTransaction {
    tx: Transaction<'static, Sqlite>,
}

#[async_trait]
impl StorageTransaction for SqliteTransaction {
    async fn insert_room(&mut self, new: &NewRoom) -> Result<Room, EnclaveError> {
        RoomsRepository::insert(&mut *self.tx, new).await
    }

    async fn insert_membership(
        &mut self,
        new: &NewMembership,
    ) -> Result<Membership, EnclaveError> {
        MembershipsRepository::insert(&mut *self.tx, new).await
    }

    async fn commit(self: Box<Self>) -> Result<(), EnclaveError> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), EnclaveError> {
        self.tx.rollback().await?;
        Ok(())
    }
}
