//! Notification creation and update.
//!
//! Both operations persist first and publish afterwards, so a client that
//! receives a push can always find the same record by listing.
//!
//! # Creation rules
//!
//! - A `message_id` pins the room: the message's room is used, an unknown
//!   message is `Forbidden`, and a different explicit `room_id` is rejected.
//! - With a room, the recipient must be a member. Notifying someone else
//!   requires admin-or-above; notifying yourself requires membership.
//! - Without a room, callers may only notify themselves.

use crate::errors::EnclaveError;
use crate::models::{
    CreateNotificationRequest, NewNotification, Notification, NotificationUpdate,
    DEFAULT_ENCRYPTION_SCHEME,
};
use crate::repositories::Storage;
use crate::services::access_guard::AccessGuard;
use crate::services::notification_broker::NotificationBroker;
use common::{NotificationId, RoomId, UserId};
use std::sync::Arc;
use tracing::instrument;

/// Creates and updates notifications, then publishes them.
#[derive(Clone)]
pub struct NotificationService {
    storage: Arc<dyn Storage>,
    guard: AccessGuard,
    broker: Arc<NotificationBroker>,
}

impl NotificationService {
    pub fn new(
        storage: Arc<dyn Storage>,
        guard: AccessGuard,
        broker: Arc<NotificationBroker>,
    ) -> Self {
        Self {
            storage,
            guard,
            broker,
        }
    }

    #[instrument(
        skip_all,
        name = "enclave.notifications.create",
        fields(caller_id = %caller, recipient_id = %request.recipient_id)
    )]
    pub async fn create(
        &self,
        caller: UserId,
        request: CreateNotificationRequest,
    ) -> Result<Notification, EnclaveError> {
        if request.kind.trim().is_empty() {
            return Err(EnclaveError::BadRequest("kind is required".to_string()));
        }
        if request.cipher_text.is_empty() {
            return Err(EnclaveError::BadRequest(
                "cipher_text is required".to_string(),
            ));
        }

        let room_id = self.resolve_room(&request).await?;
        self.authorize_create(caller, request.recipient_id, room_id)
            .await?;

        let new = NewNotification {
            recipient_id: request.recipient_id,
            room_id,
            message_id: request.message_id,
            kind: request.kind,
            cipher_text: request.cipher_text,
            encryption_scheme: request
                .encryption_scheme
                .filter(|scheme| !scheme.is_empty())
                .unwrap_or_else(|| DEFAULT_ENCRYPTION_SCHEME.to_string()),
        };

        let notification = self.storage.insert_notification(new).await?;
        self.broker.publish(notification.clone());

        tracing::info!(
            target: "enclave.notifications",
            notification_id = %notification.id,
            recipient_id = %notification.recipient_id,
            kind = %notification.kind,
            "Notification created"
        );

        Ok(notification)
    }

    /// Update a notification owned by `caller` and publish the new state.
    #[instrument(
        skip_all,
        name = "enclave.notifications.update",
        fields(caller_id = %caller, notification_id = %id)
    )]
    pub async fn update(
        &self,
        caller: UserId,
        id: NotificationId,
        update: NotificationUpdate,
    ) -> Result<Notification, EnclaveError> {
        if matches!(update.kind.as_deref(), Some(kind) if kind.trim().is_empty()) {
            return Err(EnclaveError::BadRequest("kind must not be empty".to_string()));
        }
        if matches!(update.cipher_text.as_deref(), Some("")) {
            return Err(EnclaveError::BadRequest(
                "cipher_text must not be empty".to_string(),
            ));
        }

        let notification = self
            .storage
            .update_notification(id, caller, update)
            .await?
            .ok_or_else(|| EnclaveError::NotFound("Notification not found".to_string()))?;

        self.broker.publish(notification.clone());
        Ok(notification)
    }

    async fn resolve_room(
        &self,
        request: &CreateNotificationRequest,
    ) -> Result<Option<RoomId>, EnclaveError> {
        let Some(message_id) = request.message_id else {
            return Ok(request.room_id);
        };

        let message_room = self
            .storage
            .find_message_room(message_id)
            .await?
            .ok_or(EnclaveError::Forbidden)?;

        match request.room_id {
            Some(explicit) if explicit != message_room => Err(EnclaveError::BadRequest(
                "message does not belong to provided room".to_string(),
            )),
            _ => Ok(Some(message_room)),
        }
    }

    async fn authorize_create(
        &self,
        caller: UserId,
        recipient: UserId,
        room_id: Option<RoomId>,
    ) -> Result<(), EnclaveError> {
        match room_id {
            Some(room_id) => {
                self.guard.require_member(room_id, recipient).await?;
                if recipient == caller {
                    self.guard.require_member(room_id, caller).await?;
                } else {
                    self.guard.require_admin(room_id, caller).await?;
                }
                Ok(())
            }
            None if recipient == caller => Ok(()),
            None => Err(EnclaveError::Forbidden),
        }
    }
}
