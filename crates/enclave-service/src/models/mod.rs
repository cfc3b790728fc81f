//! Enclave models.
//!
//! Domain records returned by storage, the inputs storage accepts, and the
//! request/response bodies of the HTTP API. Ciphertext fields are opaque
//! strings; the service never inspects them.

use chrono::{DateTime, Utc};
use common::{MediaId, MessageId, NotificationId, RoomId, UserId};
use serde::{Deserialize, Serialize};

/// Default content type for messages.
pub const DEFAULT_CONTENT_TYPE: &str = "text/plain";

/// Default encryption scheme for messages and notifications.
pub const DEFAULT_ENCRYPTION_SCHEME: &str = "signal";

/// Maximum room name length.
pub const MAX_ROOM_NAME_LENGTH: usize = 255;

/// Membership role within a room.
///
/// Ordered `Owner > Admin > Member`. Only the access guard compares roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Owner,
    Admin,
    Member,
}

impl Role {
    /// Returns the string representation stored in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Owner => "owner",
            Role::Admin => "admin",
            Role::Member => "member",
        }
    }

    /// Parses a stored role value.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "owner" => Some(Role::Owner),
            "admin" => Some(Role::Admin),
            "member" => Some(Role::Member),
            _ => None,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A room.
///
/// `is_direct` is derived once at creation and never recomputed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Room {
    pub id: RoomId,
    pub name: String,
    pub description: String,
    pub is_private: bool,
    pub is_direct: bool,
    pub owner_id: UserId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A user's membership in a room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Membership {
    pub id: i64,
    pub room_id: RoomId,
    pub user_id: UserId,
    pub role: Role,
    pub can_post: bool,
    pub can_call: bool,
    pub joined_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// An encrypted message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub room_id: RoomId,
    pub sender_id: UserId,
    pub cipher_text: String,
    pub content_type: String,
    pub encryption_scheme: String,
    pub edited: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A durable notification record.
///
/// `recipient_id` is fixed at creation; the broker routes on it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: NotificationId,
    pub recipient_id: UserId,
    pub room_id: Option<RoomId>,
    pub message_id: Option<MessageId>,
    pub kind: String,
    pub cipher_text: String,
    pub encryption_scheme: String,
    pub read: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Metadata of an uploaded, client-encrypted blob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Media {
    pub id: MediaId,
    pub uploader_id: UserId,
    pub message_id: Option<MessageId>,
    pub filename: String,
    pub content_type: String,
    pub storage_path: String,
    pub checksum: String,
    pub size_bytes: i64,
    pub created_at: DateTime<Utc>,
}

// ============================================================================
// Storage inputs
// ============================================================================

/// Room insert.
#[derive(Debug, Clone)]
pub struct NewRoom {
    pub name: String,
    pub description: String,
    pub is_private: bool,
    pub is_direct: bool,
    pub owner_id: UserId,
}

/// Membership insert.
#[derive(Debug, Clone)]
pub struct NewMembership {
    pub room_id: RoomId,
    pub user_id: UserId,
    pub role: Role,
    pub can_post: bool,
    pub can_call: bool,
}

impl NewMembership {
    /// Membership with default permissions.
    pub fn with_role(room_id: RoomId, user_id: UserId, role: Role) -> Self {
        Self {
            room_id,
            user_id,
            role,
            can_post: true,
            can_call: true,
        }
    }
}

/// Message insert.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub room_id: RoomId,
    pub sender_id: UserId,
    pub cipher_text: String,
    pub content_type: String,
    pub encryption_scheme: String,
}

/// Media insert.
#[derive(Debug, Clone)]
pub struct NewMedia {
    pub uploader_id: UserId,
    pub message_id: Option<MessageId>,
    pub filename: String,
    pub content_type: String,
    pub storage_path: String,
    pub checksum: String,
    pub size_bytes: i64,
}

/// Notification insert.
#[derive(Debug, Clone)]
pub struct NewNotification {
    pub recipient_id: UserId,
    pub room_id: Option<RoomId>,
    pub message_id: Option<MessageId>,
    pub kind: String,
    pub cipher_text: String,
    pub encryption_scheme: String,
}

/// Partial notification update. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NotificationUpdate {
    pub kind: Option<String>,
    pub cipher_text: Option<String>,
    pub encryption_scheme: Option<String>,
    pub read: Option<bool>,
}

/// Partial room update.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateRoomRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub is_private: Option<bool>,
}

/// Partial membership update.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateMemberRequest {
    pub role: Option<Role>,
    pub can_post: Option<bool>,
    pub can_call: Option<bool>,
}

/// Partial message update. Any update marks the message edited.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateMessageRequest {
    pub cipher_text: Option<String>,
    pub content_type: Option<String>,
}

// ============================================================================
// API requests
// ============================================================================

/// Request body for `POST /v1/rooms`.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateRoomRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub is_private: bool,
    #[serde(default)]
    pub participant_ids: Vec<UserId>,
}

/// One entry of `POST /v1/rooms/:room_id/members`.
#[derive(Debug, Clone, Deserialize)]
pub struct AddMemberEntry {
    pub user_id: UserId,
    #[serde(default)]
    pub role: Option<Role>,
    #[serde(default)]
    pub can_post: Option<bool>,
    #[serde(default)]
    pub can_call: Option<bool>,
}

/// Request body for `POST /v1/rooms/:room_id/members`.
#[derive(Debug, Clone, Deserialize)]
pub struct AddMembersRequest {
    pub members: Vec<AddMemberEntry>,
}

/// Request body for `POST /v1/rooms/:room_id/messages`.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateMessageRequest {
    pub cipher_text: String,
    #[serde(default)]
    pub content_type: Option<String>,
    #[serde(default)]
    pub encryption_scheme: Option<String>,
}

/// Request body for `POST /v1/media`.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateMediaRequest {
    pub filename: String,
    pub content_type: String,
    pub storage_path: String,
    pub checksum: String,
    pub size_bytes: i64,
    #[serde(default)]
    pub message_id: Option<MessageId>,
}

impl CreateMediaRequest {
    /// Name of the first required field that is blank, if any.
    pub fn blank_field(&self) -> Option<&'static str> {
        [
            ("filename", &self.filename),
            ("content_type", &self.content_type),
            ("storage_path", &self.storage_path),
            ("checksum", &self.checksum),
        ]
        .into_iter()
        .find(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| name)
    }
}

/// Request body for `POST /v1/notifications`.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateNotificationRequest {
    pub recipient_id: UserId,
    pub kind: String,
    pub cipher_text: String,
    #[serde(default)]
    pub encryption_scheme: Option<String>,
    #[serde(default)]
    pub room_id: Option<RoomId>,
    #[serde(default)]
    pub message_id: Option<MessageId>,
}

/// Query string for `GET /v1/notifications`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListNotificationsQuery {
    #[serde(default)]
    pub unread_only: bool,
}

// ============================================================================
// API responses
// ============================================================================

/// Health check response.
///
/// Returned by the `/health` endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Service health status ("healthy" or "unhealthy").
    pub status: String,

    /// Instance identifier from configuration.
    pub instance_id: String,

    /// Database connectivity status.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
}

/// Response for deletions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeletedResponse {
    pub deleted: bool,
}
