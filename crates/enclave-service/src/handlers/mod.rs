//! HTTP request handlers for Enclave.

pub mod health;
pub mod media;
pub mod members;
pub mod messages;
pub mod metrics;
pub mod notifications;
pub mod rooms;
pub mod subscriptions;

pub use health::health_check;
pub use media::{create_media, delete_media, list_message_media};
pub use members::{add_members, list_members, remove_member, update_member};
pub use messages::{create_message, delete_message, list_messages, update_message};
pub use metrics::metrics_handler;
pub use notifications::{
    create_notification, delete_notification, get_notification, list_notifications,
    update_notification,
};
pub use rooms::{create_room, delete_room, get_room, list_rooms, update_room};
pub use subscriptions::subscribe_notifications;

use crate::errors::EnclaveError;
use serde::de::DeserializeOwned;

/// Deserialize a JSON request body.
///
/// Handlers take the raw body and parse it here so a malformed body is a 400
/// with the standard error shape instead of axum's 422.
pub(crate) fn parse_json<T: DeserializeOwned>(
    body: &[u8],
    target: &'static str,
) -> Result<T, EnclaveError> {
    serde_json::from_slice(body).map_err(|e| {
        tracing::debug!(target: "enclave.handlers", handler = target, error = %e, "Invalid request body");
        EnclaveError::BadRequest("Invalid request body".to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CreateRoomRequest;

    #[test]
    fn test_parse_json_accepts_valid_body() {
        let parsed: Result<CreateRoomRequest, _> =
            parse_json(br#"{"name":"general","participant_ids":[2,3]}"#, "test");
        assert!(
            matches!(parsed, Ok(ref req) if req.name == "general" && req.participant_ids.len() == 2)
        );
    }

    #[test]
    fn test_parse_json_rejects_malformed_body() {
        let parsed: Result<CreateRoomRequest, _> = parse_json(b"{not json", "test");
        assert!(matches!(parsed, Err(EnclaveError::BadRequest(_))));

        let missing: Result<CreateRoomRequest, _> = parse_json(b"{}", "test");
        assert!(matches!(missing, Err(EnclaveError::BadRequest(_))));
    }
}
