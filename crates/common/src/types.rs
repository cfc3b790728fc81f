//! Identifier types for Enclave entities.
//!
//! All identifiers are storage-assigned integers. Wrapping them in distinct
//! newtypes keeps a room id from being passed where a user id is expected.
//! Serialization is transparent, so `RoomId(7)` is `7` on the wire and in
//! path segments.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl $name {
            /// Returns the raw storage value.
            #[must_use]
            pub fn get(self) -> i64 {
                self.0
            }
        }

        impl From<i64> for $name {
            fn from(value: i64) -> Self {
                Self(value)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

entity_id!(
    /// Unique identifier for a user
    UserId
);

entity_id!(
    /// Unique identifier for a room
    RoomId
);

entity_id!(
    /// Unique identifier for a message
    MessageId
);

entity_id!(
    /// Unique identifier for a notification
    NotificationId
);

entity_id!(
    /// Unique identifier for an uploaded media record
    MediaId
);
