//! Common types shared across Enclave components.

#![warn(clippy::pedantic)]

/// Module for entity identifier types
pub mod types;

pub use types::{MediaId, MessageId, NotificationId, RoomId, UserId};
