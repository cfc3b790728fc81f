//! Core services for Enclave.
//!
//! # Components
//!
//! - `access_guard` - Role checks over room memberships
//! - `notification_broker` - In-process fan-out of notifications to live sinks
//! - `subscription_session` - Relay task bridging one sink to one client
//! - `room_provisioner` - Transactional room creation
//! - `notifications` - Notification create/update with publish-after-commit

pub mod access_guard;
pub mod notification_broker;
pub mod notifications;
pub mod room_provisioner;
pub mod subscription_session;

pub use access_guard::AccessGuard;
pub use notification_broker::{NotificationBroker, PublishOutcome, Subscription};
pub use notifications::NotificationService;
pub use room_provisioner::{RoomProvisioner, RoomSpec};
pub use subscription_session::{SessionExit, SubscriptionSession, SubscriptionSessionHandle};
