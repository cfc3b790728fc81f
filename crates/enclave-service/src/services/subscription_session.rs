//! `SubscriptionSession` - relays one broker subscription to one client.
//!
//! Each session:
//! - Owns exactly one broker [`Subscription`]
//! - Forwards every notification addressed to its recipient into an outward
//!   channel, in publish order
//! - Stops when its cancellation token fires, when the broker closes the sink,
//!   or when the outward receiver goes away
//!
//! # Lifecycle
//!
//! 1. Spawned by the WebSocket handler after the upgrade completes
//! 2. Runs until one of the stop conditions above
//! 3. Unsubscribes exactly once on every exit path, then returns the reason

use crate::models::Notification;
use crate::services::notification_broker::{NotificationBroker, Subscription};
use common::UserId;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Why a session stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionExit {
    /// The connection's cancellation token fired.
    Cancelled,
    /// The broker closed the sink.
    SinkClosed,
    /// The outward receiver was dropped.
    OutboundClosed,
}

impl SessionExit {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionExit::Cancelled => "cancelled",
            SessionExit::SinkClosed => "sink_closed",
            SessionExit::OutboundClosed => "outbound_closed",
        }
    }
}

/// Handle to a running session.
#[derive(Clone, Debug)]
pub struct SubscriptionSessionHandle {
    session_id: String,
    recipient: UserId,
    cancel_token: CancellationToken,
}

impl SubscriptionSessionHandle {
    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    #[must_use]
    pub fn recipient(&self) -> UserId {
        self.recipient
    }

    /// Stop the session.
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }
}

/// The relay task.
pub struct SubscriptionSession {
    session_id: String,
    recipient: UserId,
    subscription: Subscription,
    outbound: mpsc::Sender<Arc<Notification>>,
    cancel_token: CancellationToken,
    forwarded: u64,
}

impl SubscriptionSession {
    /// Subscribe `recipient` and spawn the relay.
    ///
    /// The subscription is registered before this returns, so anything
    /// published afterwards reaches the session.
    pub fn spawn(
        broker: &Arc<NotificationBroker>,
        recipient: UserId,
        cancel_token: CancellationToken,
        outbound: mpsc::Sender<Arc<Notification>>,
    ) -> (SubscriptionSessionHandle, JoinHandle<SessionExit>) {
        let session_id = Uuid::new_v4().to_string();
        let subscription = broker.subscribe(recipient);

        let session = Self {
            session_id: session_id.clone(),
            recipient,
            subscription,
            outbound,
            cancel_token: cancel_token.clone(),
            forwarded: 0,
        };

        let task_handle = tokio::spawn(session.run());

        let handle = SubscriptionSessionHandle {
            session_id,
            recipient,
            cancel_token,
        };

        (handle, task_handle)
    }

    #[instrument(
        skip_all,
        name = "enclave.session",
        fields(session_id = %self.session_id, recipient_id = %self.recipient)
    )]
    async fn run(mut self) -> SessionExit {
        debug!(target: "enclave.session", "Subscription session started");

        let exit = self.relay().await;

        // Every exit path funnels through here.
        self.subscription.unsubscribe();

        info!(
            target: "enclave.session",
            session_id = %self.session_id,
            recipient_id = %self.recipient,
            forwarded = self.forwarded,
            dropped = self.subscription.dropped(),
            reason = exit.as_str(),
            "Subscription session stopped"
        );

        exit
    }

    async fn relay(&mut self) -> SessionExit {
        loop {
            let notification = tokio::select! {
                biased;

                () = self.cancel_token.cancelled() => return SessionExit::Cancelled,

                () = self.outbound.closed() => return SessionExit::OutboundClosed,

                item = self.subscription.recv() => match item {
                    Some(notification) => notification,
                    None => return SessionExit::SinkClosed,
                },
            };

            if notification.recipient_id != self.recipient {
                warn!(
                    target: "enclave.session",
                    session_id = %self.session_id,
                    expected = %self.recipient,
                    actual = %notification.recipient_id,
                    "Skipping notification addressed to another recipient"
                );
                continue;
            }

            tokio::select! {
                biased;

                () = self.cancel_token.cancelled() => return SessionExit::Cancelled,

                sent = self.outbound.send(notification) => {
                    if sent.is_err() {
                        return SessionExit::OutboundClosed;
                    }
                    self.forwarded += 1;
                }
            }
        }
    }
}
