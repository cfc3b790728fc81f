//! Notification subscription over WebSocket.
//!
//! `GET /v1/notifications/subscribe` upgrades to a WebSocket and pushes each
//! notification addressed to the caller as one JSON text frame. Frames from
//! the client are ignored apart from close. The connection ends when the
//! client closes, the socket errors, or the server shuts down; in every case
//! the session is cancelled and its subscription removed.

use crate::context::RequestContext;
use crate::errors::EnclaveError;
use crate::models::Notification;
use crate::routes::AppState;
use crate::services::SubscriptionSession;
use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
    Extension,
};
use common::UserId;
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, instrument, warn};

/// Frames buffered between the session and the socket writer.
const OUTBOUND_CAPACITY: usize = 16;

/// Handler for GET /v1/notifications/subscribe
///
/// The caller must be identified before the upgrade; an anonymous request is
/// answered with 401 and never becomes a WebSocket.
#[instrument(skip_all, name = "enclave.subscriptions.upgrade")]
pub async fn subscribe_notifications(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<RequestContext>,
    ws: WebSocketUpgrade,
) -> Result<Response, EnclaveError> {
    let user_id = ctx.user_id()?;
    Ok(ws.on_upgrade(move |socket| serve_subscription(socket, state, user_id)))
}

async fn serve_subscription(socket: WebSocket, state: Arc<AppState>, user_id: UserId) {
    let (outbound_tx, mut outbound_rx) = mpsc::channel::<Arc<Notification>>(OUTBOUND_CAPACITY);
    let cancel_token = state.shutdown.child_token();
    let (handle, session_task) =
        SubscriptionSession::spawn(&state.broker, user_id, cancel_token.clone(), outbound_tx);

    debug!(
        target: "enclave.handlers.subscriptions",
        session_id = %handle.session_id(),
        user_id = %user_id,
        "WebSocket subscription opened"
    );

    let (mut sender, mut receiver) = socket.split();

    loop {
        tokio::select! {
            () = cancel_token.cancelled() => {
                let _ = sender.send(Message::Close(None)).await;
                break;
            }

            pushed = outbound_rx.recv() => {
                let Some(notification) = pushed else { break };
                let frame = match serde_json::to_string(notification.as_ref()) {
                    Ok(frame) => frame,
                    Err(e) => {
                        warn!(target: "enclave.handlers.subscriptions", error = %e, "Failed to encode notification");
                        continue;
                    }
                };
                if let Err(e) = sender.send(Message::Text(frame)).await {
                    debug!(target: "enclave.handlers.subscriptions", error = %e, "WebSocket send failed");
                    break;
                }
            }

            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!(target: "enclave.handlers.subscriptions", error = %e, "WebSocket receive failed");
                    break;
                }
            },
        }
    }

    handle.cancel();
    drop(outbound_rx);

    match session_task.await {
        Ok(exit) => debug!(
            target: "enclave.handlers.subscriptions",
            session_id = %handle.session_id(),
            reason = exit.as_str(),
            "WebSocket subscription closed"
        ),
        Err(e) => warn!(
            target: "enclave.handlers.subscriptions",
            session_id = %handle.session_id(),
            error = %e,
            "Subscription session task failed"
        ),
    }
}
