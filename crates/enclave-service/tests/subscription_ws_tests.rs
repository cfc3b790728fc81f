//! WebSocket subscription integration tests.
//!
//! A subscriber receives every notification addressed to it, in order, as
//! JSON text frames. Closing the socket removes its sink from the broker.

use common::UserId;
use enclave_test_utils::{create_users, test_pool, TestEnclaveServer};
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn connect(server: &TestEnclaveServer, user: Option<UserId>) -> Result<Socket, WsError> {
    let mut request = server
        .ws_endpoint("/v1/notifications/subscribe")
        .into_client_request()?;
    if let Some(user) = user {
        if let Ok(value) = HeaderValue::from_str(&user.to_string()) {
            request.headers_mut().insert("X-User-ID", value);
        }
    }
    let (socket, _response) = connect_async(request).await?;
    Ok(socket)
}

async fn notify_self(
    server: &TestEnclaveServer,
    user: UserId,
    kind: &str,
) -> Result<Value, anyhow::Error> {
    let response = server
        .client()
        .post(server.endpoint("/v1/notifications"))
        .header("X-User-ID", user.to_string())
        .json(&json!({ "recipient_id": user, "kind": kind, "cipher_text": "opaque" }))
        .send()
        .await?;
    assert_eq!(response.status(), 201);
    Ok(response.json().await?)
}

/// Next text frame, parsed.
async fn next_notification(socket: &mut Socket) -> Result<Value, anyhow::Error> {
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(5), socket.next())
            .await?
            .ok_or_else(|| anyhow::anyhow!("socket closed"))??;
        if let Message::Text(text) = frame {
            return Ok(serde_json::from_str(&text)?);
        }
    }
}

#[tokio::test]
async fn test_subscriber_receives_own_notifications_in_order() -> Result<(), anyhow::Error> {
    let pool = test_pool().await?;
    let users = create_users(&pool, &["alice"]).await?;
    let alice = users.first().copied().ok_or_else(|| anyhow::anyhow!("no user"))?;
    let server = TestEnclaveServer::spawn(pool).await?;

    let mut socket = connect(&server, Some(alice)).await?;
    server.wait_for_sinks(alice, 1).await?;

    let first = notify_self(&server, alice, "first").await?;
    let pushed = next_notification(&mut socket).await?;
    assert_eq!(pushed["id"], first["id"]);
    assert_eq!(pushed["kind"], "first");
    assert_eq!(pushed["cipher_text"], "opaque");

    let second = notify_self(&server, alice, "second").await?;
    let pushed = next_notification(&mut socket).await?;
    assert_eq!(pushed["id"], second["id"]);

    Ok(())
}

#[tokio::test]
async fn test_update_is_pushed() -> Result<(), anyhow::Error> {
    let pool = test_pool().await?;
    let users = create_users(&pool, &["alice"]).await?;
    let alice = users.first().copied().ok_or_else(|| anyhow::anyhow!("no user"))?;
    let server = TestEnclaveServer::spawn(pool).await?;

    let created = notify_self(&server, alice, "ping").await?;

    let mut socket = connect(&server, Some(alice)).await?;
    server.wait_for_sinks(alice, 1).await?;

    let response = server
        .client()
        .patch(server.endpoint(&format!("/v1/notifications/{}", created["id"])))
        .header("X-User-ID", alice.to_string())
        .json(&json!({ "read": true }))
        .send()
        .await?;
    assert_eq!(response.status(), 200);

    let pushed = next_notification(&mut socket).await?;
    assert_eq!(pushed["id"], created["id"]);
    assert_eq!(pushed["read"], true);
    Ok(())
}

#[tokio::test]
async fn test_subscribers_only_see_their_own() -> Result<(), anyhow::Error> {
    let pool = test_pool().await?;
    let users = create_users(&pool, &["alice", "bob"]).await?;
    let [alice, bob] = users.as_slice() else {
        return Err(anyhow::anyhow!("expected two users"));
    };
    let server = TestEnclaveServer::spawn(pool).await?;

    let mut alice_socket = connect(&server, Some(*alice)).await?;
    let mut bob_socket = connect(&server, Some(*bob)).await?;
    server.wait_for_sinks(*alice, 1).await?;
    server.wait_for_sinks(*bob, 1).await?;

    notify_self(&server, *bob, "for-bob").await?;
    notify_self(&server, *alice, "for-alice").await?;

    assert_eq!(next_notification(&mut alice_socket).await?["kind"], "for-alice");
    assert_eq!(next_notification(&mut bob_socket).await?["kind"], "for-bob");
    Ok(())
}

#[tokio::test]
async fn test_close_removes_sink() -> Result<(), anyhow::Error> {
    let pool = test_pool().await?;
    let users = create_users(&pool, &["alice"]).await?;
    let alice = users.first().copied().ok_or_else(|| anyhow::anyhow!("no user"))?;
    let server = TestEnclaveServer::spawn(pool).await?;

    let mut first = connect(&server, Some(alice)).await?;
    let _second = connect(&server, Some(alice)).await?;
    server.wait_for_sinks(alice, 2).await?;

    first.send(Message::Close(None)).await?;
    server.wait_for_sinks(alice, 1).await?;

    let stats = server.broker().stats();
    assert_eq!(stats.subscribes, 2);
    assert_eq!(stats.unsubscribes, 1);
    Ok(())
}

#[tokio::test]
async fn test_anonymous_upgrade_is_rejected() -> Result<(), anyhow::Error> {
    let server = TestEnclaveServer::spawn(test_pool().await?).await?;

    let result = connect(&server, None).await;
    assert!(
        matches!(&result, Err(WsError::Http(response)) if response.status() == 401),
        "expected 401, got {:?}",
        result.as_ref().err()
    );
    assert_eq!(server.broker().recipient_count(), 0);
    Ok(())
}

#[tokio::test]
async fn test_shutdown_closes_sessions() -> Result<(), anyhow::Error> {
    let pool = test_pool().await?;
    let users = create_users(&pool, &["alice"]).await?;
    let alice = users.first().copied().ok_or_else(|| anyhow::anyhow!("no user"))?;
    let server = TestEnclaveServer::spawn(pool).await?;

    let mut socket = connect(&server, Some(alice)).await?;
    server.wait_for_sinks(alice, 1).await?;

    server.state().shutdown.cancel();
    server.wait_for_sinks(alice, 0).await?;

    let frame = tokio::time::timeout(Duration::from_secs(5), socket.next()).await?;
    assert!(matches!(frame, Some(Ok(Message::Close(_))) | None | Some(Err(_))));
    Ok(())
}
