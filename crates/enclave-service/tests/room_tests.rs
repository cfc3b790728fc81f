//! Room provisioning and membership integration tests.

use common::UserId;
use enclave_test_utils::{create_users, test_pool, TestEnclaveServer};
use serde_json::{json, Value};

async fn setup(names: &[&str]) -> Result<(TestEnclaveServer, Vec<UserId>), anyhow::Error> {
    let pool = test_pool().await?;
    let users = create_users(&pool, names).await?;
    let server = TestEnclaveServer::spawn(pool).await?;
    Ok((server, users))
}

fn user(users: &[UserId], index: usize) -> UserId {
    users.get(index).copied().unwrap_or(UserId(0))
}

async fn create_room(
    server: &TestEnclaveServer,
    owner: UserId,
    participants: &[UserId],
) -> Result<reqwest::Response, anyhow::Error> {
    Ok(server
        .client()
        .post(server.endpoint("/v1/rooms"))
        .header("X-User-ID", owner.to_string())
        .json(&json!({ "name": "general", "participant_ids": participants }))
        .send()
        .await?)
}

async fn member_roles(
    server: &TestEnclaveServer,
    caller: UserId,
    room_id: i64,
) -> Result<Vec<(i64, String)>, anyhow::Error> {
    let members: Vec<Value> = server
        .client()
        .get(server.endpoint(&format!("/v1/rooms/{room_id}/members")))
        .header("X-User-ID", caller.to_string())
        .send()
        .await?
        .json()
        .await?;

    Ok(members
        .iter()
        .map(|m| {
            (
                m["user_id"].as_i64().unwrap_or_default(),
                m["role"].as_str().unwrap_or_default().to_string(),
            )
        })
        .collect())
}

#[tokio::test]
async fn test_direct_room_makes_peer_admin() -> Result<(), anyhow::Error> {
    let (server, users) = setup(&["alice", "bob"]).await?;
    let (alice, bob) = (user(&users, 0), user(&users, 1));

    let response = create_room(&server, alice, &[bob]).await?;
    assert_eq!(response.status(), 201);

    let room: Value = response.json().await?;
    assert_eq!(room["is_direct"], true);
    assert_eq!(room["owner_id"], alice.get());

    let roles = member_roles(&server, bob, room["id"].as_i64().unwrap_or_default()).await?;
    assert_eq!(
        roles,
        vec![
            (alice.get(), "owner".to_string()),
            (bob.get(), "admin".to_string())
        ]
    );
    Ok(())
}

#[tokio::test]
async fn test_group_room_makes_participants_members() -> Result<(), anyhow::Error> {
    let (server, users) = setup(&["alice", "bob", "carol"]).await?;
    let (alice, bob, carol) = (user(&users, 0), user(&users, 1), user(&users, 2));

    let room: Value = create_room(&server, alice, &[alice, bob, carol])
        .await?
        .json()
        .await?;
    assert_eq!(room["is_direct"], false);

    let roles = member_roles(&server, alice, room["id"].as_i64().unwrap_or_default()).await?;
    assert_eq!(
        roles,
        vec![
            (alice.get(), "owner".to_string()),
            (bob.get(), "member".to_string()),
            (carol.get(), "member".to_string())
        ]
    );
    Ok(())
}

#[tokio::test]
async fn test_unknown_participant_leaves_no_room() -> Result<(), anyhow::Error> {
    let (server, users) = setup(&["alice", "bob"]).await?;
    let (alice, bob) = (user(&users, 0), user(&users, 1));

    let response = create_room(&server, alice, &[bob, UserId(9_999)]).await?;
    assert_eq!(response.status(), 409);

    let rooms: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM rooms")
        .fetch_one(server.pool())
        .await?;
    let memberships: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM room_memberships")
        .fetch_one(server.pool())
        .await?;
    assert_eq!((rooms, memberships), (0, 0));
    Ok(())
}

#[tokio::test]
async fn test_duplicate_participant_conflicts() -> Result<(), anyhow::Error> {
    let (server, users) = setup(&["alice", "bob", "carol"]).await?;
    let (alice, bob, carol) = (user(&users, 0), user(&users, 1), user(&users, 2));

    let response = create_room(&server, alice, &[bob, carol, bob]).await?;
    assert_eq!(response.status(), 409);

    let body: Value = response.json().await?;
    assert_eq!(body["error"]["code"], "CONFLICT");
    Ok(())
}

#[tokio::test]
async fn test_identity_is_required() -> Result<(), anyhow::Error> {
    let (server, _) = setup(&["alice"]).await?;

    for header in [None, Some("abc"), Some("0"), Some("-3")] {
        let mut request = server
            .client()
            .post(server.endpoint("/v1/rooms"))
            .json(&json!({ "name": "general" }));
        if let Some(value) = header {
            request = request.header("X-User-ID", value);
        }
        let response = request.send().await?;
        assert_eq!(response.status(), 401, "header {header:?}");

        let body: Value = response.json().await?;
        assert_eq!(body["error"]["code"], "UNAUTHORIZED");
    }
    Ok(())
}

#[tokio::test]
async fn test_invalid_body_is_bad_request() -> Result<(), anyhow::Error> {
    let (server, users) = setup(&["alice"]).await?;

    let response = server
        .client()
        .post(server.endpoint("/v1/rooms"))
        .header("X-User-ID", user(&users, 0).to_string())
        .header("content-type", "application/json")
        .body("{\"name\":")
        .send()
        .await?;
    assert_eq!(response.status(), 400);

    let blank = server
        .client()
        .post(server.endpoint("/v1/rooms"))
        .header("X-User-ID", user(&users, 0).to_string())
        .json(&json!({ "name": "   " }))
        .send()
        .await?;
    assert_eq!(blank.status(), 400);
    Ok(())
}

#[tokio::test]
async fn test_room_listing_and_visibility() -> Result<(), anyhow::Error> {
    let (server, users) = setup(&["alice", "bob", "mallory"]).await?;
    let (alice, bob, mallory) = (user(&users, 0), user(&users, 1), user(&users, 2));

    let first: Value = create_room(&server, alice, &[bob]).await?.json().await?;
    let second: Value = create_room(&server, alice, &[]).await?.json().await?;

    let listed: Vec<Value> = server
        .client()
        .get(server.endpoint("/v1/rooms"))
        .header("X-User-ID", alice.to_string())
        .send()
        .await?
        .json()
        .await?;
    let ids: Vec<&Value> = listed.iter().map(|room| &room["id"]).collect();
    assert_eq!(ids, vec![&first["id"], &second["id"]]);

    let bobs: Vec<Value> = server
        .client()
        .get(server.endpoint("/v1/rooms"))
        .header("X-User-ID", bob.to_string())
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(bobs.len(), 1);

    let outsider = server
        .client()
        .get(server.endpoint(&format!("/v1/rooms/{}", first["id"])))
        .header("X-User-ID", mallory.to_string())
        .send()
        .await?;
    assert_eq!(outsider.status(), 403);
    Ok(())
}

#[tokio::test]
async fn test_room_update_and_delete_permissions() -> Result<(), anyhow::Error> {
    let (server, users) = setup(&["alice", "bob", "carol"]).await?;
    let (alice, bob, carol) = (user(&users, 0), user(&users, 1), user(&users, 2));

    let room: Value = create_room(&server, alice, &[bob, carol]).await?.json().await?;
    let room_url = server.endpoint(&format!("/v1/rooms/{}", room["id"]));

    let by_member = server
        .client()
        .patch(&room_url)
        .header("X-User-ID", bob.to_string())
        .json(&json!({ "name": "renamed" }))
        .send()
        .await?;
    assert_eq!(by_member.status(), 403);

    let by_owner = server
        .client()
        .patch(&room_url)
        .header("X-User-ID", alice.to_string())
        .json(&json!({ "name": "renamed", "is_private": true }))
        .send()
        .await?;
    assert_eq!(by_owner.status(), 200);
    let updated: Value = by_owner.json().await?;
    assert_eq!(updated["name"], "renamed");
    assert_eq!(updated["is_private"], true);

    let delete_by_member = server
        .client()
        .delete(&room_url)
        .header("X-User-ID", carol.to_string())
        .send()
        .await?;
    assert_eq!(delete_by_member.status(), 403);

    let delete_by_owner = server
        .client()
        .delete(&room_url)
        .header("X-User-ID", alice.to_string())
        .send()
        .await?;
    assert_eq!(delete_by_owner.status(), 200);

    let memberships: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM room_memberships")
        .fetch_one(server.pool())
        .await?;
    assert_eq!(memberships, 0);
    Ok(())
}

#[tokio::test]
async fn test_member_management() -> Result<(), anyhow::Error> {
    let (server, users) = setup(&["alice", "bob", "carol", "dave"]).await?;
    let (alice, bob, carol, dave) = (
        user(&users, 0),
        user(&users, 1),
        user(&users, 2),
        user(&users, 3),
    );

    let room: Value = create_room(&server, alice, &[bob, carol]).await?.json().await?;
    let room_id = room["id"].as_i64().unwrap_or_default();
    let members_url = server.endpoint(&format!("/v1/rooms/{room_id}/members"));

    // Plain members cannot add.
    let by_member = server
        .client()
        .post(&members_url)
        .header("X-User-ID", bob.to_string())
        .json(&json!({ "members": [{ "user_id": dave }] }))
        .send()
        .await?;
    assert_eq!(by_member.status(), 403);

    // Nobody can be granted owner.
    let as_owner = server
        .client()
        .post(&members_url)
        .header("X-User-ID", alice.to_string())
        .json(&json!({ "members": [{ "user_id": dave, "role": "owner" }] }))
        .send()
        .await?;
    assert_eq!(as_owner.status(), 400);

    // An existing member in the batch rolls back the whole batch.
    let mixed = server
        .client()
        .post(&members_url)
        .header("X-User-ID", alice.to_string())
        .json(&json!({ "members": [{ "user_id": dave }, { "user_id": bob }] }))
        .send()
        .await?;
    assert_eq!(mixed.status(), 409);
    assert_eq!(member_roles(&server, alice, room_id).await?.len(), 3);

    let added = server
        .client()
        .post(&members_url)
        .header("X-User-ID", alice.to_string())
        .json(&json!({ "members": [{ "user_id": dave, "can_post": false }] }))
        .send()
        .await?;
    assert_eq!(added.status(), 201);
    let added: Vec<Value> = added.json().await?;
    let [entry] = added.as_slice() else {
        return Err(anyhow::anyhow!("expected one added member, got {}", added.len()));
    };
    assert_eq!(entry["role"], "member");
    assert_eq!(entry["can_post"], false);

    // Promote carol, then carol (now admin) removes dave.
    let promoted = server
        .client()
        .patch(format!("{members_url}/{carol}"))
        .header("X-User-ID", alice.to_string())
        .json(&json!({ "role": "admin" }))
        .send()
        .await?;
    assert_eq!(promoted.status(), 200);

    let removed = server
        .client()
        .delete(format!("{members_url}/{dave}"))
        .header("X-User-ID", carol.to_string())
        .send()
        .await?;
    assert_eq!(removed.status(), 200);
    let removed: Value = removed.json().await?;
    assert_eq!(removed["deleted"], true);

    // Owner stays put.
    let remove_owner = server
        .client()
        .delete(format!("{members_url}/{alice}"))
        .header("X-User-ID", carol.to_string())
        .send()
        .await?;
    assert_eq!(remove_owner.status(), 400);

    let grant_owner = server
        .client()
        .patch(format!("{members_url}/{bob}"))
        .header("X-User-ID", alice.to_string())
        .json(&json!({ "role": "owner" }))
        .send()
        .await?;
    assert_eq!(grant_owner.status(), 400);

    let missing = server
        .client()
        .patch(format!("{members_url}/{dave}"))
        .header("X-User-ID", alice.to_string())
        .json(&json!({ "can_call": false }))
        .send()
        .await?;
    assert_eq!(missing.status(), 404);

    assert_eq!(
        member_roles(&server, alice, room_id).await?,
        vec![
            (alice.get(), "owner".to_string()),
            (bob.get(), "member".to_string()),
            (carol.get(), "admin".to_string())
        ]
    );
    Ok(())
}
