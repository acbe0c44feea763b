use crate::common::{connect, handshake, hex64, join_room, recv_json, send_json, spawn_server};

#[tokio::test]
async fn presence_set_broadcasts_to_other_room_members() {
    let server = spawn_server().await;
    let repo = hex64('a');
    let function = hex64('f');

    let mut alice = connect(&server).await;
    handshake(&mut alice, &server, "alice", "Alice", "🔥").await;
    join_room(&mut alice, &repo, "src/lib.rs").await;
    recv_json(&mut alice).await;

    let mut bob = connect(&server).await;
    handshake(&mut bob, &server, "bob", "Bob", "🐝").await;
    join_room(&mut bob, &repo, "src/lib.rs").await;
    recv_json(&mut bob).await;

    send_json(
        &mut alice,
        serde_json::json!({
            "type": "presence:set",
            "hashVersion": lineheat_server::config::HASH_VERSION,
            "repoId": repo,
            "filePath": "src/lib.rs",
            "functionId": function,
            "anchorLine": 4,
        }),
    )
    .await;

    let delta = recv_json(&mut bob).await;
    assert_eq!(delta["type"], "file:delta");
    let presence = delta["updates"]["presence"].as_array().unwrap();
    assert_eq!(presence.len(), 1);
    let users = presence[0]["users"].as_array().unwrap();
    assert_eq!(users.len(), 1);
    assert_eq!(users[0]["userId"], "alice");
}

#[tokio::test]
async fn presence_clear_removes_the_user_from_the_next_delta() {
    let server = spawn_server().await;
    let repo = hex64('a');
    let function = hex64('f');

    let mut alice = connect(&server).await;
    handshake(&mut alice, &server, "alice", "Alice", "🔥").await;
    join_room(&mut alice, &repo, "src/lib.rs").await;
    recv_json(&mut alice).await;

    let mut bob = connect(&server).await;
    handshake(&mut bob, &server, "bob", "Bob", "🐝").await;
    join_room(&mut bob, &repo, "src/lib.rs").await;
    recv_json(&mut bob).await;

    send_json(
        &mut alice,
        serde_json::json!({
            "type": "presence:set",
            "hashVersion": lineheat_server::config::HASH_VERSION,
            "repoId": repo,
            "filePath": "src/lib.rs",
            "functionId": function,
            "anchorLine": 4,
        }),
    )
    .await;
    recv_json(&mut bob).await; // presence:set delta

    send_json(
        &mut alice,
        serde_json::json!({
            "type": "presence:clear",
            "hashVersion": lineheat_server::config::HASH_VERSION,
            "repoId": repo,
            "filePath": "src/lib.rs",
        }),
    )
    .await;

    let delta = recv_json(&mut bob).await;
    let presence = delta["updates"]["presence"].as_array().unwrap();
    // The function's presence entry drops to zero users once alice clears.
    assert!(presence.is_empty() || presence[0]["users"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn a_new_joiner_sees_existing_presence_in_its_snapshot() {
    let server = spawn_server().await;
    let repo = hex64('a');
    let function = hex64('f');

    let mut alice = connect(&server).await;
    handshake(&mut alice, &server, "alice", "Alice", "🔥").await;
    join_room(&mut alice, &repo, "src/lib.rs").await;
    recv_json(&mut alice).await;

    send_json(
        &mut alice,
        serde_json::json!({
            "type": "presence:set",
            "hashVersion": lineheat_server::config::HASH_VERSION,
            "repoId": repo,
            "filePath": "src/lib.rs",
            "functionId": function,
            "anchorLine": 4,
        }),
    )
    .await;

    let mut bob = connect(&server).await;
    handshake(&mut bob, &server, "bob", "Bob", "🐝").await;
    let ack = join_room(&mut bob, &repo, "src/lib.rs").await;
    assert_eq!(ack["ok"], true);

    let snapshot = recv_json(&mut bob).await;
    let presence = snapshot["presence"].as_array().unwrap();
    assert_eq!(presence.len(), 1);
    assert_eq!(presence[0]["functionId"], function);
    let users = presence[0]["users"].as_array().unwrap();
    assert_eq!(users[0]["userId"], "alice");
}
