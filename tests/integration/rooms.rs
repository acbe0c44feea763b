use crate::common::{connect, edit_push, handshake, hex64, join_room, recv_json, spawn_server};

#[tokio::test]
async fn join_ack_reports_ok_and_a_snapshot_follows() {
    let server = spawn_server().await;
    let repo = hex64('a');

    let mut alice = connect(&server).await;
    handshake(&mut alice, &server, "alice", "Alice", "🔥").await;

    let ack = join_room(&mut alice, &repo, "src/lib.rs").await;
    assert_eq!(ack["type"], "room:join:ack");
    assert_eq!(ack["ok"], true);

    let snapshot = recv_json(&mut alice).await;
    assert_eq!(snapshot["type"], "room:snapshot");
    assert_eq!(snapshot["repoId"], repo);
    assert_eq!(snapshot["filePath"], "src/lib.rs");
    assert!(snapshot["functions"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn join_rejects_a_non_hex_repo_id() {
    let server = spawn_server().await;
    let mut alice = connect(&server).await;
    handshake(&mut alice, &server, "alice", "Alice", "🔥").await;

    let ack = join_room(&mut alice, "not-a-hex-digest", "src/lib.rs").await;
    assert_eq!(ack["type"], "room:join:ack");
    assert_eq!(ack["ok"], false);
    assert!(ack["error"].is_string());
}

#[tokio::test]
async fn a_connection_joining_after_an_edit_sees_it_in_its_snapshot_not_as_a_delta() {
    let server = spawn_server().await;
    let repo = hex64('a');
    let function = hex64('f');

    let mut alice = connect(&server).await;
    handshake(&mut alice, &server, "alice", "Alice", "🔥").await;
    join_room(&mut alice, &repo, "src/lib.rs").await;
    recv_json(&mut alice).await; // empty snapshot

    edit_push(&mut alice, &repo, "src/lib.rs", &function, 10).await;
    recv_json(&mut alice).await; // alice's own file:delta

    let mut bob = connect(&server).await;
    handshake(&mut bob, &server, "bob", "Bob", "🐝").await;
    let ack = join_room(&mut bob, &repo, "src/lib.rs").await;
    assert_eq!(ack["ok"], true);

    let snapshot = recv_json(&mut bob).await;
    assert_eq!(snapshot["type"], "room:snapshot");
    let functions = snapshot["functions"].as_array().unwrap();
    assert_eq!(functions.len(), 1);
    assert_eq!(functions[0]["functionId"], function);
    assert_eq!(functions[0]["anchorLine"], 10);
}

#[tokio::test]
async fn a_delta_raised_after_join_never_arrives_before_the_snapshot() {
    let server = spawn_server().await;
    let repo = hex64('a');
    let function = hex64('f');

    let mut alice = connect(&server).await;
    handshake(&mut alice, &server, "alice", "Alice", "🔥").await;
    join_room(&mut alice, &repo, "src/lib.rs").await;
    recv_json(&mut alice).await;

    let mut bob = connect(&server).await;
    handshake(&mut bob, &server, "bob", "Bob", "🐝").await;
    let ack = join_room(&mut bob, &repo, "src/lib.rs").await;
    assert_eq!(ack["ok"], true);

    // The very next frame bob receives must be its own snapshot, not a delta
    // raised by alice's edit below.
    let snapshot = recv_json(&mut bob).await;
    assert_eq!(snapshot["type"], "room:snapshot");

    edit_push(&mut alice, &repo, "src/lib.rs", &function, 3).await;
    let delta = recv_json(&mut bob).await;
    assert_eq!(delta["type"], "file:delta");
}

#[tokio::test]
async fn leaving_a_room_stops_further_deltas_for_it() {
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

    crate::common::send_json(
        &mut bob,
        serde_json::json!({
            "type": "room:leave",
            "hashVersion": lineheat_server::config::HASH_VERSION,
            "repoId": repo,
            "filePath": "src/lib.rs",
        }),
    )
    .await;

    edit_push(&mut alice, &repo, "src/lib.rs", &function, 9).await;
    let alice_delta = recv_json(&mut alice).await;
    assert_eq!(alice_delta["type"], "file:delta");

    // bob joins a second, unrelated room on the same connection; the next
    // frame it sees must be that room's own snapshot, never a stray delta
    // for the room it already left.
    let other_repo = hex64('b');
    join_room(&mut bob, &other_repo, "src/other.rs").await;
    let next = recv_json(&mut bob).await;
    assert_eq!(next["type"], "room:snapshot");
    assert_eq!(next["repoId"], other_repo);
}
