use crate::common::{connect, edit_push, handshake, hex64, join_room, recv_json, send_json, spawn_server};

#[tokio::test]
async fn repo_heat_excludes_the_requesting_users_own_edits() {
    let server = spawn_server().await;
    let repo = hex64('a');
    let function = hex64('f');

    let mut alice = connect(&server).await;
    handshake(&mut alice, &server, "alice", "Alice", "🔥").await;
    join_room(&mut alice, &repo, "src/lib.rs").await;
    recv_json(&mut alice).await;

    edit_push(&mut alice, &repo, "src/lib.rs", &function, 7).await;
    recv_json(&mut alice).await; // alice's own file:delta

    send_json(
        &mut alice,
        serde_json::json!({
            "type": "repo:heat",
            "hashVersion": lineheat_server::config::HASH_VERSION,
            "repoId": repo,
        }),
    )
    .await;

    let reply = recv_json(&mut alice).await;
    assert_eq!(reply["type"], "repo:heat");
    let files = reply["files"].as_object().unwrap();
    assert!(files.is_empty(), "a user's own edits don't count toward their own repo:heat");
}

#[tokio::test]
async fn repo_heat_reports_other_users_recent_files() {
    let server = spawn_server().await;
    let repo = hex64('a');
    let function = hex64('f');

    let mut alice = connect(&server).await;
    handshake(&mut alice, &server, "alice", "Alice", "🔥").await;
    join_room(&mut alice, &repo, "src/lib.rs").await;
    recv_json(&mut alice).await;
    edit_push(&mut alice, &repo, "src/lib.rs", &function, 7).await;
    recv_json(&mut alice).await;

    let mut bob = connect(&server).await;
    handshake(&mut bob, &server, "bob", "Bob", "🐝").await;

    send_json(
        &mut bob,
        serde_json::json!({
            "type": "repo:heat",
            "hashVersion": lineheat_server::config::HASH_VERSION,
            "repoId": repo,
        }),
    )
    .await;

    let reply = recv_json(&mut bob).await;
    let files = reply["files"].as_object().unwrap();
    assert_eq!(files.get("src/lib.rs").and_then(|v| v.as_i64()), Some(7));
}

#[tokio::test]
async fn a_malformed_repo_heat_request_still_gets_an_empty_reply() {
    let server = spawn_server().await;

    let mut alice = connect(&server).await;
    handshake(&mut alice, &server, "alice", "Alice", "🔥").await;

    send_json(
        &mut alice,
        serde_json::json!({
            "type": "repo:heat",
            "hashVersion": lineheat_server::config::HASH_VERSION,
            "repoId": "not-a-hex-digest",
        }),
    )
    .await;

    let reply = recv_json(&mut alice).await;
    assert_eq!(reply["type"], "repo:heat");
    assert!(reply["files"].as_object().unwrap().is_empty());
}
