use std::time::Duration;

use crate::common::{connect, edit_push, handshake, hex64, join_room, recv_json, spawn_server};

#[tokio::test]
async fn rapid_edits_to_the_same_function_coalesce_into_one_delta() {
    let server = spawn_server().await;
    let repo = hex64('a');
    let function = hex64('f');

    let mut alice = connect(&server).await;
    handshake(&mut alice, &server, "alice", "Alice", "🔥").await;
    join_room(&mut alice, &repo, "src/lib.rs").await;
    recv_json(&mut alice).await; // snapshot

    for anchor in [1, 2, 3] {
        edit_push(&mut alice, &repo, "src/lib.rs", &function, anchor).await;
    }

    let delta = recv_json(&mut alice).await;
    assert_eq!(delta["type"], "file:delta");
    let heat = delta["updates"]["heat"].as_array().unwrap();
    assert_eq!(heat.len(), 1, "three edits to the same function coalesce into one entry");
    assert_eq!(heat[0]["anchorLine"], 3, "the last anchor line always wins");

    // No second delta should follow once the coalesce window has closed.
    tokio::select! {
        frame = recv_json(&mut alice) => panic!("unexpected extra frame: {frame:?}"),
        _ = tokio::time::sleep(Duration::from_millis(350)) => {}
    }
}

#[tokio::test]
async fn edits_to_different_functions_in_the_same_window_both_appear() {
    let server = spawn_server().await;
    let repo = hex64('a');
    let function_a = hex64('1');
    let function_b = hex64('2');

    let mut alice = connect(&server).await;
    handshake(&mut alice, &server, "alice", "Alice", "🔥").await;
    join_room(&mut alice, &repo, "src/lib.rs").await;
    recv_json(&mut alice).await; // snapshot

    edit_push(&mut alice, &repo, "src/lib.rs", &function_a, 5).await;
    edit_push(&mut alice, &repo, "src/lib.rs", &function_b, 6).await;

    let delta = recv_json(&mut alice).await;
    let heat = delta["updates"]["heat"].as_array().unwrap();
    assert_eq!(heat.len(), 2);
}

#[tokio::test]
async fn edits_do_not_cross_rooms() {
    let server = spawn_server().await;
    let repo = hex64('a');
    let function = hex64('f');

    let mut alice = connect(&server).await;
    handshake(&mut alice, &server, "alice", "Alice", "🔥").await;
    join_room(&mut alice, &repo, "src/a.rs").await;
    recv_json(&mut alice).await;

    let mut bob = connect(&server).await;
    handshake(&mut bob, &server, "bob", "Bob", "🐝").await;
    join_room(&mut bob, &repo, "src/b.rs").await;
    recv_json(&mut bob).await;

    edit_push(&mut alice, &repo, "src/a.rs", &function, 1).await;

    // Prove bob's connection received nothing for src/a.rs: the next frame on
    // it is the snapshot for a brand new room it joins afterward.
    join_room(&mut bob, &repo, "src/c.rs").await;
    let next = recv_json(&mut bob).await;
    assert_eq!(next["type"], "room:snapshot");
    assert_eq!(next["filePath"], "src/c.rs");
}
