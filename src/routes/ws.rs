use std::collections::HashSet;
use std::sync::Arc;

use futures::{Sink, SinkExt, Stream, StreamExt};
use rocket::{State, get};
use rocket_ws::{Message, WebSocket};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::{Config, MIN_CLIENT_PROTOCOL_VERSION, SERVER_PROTOCOL_VERSION};
use crate::heat::RoomKey;
use crate::hub::{ConnectionIdentity, Hub};
use crate::models::{
    EditPushPayload, HandshakePayload, PresenceUpdate, RepoHeatResponse, RoomRef, ServerHello, ServerIncompatible,
};
use crate::protocol::{ClientMessage, ServerMessage};
use crate::validation::{is_valid_anchor_line, validate_function_id, validate_identity, validate_room_ref};

/// The single bidirectional connection endpoint. One task per connection
/// drives the handshake, then the read/dispatch/write loop.
#[get("/ws")]
pub fn ws_route(ws: WebSocket, hub: &State<Arc<Hub>>) -> rocket_ws::Channel<'static> {
    let hub = Arc::clone(hub.inner());
    ws.channel(move |stream| Box::pin(handle_connection(stream, hub)))
}

async fn handle_connection(
    stream: rocket_ws::stream::DuplexStream,
    hub: Arc<Hub>,
) -> Result<(), rocket_ws::result::Error> {
    let (mut sink, mut source) = stream.split();
    let config = hub.config().clone();

    let identity = match perform_handshake(&mut sink, &mut source, &config).await {
        Some(identity) => identity,
        None => return Ok(()),
    };

    let connection_id = Uuid::new_v4().to_string();
    info!(connection_id, user_id = %identity.user_id, "connection established");
    let (mut outbound_rx, mut kill_rx) = hub.register_connection(&connection_id).await;
    let mut joined: HashSet<RoomKey> = HashSet::new();

    loop {
        tokio::select! {
            _ = kill_rx.recv() => {
                break;
            }
            outbound = outbound_rx.recv() => {
                match outbound {
                    Some(message) => {
                        if send_message(&mut sink, &message).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
            inbound = source.next() => {
                match inbound {
                    Some(Ok(Message::Text(text))) => {
                        match dispatch(&hub, &connection_id, &identity, &config, &mut joined, &text).await {
                            Some(reply) if send_message(&mut sink, &reply).await.is_err() => break,
                            _ => {}
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(err)) => {
                        warn!(connection_id, error = %err, "websocket read error");
                        break;
                    }
                    _ => {}
                }
            }
        }
    }

    hub.disconnect(&connection_id).await;
    info!(connection_id, "connection closed");
    Ok(())
}

/// Reads the single handshake frame, validates the token/identity/protocol
/// version, and replies with `server:hello` or `server:incompatible`.
/// Returns `None` when the connection should simply be dropped.
async fn perform_handshake(
    sink: &mut (impl Sink<Message, Error = rocket_ws::result::Error> + Unpin),
    source: &mut (impl Stream<Item = Result<Message, rocket_ws::result::Error>> + Unpin),
    config: &Config,
) -> Option<ConnectionIdentity> {
    let text = match source.next().await {
        Some(Ok(Message::Text(text))) => text,
        _ => return None,
    };

    let payload: HandshakePayload = match serde_json::from_str(&text) {
        Ok(payload) => payload,
        Err(err) => {
            debug!(error = %err, "malformed handshake frame");
            close_with_reason(sink, "malformed handshake payload").await;
            return None;
        }
    };

    if payload.token != config.token {
        debug!("handshake rejected: token mismatch");
        close_with_reason(sink, "token mismatch").await;
        return None;
    }

    if let Err(reason) = validate_identity(&payload.user_id, &payload.display_name, &payload.emoji) {
        debug!(%reason, "handshake rejected: invalid identity");
        close_with_reason(sink, &reason).await;
        return None;
    }

    let client_version = match semver::Version::parse(&payload.client_protocol_version) {
        Ok(version) => version,
        Err(_) => return None,
    };
    let server_version = semver::Version::parse(SERVER_PROTOCOL_VERSION).expect("valid semver constant");
    let min_version = semver::Version::parse(MIN_CLIENT_PROTOCOL_VERSION).expect("valid semver constant");

    if client_version.major != server_version.major || client_version < min_version {
        let message = ServerMessage::ServerIncompatible(ServerIncompatible {
            server_protocol_version: SERVER_PROTOCOL_VERSION.to_string(),
            min_client_protocol_version: MIN_CLIENT_PROTOCOL_VERSION.to_string(),
            message: if client_version.major != server_version.major {
                format!(
                    "client protocol {} has a major version incompatible with server protocol {} (minimum supported {})",
                    payload.client_protocol_version, SERVER_PROTOCOL_VERSION, MIN_CLIENT_PROTOCOL_VERSION
                )
            } else {
                format!(
                    "client protocol {} is older than the minimum supported {}",
                    payload.client_protocol_version, MIN_CLIENT_PROTOCOL_VERSION
                )
            },
        });
        let _ = send_message(sink, &message).await;
        return None;
    }

    let hello = ServerMessage::ServerHello(ServerHello {
        server_protocol_version: SERVER_PROTOCOL_VERSION.to_string(),
        min_client_protocol_version: MIN_CLIENT_PROTOCOL_VERSION.to_string(),
        server_retention_days: config.retention_days,
    });
    send_message(sink, &hello).await.ok()?;

    Some(ConnectionIdentity {
        user_id: payload.user_id,
        display_name: payload.display_name,
        emoji: payload.emoji,
    })
}

async fn send_message(
    sink: &mut (impl Sink<Message, Error = rocket_ws::result::Error> + Unpin),
    message: &ServerMessage,
) -> Result<(), rocket_ws::result::Error> {
    let text = serde_json::to_string(message).expect("server messages always serialize");
    sink.send(Message::Text(text)).await
}

/// Closes the socket with a reason text matching the rejection rule:
/// `token`, `identity`, `display name`, or `emoji` prefixed messages.
async fn close_with_reason(sink: &mut (impl Sink<Message, Error = rocket_ws::result::Error> + Unpin), reason: &str) {
    let frame = rocket_ws::frame::CloseFrame {
        code: rocket_ws::frame::CloseCode::Policy,
        reason: reason.to_string().into(),
    };
    let _ = sink.send(Message::Close(Some(frame))).await;
}

/// Decodes one inbound frame and applies it, returning a synchronous reply
/// (`room:join:ack` or `repo:heat`) when the message type carries one.
/// Asynchronous broadcasts (`room:snapshot`, `file:delta`) are pushed by the
/// hub directly onto the connection's outbound queue.
async fn dispatch(
    hub: &Arc<Hub>,
    connection_id: &str,
    identity: &ConnectionIdentity,
    config: &Config,
    joined: &mut HashSet<RoomKey>,
    text: &str,
) -> Option<ServerMessage> {
    let message: ClientMessage = match serde_json::from_str(text) {
        Ok(message) => message,
        Err(err) => {
            debug!(connection_id, error = %err, "failed to decode client frame");
            return None;
        }
    };

    match message {
        ClientMessage::RoomJoin(room_ref) => Some(handle_join(hub, connection_id, config, joined, room_ref).await),
        ClientMessage::RoomLeave(room_ref) => {
            if validate_room_ref(&room_ref.hash_version, &room_ref.repo_id, &room_ref.file_path, &config.hash_version)
                .is_err()
            {
                return None;
            }
            let room = room_key(&room_ref);
            if joined.remove(&room) {
                hub.leave_room(connection_id, &room).await;
            }
            None
        }
        ClientMessage::EditPush(payload) => {
            handle_edit_push(hub, identity, config, joined, payload).await;
            None
        }
        ClientMessage::PresenceSet(payload) => {
            handle_presence_set(hub, connection_id, identity, config, joined, payload).await;
            None
        }
        ClientMessage::PresenceClear(room_ref) => {
            if validate_room_ref(&room_ref.hash_version, &room_ref.repo_id, &room_ref.file_path, &config.hash_version)
                .is_err()
            {
                return None;
            }
            let room = room_key(&room_ref);
            if joined.contains(&room) {
                hub.presence_clear(connection_id, &room).await;
            }
            None
        }
        ClientMessage::RepoHeat(request) => {
            if let Err(reason) = validate_room_ref(&request.hash_version, &request.repo_id, "x", &config.hash_version)
            {
                debug!(connection_id, %reason, "rejected repo:heat, replying with an empty result");
                return Some(ServerMessage::RepoHeatReply(RepoHeatResponse {
                    files: std::collections::HashMap::new(),
                }));
            }
            let response = hub.repo_heat(&identity.user_id, &request.repo_id).await;
            Some(ServerMessage::RepoHeatReply(response))
        }
    }
}

async fn handle_join(
    hub: &Arc<Hub>,
    connection_id: &str,
    config: &Config,
    joined: &mut HashSet<RoomKey>,
    room_ref: RoomRef,
) -> ServerMessage {
    if let Err(reason) = validate_room_ref(
        &room_ref.hash_version,
        &room_ref.repo_id,
        &room_ref.file_path,
        &config.hash_version,
    ) {
        return Hub::join_ack(false, Some(reason));
    }

    let room = room_key(&room_ref);
    joined.insert(room.clone());
    hub.join_room(connection_id, &room, &room_ref.hash_version).await;
    Hub::join_ack(true, None)
}

async fn handle_edit_push(
    hub: &Arc<Hub>,
    identity: &ConnectionIdentity,
    config: &Config,
    joined: &HashSet<RoomKey>,
    payload: EditPushPayload,
) {
    let room = (payload.repo_id.clone(), payload.file_path.clone());
    if !joined.contains(&room) {
        return;
    }
    if validate_room_ref(&payload.hash_version, &payload.repo_id, &payload.file_path, &config.hash_version).is_err() {
        return;
    }
    if validate_function_id(&payload.function_id).is_err() || !is_valid_anchor_line(payload.anchor_line) {
        return;
    }
    let now_ms = chrono::Utc::now().timestamp_millis();
    hub.edit_push(identity, &room, &payload, now_ms).await;
}

async fn handle_presence_set(
    hub: &Arc<Hub>,
    connection_id: &str,
    identity: &ConnectionIdentity,
    config: &Config,
    joined: &HashSet<RoomKey>,
    payload: EditPushPayload,
) {
    let room = (payload.repo_id.clone(), payload.file_path.clone());
    if !joined.contains(&room) {
        return;
    }
    if validate_room_ref(&payload.hash_version, &payload.repo_id, &payload.file_path, &config.hash_version).is_err() {
        return;
    }
    if validate_function_id(&payload.function_id).is_err() || !is_valid_anchor_line(payload.anchor_line) {
        return;
    }
    let update = PresenceUpdate {
        user_id: identity.user_id.clone(),
        display_name: identity.display_name.clone(),
        emoji: identity.emoji.clone(),
        function_id: payload.function_id,
        anchor_line: payload.anchor_line,
    };
    let now_ms = chrono::Utc::now().timestamp_millis();
    hub.presence_set(connection_id, &room, update, now_ms).await;
}

fn room_key(room_ref: &RoomRef) -> RoomKey {
    (room_ref.repo_id.clone(), room_ref.file_path.clone())
}
