use serde::{Deserialize, Serialize};

use crate::models::{
    EditPushPayload, FileDelta, JoinAck, RepoHeatRequest, RepoHeatResponse, RoomRef, RoomSnapshot,
    ServerHello, ServerIncompatible,
};

/// Inbound frames, tagged by the wire's colon-separated message names.
/// Deserialized from one JSON text frame per message.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    #[serde(rename = "room:join")]
    RoomJoin(RoomRef),
    #[serde(rename = "room:leave")]
    RoomLeave(RoomRef),
    #[serde(rename = "edit:push")]
    EditPush(EditPushPayload),
    #[serde(rename = "presence:set")]
    PresenceSet(EditPushPayload),
    #[serde(rename = "presence:clear")]
    PresenceClear(RoomRef),
    #[serde(rename = "repo:heat")]
    RepoHeat(RepoHeatRequest),
}

/// Outbound frames. `JoinAck` answers `room:join` synchronously;
/// `RepoHeatReply` answers `repo:heat` synchronously; everything else is
/// pushed asynchronously to subscribed connections.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    #[serde(rename = "server:hello")]
    ServerHello(ServerHello),
    #[serde(rename = "server:incompatible")]
    ServerIncompatible(ServerIncompatible),
    #[serde(rename = "room:join:ack")]
    JoinAck(JoinAck),
    #[serde(rename = "room:snapshot")]
    RoomSnapshot(RoomSnapshot),
    #[serde(rename = "file:delta")]
    FileDelta(FileDelta),
    #[serde(rename = "repo:heat")]
    RepoHeatReply(RepoHeatResponse),
}
