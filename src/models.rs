use serde::{Deserialize, Serialize};

/// Max entries kept in `HeatFunction::top_editors`.
pub const MAX_TOP_EDITORS: usize = 10;
/// Max entries kept in `PresenceFunction::users`.
pub const MAX_PRESENCE_USERS: usize = 50;

/// One accepted `edit:push`, persisted verbatim and replayed on restart.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredEditEvent {
    pub server_ts: i64,
    pub repo_id: String,
    pub file_path: String,
    pub function_id: String,
    pub anchor_line: i64,
    pub user_id: String,
    pub display_name: String,
    pub emoji: String,
}

/// One user's most recent edit to a function, kept in `HeatFunction::top_editors`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeatEditor {
    pub user_id: String,
    pub display_name: String,
    pub emoji: String,
    pub last_edit_at: i64,
}

/// Aggregated heat for a single function within a room.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HeatFunction {
    pub anchor_line: i64,
    pub last_edit_at: i64,
    pub top_editors: Vec<HeatEditor>,
}

/// One connection's live cursor within a room, keyed by `connection_id`.
#[derive(Debug, Clone, PartialEq)]
pub struct SocketPresence {
    pub user_id: String,
    pub display_name: String,
    pub emoji: String,
    pub function_id: String,
    pub anchor_line: i64,
    pub last_seen_at: i64,
}

/// Per-user presence fields carried on the wire by `presence:set`, before the
/// aggregator assigns `last_seen_at` and a `connection_id`.
#[derive(Debug, Clone)]
pub struct PresenceUpdate {
    pub user_id: String,
    pub display_name: String,
    pub emoji: String,
    pub function_id: String,
    pub anchor_line: i64,
}

/// One user's aggregated position within a function, as broadcast to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresenceUser {
    pub user_id: String,
    pub display_name: String,
    pub emoji: String,
    pub last_seen_at: i64,
}

/// Aggregated presence for a single function within a room.
#[derive(Debug, Clone, Default)]
pub struct PresenceFunction {
    pub anchor_line: i64,
    pub users: Vec<PresenceUser>,
}

/// Identity carried by the handshake frame.
#[derive(Debug, Clone, Deserialize)]
pub struct HandshakePayload {
    pub token: String,
    #[serde(rename = "clientProtocolVersion")]
    pub client_protocol_version: String,
    #[serde(rename = "userId")]
    pub user_id: String,
    #[serde(rename = "displayName")]
    pub display_name: String,
    pub emoji: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerHello {
    pub server_protocol_version: String,
    pub min_client_protocol_version: String,
    pub server_retention_days: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerIncompatible {
    pub server_protocol_version: String,
    pub min_client_protocol_version: String,
    pub message: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomRef {
    pub hash_version: String,
    pub repo_id: String,
    pub file_path: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditPushPayload {
    pub hash_version: String,
    pub repo_id: String,
    pub file_path: String,
    pub function_id: String,
    pub anchor_line: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinAck {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionHeatEntry {
    pub function_id: String,
    pub anchor_line: i64,
    pub last_edit_at: i64,
    pub top_editors: Vec<HeatEditor>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionPresenceEntry {
    pub function_id: String,
    pub anchor_line: i64,
    pub users: Vec<PresenceUser>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSnapshot {
    pub hash_version: String,
    pub repo_id: String,
    pub file_path: String,
    pub functions: Vec<FunctionHeatEntry>,
    pub presence: Vec<FunctionPresenceEntry>,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeltaUpdates {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub heat: Vec<FunctionHeatEntry>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub presence: Vec<FunctionPresenceEntry>,
}

impl DeltaUpdates {
    pub fn is_empty(&self) -> bool {
        self.heat.is_empty() && self.presence.is_empty()
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileDelta {
    pub hash_version: String,
    pub repo_id: String,
    pub file_path: String,
    pub updates: DeltaUpdates,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepoHeatRequest {
    pub hash_version: String,
    pub repo_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RepoHeatResponse {
    pub files: std::collections::HashMap<String, i64>,
}
