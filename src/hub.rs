use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, mpsc};
use tracing::warn;

use crate::config::Config;
use crate::db::EventStore;
use crate::error::StoreError;
use crate::heat::{HeatState, RoomKey};
use crate::models::{
    DeltaUpdates, EditPushPayload, FileDelta, FunctionHeatEntry, FunctionPresenceEntry, JoinAck,
    PresenceUpdate, RepoHeatResponse, RoomSnapshot, StoredEditEvent,
};
use crate::presence::{PresenceDelta, PresenceState};
use crate::protocol::ServerMessage;

/// Bound on a connection's outbound queue. Overflow closes the connection.
const OUTBOUND_QUEUE_CAPACITY: usize = 256;

/// A registered connection's means of receiving pushes and of being told to
/// shut down (used when its outbound queue overflows).
struct ConnectionHandle {
    outbound: mpsc::Sender<ServerMessage>,
    kill: mpsc::UnboundedSender<()>,
    rooms: HashSet<RoomKey>,
}

/// Coalescing accumulator and subscriber list for one room.
#[derive(Default)]
struct RoomSubscribers {
    members: HashSet<String>,
    pending_heat: HashMap<String, FunctionHeatEntry>,
    pending_presence: HashMap<String, FunctionPresenceEntry>,
    timer_armed: bool,
}

impl RoomSubscribers {
    fn is_idle(&self) -> bool {
        self.members.is_empty()
            && self.pending_heat.is_empty()
            && self.pending_presence.is_empty()
            && !self.timer_armed
    }
}

/// All mutable hub state, guarded by one lock: a single serialized command
/// queue for the whole hub rather than one lock per room (see DESIGN.md).
/// The lock is never held across Event Store I/O: `edit_push` persists
/// first, then takes this lock only for the in-memory apply + coalesce step.
struct HubInner {
    heat: HeatState,
    presence: PresenceState,
    rooms: HashMap<RoomKey, RoomSubscribers>,
    connections: HashMap<String, ConnectionHandle>,
}

impl HubInner {
    fn new(heat: HeatState) -> Self {
        HubInner {
            heat,
            presence: PresenceState::new(),
            rooms: HashMap::new(),
            connections: HashMap::new(),
        }
    }

    /// Push to one connection without blocking; overflow or a closed queue
    /// is treated as if the connection had disconnected.
    fn deliver(&mut self, conn_id: &str, message: ServerMessage) {
        let Some(handle) = self.connections.get(conn_id) else {
            return;
        };
        if handle.outbound.try_send(message).is_err() {
            warn!(conn_id, "outbound queue overflow, closing connection");
            let _ = handle.kill.send(());
            self.disconnect(conn_id);
        }
    }

    fn queue_heat(&mut self, room: &RoomKey, entry: FunctionHeatEntry) {
        let subs = self.rooms.entry(room.clone()).or_default();
        subs.pending_heat.insert(entry.function_id.clone(), entry);
    }

    fn queue_presence(&mut self, room: &RoomKey, entries: Vec<FunctionPresenceEntry>) {
        let subs = self.rooms.entry(room.clone()).or_default();
        for entry in entries {
            subs.pending_presence.insert(entry.function_id.clone(), entry);
        }
    }

    fn needs_timer(&mut self, room: &RoomKey) -> bool {
        let subs = self.rooms.entry(room.clone()).or_default();
        if subs.timer_armed {
            false
        } else {
            subs.timer_armed = true;
            true
        }
    }

    /// Remove a connection from every room it subscribed to, pruning rooms
    /// left with no subscribers and no pending coalesced work.
    fn disconnect(&mut self, conn_id: &str) {
        if let Some(handle) = self.connections.remove(conn_id) {
            for room in &handle.rooms {
                if let Some(subs) = self.rooms.get_mut(room) {
                    subs.members.remove(conn_id);
                }
            }
        }
        self.rooms.retain(|_, subs| !subs.is_idle());
    }
}

pub struct Hub {
    config: Config,
    store: Arc<EventStore>,
    inner: Mutex<HubInner>,
}

impl Hub {
    pub fn new(config: Config, store: Arc<EventStore>, heat: HeatState) -> Arc<Self> {
        Arc::new(Hub {
            config,
            store,
            inner: Mutex::new(HubInner::new(heat)),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Register a connection's outbound queue and kill switch. Call once,
    /// right after the handshake completes, before any `room:join`.
    pub async fn register_connection(
        &self,
        conn_id: &str,
    ) -> (mpsc::Receiver<ServerMessage>, mpsc::UnboundedReceiver<()>) {
        let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_QUEUE_CAPACITY);
        let (kill_tx, kill_rx) = mpsc::unbounded_channel();
        let mut inner = self.inner.lock().await;
        inner.connections.insert(
            conn_id.to_string(),
            ConnectionHandle {
                outbound: outbound_tx,
                kill: kill_tx,
                rooms: HashSet::new(),
            },
        );
        (outbound_rx, kill_rx)
    }

    /// `room:join`. Validation is the caller's responsibility; this always
    /// succeeds once called, registering the subscription and delivering
    /// the snapshot to the joining connection alone, before releasing the
    /// lock — guaranteeing no `file:delta` for this room can reach this
    /// connection ahead of its snapshot.
    pub async fn join_room(&self, conn_id: &str, room: &RoomKey, hash_version: &str) {
        let mut inner = self.inner.lock().await;

        let functions = inner
            .heat
            .room(room)
            .map(|functions| {
                functions
                    .iter()
                    .map(|(function_id, f)| FunctionHeatEntry {
                        function_id: function_id.clone(),
                        anchor_line: f.anchor_line,
                        last_edit_at: f.last_edit_at,
                        top_editors: f.top_editors.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default();
        let presence = inner.presence.snapshot(room);

        let snapshot = ServerMessage::RoomSnapshot(RoomSnapshot {
            hash_version: hash_version.to_string(),
            repo_id: room.0.clone(),
            file_path: room.1.clone(),
            functions,
            presence,
        });

        if let Some(handle) = inner.connections.get_mut(conn_id) {
            handle.rooms.insert(room.clone());
        }
        inner
            .rooms
            .entry(room.clone())
            .or_default()
            .members
            .insert(conn_id.to_string());

        inner.deliver(conn_id, snapshot);
    }

    pub fn join_ack(ok: bool, error: Option<String>) -> ServerMessage {
        ServerMessage::JoinAck(JoinAck { ok, error })
    }

    /// `room:leave`. No-op if the connection hadn't joined (caller checks).
    pub async fn leave_room(&self, conn_id: &str, room: &RoomKey) {
        let mut inner = self.inner.lock().await;
        if let Some(handle) = inner.connections.get_mut(conn_id) {
            handle.rooms.remove(room);
        }
        if let Some(subs) = inner.rooms.get_mut(room) {
            subs.members.remove(conn_id);
        }
        let delta = inner.presence.clear(conn_id, room);
        drop(inner);
        if let Some(delta) = delta {
            self.apply_presence_delta(delta).await;
        }
        self.prune_idle_room(room).await;
    }

    /// `edit:push`. Persists first (outside any room lock), then applies
    /// in-memory and queues the updated function for coalescing — even if
    /// persistence failed, so a store outage never blocks live broadcast.
    pub async fn edit_push(&self, user: &ConnectionIdentity, room: &RoomKey, payload: &EditPushPayload, now_ms: i64) {
        let event = StoredEditEvent {
            server_ts: now_ms,
            repo_id: payload.repo_id.clone(),
            file_path: payload.file_path.clone(),
            function_id: payload.function_id.clone(),
            anchor_line: payload.anchor_line,
            user_id: user.user_id.clone(),
            display_name: user.display_name.clone(),
            emoji: user.emoji.clone(),
        };

        if let Err(err) = self.store.insert(&event) {
            warn!(error = %err, "failed to persist edit event, continuing with in-memory effect only");
        }

        let mut inner = self.inner.lock().await;
        inner.heat.apply(&event);
        let entry = inner.heat.function(room, &payload.function_id).map(|f| FunctionHeatEntry {
            function_id: payload.function_id.clone(),
            anchor_line: f.anchor_line,
            last_edit_at: f.last_edit_at,
            top_editors: f.top_editors.clone(),
        });
        if let Some(entry) = entry {
            inner.queue_heat(room, entry);
        }
        let arm = inner.needs_timer(room);
        drop(inner);
        if arm {
            self.arm_coalesce_timer(room.clone());
        }
    }

    /// `presence:set`.
    pub async fn presence_set(&self, conn_id: &str, room: &RoomKey, update: PresenceUpdate, now_ms: i64) {
        let mut inner = self.inner.lock().await;
        let delta = inner.presence.set(conn_id, room, update, now_ms);
        drop(inner);
        if let Some(delta) = delta {
            self.apply_presence_delta(delta).await;
        }
    }

    /// `presence:clear`.
    pub async fn presence_clear(&self, conn_id: &str, room: &RoomKey) {
        let mut inner = self.inner.lock().await;
        let delta = inner.presence.clear(conn_id, room);
        drop(inner);
        if let Some(delta) = delta {
            self.apply_presence_delta(delta).await;
        }
    }

    /// `repo:heat` — answered synchronously from memory.
    pub async fn repo_heat(&self, requester: &str, repo_id: &str) -> RepoHeatResponse {
        let inner = self.inner.lock().await;
        RepoHeatResponse {
            files: inner.heat.repo_heat(repo_id, requester),
        }
    }

    /// Disconnect cleanup: presence removal across every room this
    /// connection participated in, plus subscription teardown.
    pub async fn disconnect(&self, conn_id: &str) {
        let mut inner = self.inner.lock().await;
        inner.disconnect(conn_id);
        let deltas = inner.presence.remove_connection(conn_id);
        drop(inner);
        for delta in deltas {
            self.apply_presence_delta(delta).await;
        }
    }

    async fn apply_presence_delta(&self, delta: PresenceDelta) {
        let mut inner = self.inner.lock().await;
        inner.queue_presence(&delta.room, delta.functions);
        let arm = inner.needs_timer(&delta.room);
        drop(inner);
        if arm {
            self.arm_coalesce_timer(delta.room);
        }
    }

    async fn prune_idle_room(&self, room: &RoomKey) {
        let mut inner = self.inner.lock().await;
        let idle = inner.rooms.get(room).map(|subs| subs.is_idle()).unwrap_or(false);
        if idle {
            inner.rooms.remove(room);
        }
    }

    /// Schedules a flush `COALESCE_INTERVAL_MS` after the first pending
    /// update since the last flush for this room.
    fn arm_coalesce_timer(self: &Arc<Self>, room: RoomKey) {
        let hub = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(crate::config::COALESCE_INTERVAL_MS)).await;
            hub.flush_room(&room).await;
        });
    }

    async fn flush_room(&self, room: &RoomKey) {
        let (message, targets) = {
            let mut inner = self.inner.lock().await;
            let Some(subs) = inner.rooms.get_mut(room) else {
                return;
            };
            subs.timer_armed = false;
            let updates = DeltaUpdates {
                heat: subs.pending_heat.drain().map(|(_, v)| v).collect(),
                presence: subs.pending_presence.drain().map(|(_, v)| v).collect(),
            };
            if updates.is_empty() {
                let idle = subs.is_idle();
                if idle {
                    inner.rooms.remove(room);
                }
                return;
            }
            let message = ServerMessage::FileDelta(FileDelta {
                hash_version: self.config.hash_version.clone(),
                repo_id: room.0.clone(),
                file_path: room.1.clone(),
                updates,
            });
            let targets: Vec<String> = subs.members.iter().cloned().collect();
            (message, targets)
        };

        let mut inner = self.inner.lock().await;
        for conn_id in targets {
            inner.deliver(&conn_id, message.clone());
        }
    }

    /// Periodic presence TTL sweep, run every `PRESENCE_SWEEP_INTERVAL_SECS`.
    pub async fn sweep_presence(&self, now_ms: i64) {
        let cutoff = now_ms - crate::config::PRESENCE_TTL_SECONDS * 1000;
        let deltas = {
            let mut inner = self.inner.lock().await;
            inner.presence.sweep_expired(cutoff)
        };
        for delta in deltas {
            self.apply_presence_delta(delta).await;
        }
    }

    /// Periodic retention sweep, run every `RETENTION_SWEEP_INTERVAL_SECS`:
    /// prune both the Event Store and Heat State by the configured retention.
    pub async fn sweep_retention(&self, now_ms: i64) -> Result<i64, StoreError> {
        let cutoff = now_ms - self.config.retention_days * 86_400_000;
        let deleted = self.store.delete_before(cutoff)?;
        let mut inner = self.inner.lock().await;
        inner.heat.prune(cutoff);
        Ok(deleted)
    }
}

/// Stable identity attached to a connection after a successful handshake.
#[derive(Debug, Clone)]
pub struct ConnectionIdentity {
    pub user_id: String,
    pub display_name: String,
    pub emoji: String,
}
