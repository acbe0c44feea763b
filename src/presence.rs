use std::collections::HashMap;

use crate::heat::RoomKey;
use crate::models::{FunctionPresenceEntry, MAX_PRESENCE_USERS, PresenceUpdate, PresenceUser};

/// A room-scoped presence delta to broadcast: one entry per affected
/// function, an empty `users` list signalling removal.
#[derive(Debug, Clone)]
pub struct PresenceDelta {
    pub room: RoomKey,
    pub functions: Vec<FunctionPresenceEntry>,
}

/// One connection's live record plus an insertion sequence used only to
/// break `last_seen_at` ties deterministically (ties broken by insertion
/// order).
#[derive(Debug, Clone)]
struct Entry {
    user_id: String,
    display_name: String,
    emoji: String,
    function_id: String,
    anchor_line: i64,
    last_seen_at: i64,
    seq: u64,
}

/// In-memory TTL'd map of live cursors, aggregated per `(room, functionId)`
/// on every mutation. Owns no lock of its own — the hub in `hub.rs`
/// serializes access.
#[derive(Debug, Default)]
pub struct PresenceState {
    rooms: HashMap<RoomKey, HashMap<String, Entry>>,
    conn_rooms: HashMap<String, std::collections::HashSet<RoomKey>>,
    previous: HashMap<RoomKey, HashMap<String, Vec<PresenceUser>>>,
    next_seq: u64,
}

impl PresenceState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(
        &mut self,
        connection_id: &str,
        room: &RoomKey,
        update: PresenceUpdate,
        now: i64,
    ) -> Option<PresenceDelta> {
        let seq = self.next_seq;
        self.next_seq += 1;

        let room_map = self.rooms.entry(room.clone()).or_default();
        room_map.insert(
            connection_id.to_string(),
            Entry {
                user_id: update.user_id,
                display_name: update.display_name,
                emoji: update.emoji,
                function_id: update.function_id,
                anchor_line: update.anchor_line,
                last_seen_at: now,
                seq,
            },
        );
        self.conn_rooms
            .entry(connection_id.to_string())
            .or_default()
            .insert(room.clone());

        self.recompute(room)
    }

    pub fn clear(&mut self, connection_id: &str, room: &RoomKey) -> Option<PresenceDelta> {
        if let Some(room_map) = self.rooms.get_mut(room) {
            room_map.remove(connection_id);
        }
        if let Some(set) = self.conn_rooms.get_mut(connection_id) {
            set.remove(room);
        }
        self.recompute(room)
    }

    /// Remove a connection's record across every room it participated in
    /// (called on disconnect).
    pub fn remove_connection(&mut self, connection_id: &str) -> Vec<PresenceDelta> {
        let rooms = self
            .conn_rooms
            .remove(connection_id)
            .unwrap_or_default();
        let mut deltas = Vec::new();
        for room in rooms {
            if let Some(room_map) = self.rooms.get_mut(&room) {
                room_map.remove(connection_id);
            }
            if let Some(delta) = self.recompute(&room) {
                deltas.push(delta);
            }
        }
        deltas
    }

    /// Remove every connection whose `last_seen_at` predates `cutoff_ts`
    /// (the TTL sweep, `PRESENCE_TTL_SECONDS`).
    pub fn sweep_expired(&mut self, cutoff_ts: i64) -> Vec<PresenceDelta> {
        let mut affected: Vec<RoomKey> = Vec::new();
        for (room, room_map) in self.rooms.iter_mut() {
            let before = room_map.len();
            room_map.retain(|_, entry| entry.last_seen_at >= cutoff_ts);
            if room_map.len() != before {
                affected.push(room.clone());
            }
        }
        // Keep conn_rooms consistent with expired entries.
        let rooms_ref = &self.rooms;
        for (conn_id, conn_room_set) in self.conn_rooms.iter_mut() {
            conn_room_set.retain(|room| {
                rooms_ref
                    .get(room)
                    .map(|m| m.contains_key(conn_id))
                    .unwrap_or(false)
            });
        }
        affected
            .into_iter()
            .filter_map(|room| self.recompute(&room))
            .collect()
    }

    /// Current aggregated presence for a room, for `room:snapshot` (no diff,
    /// the full current state).
    pub fn snapshot(&self, room: &RoomKey) -> Vec<FunctionPresenceEntry> {
        self.aggregate(room)
            .into_iter()
            .map(|(function_id, (anchor_line, users))| FunctionPresenceEntry {
                function_id,
                anchor_line,
                users,
            })
            .collect()
    }

    /// Per-user dedup by max `last_seen_at`, grouped by function, sorted
    /// and truncated.
    fn aggregate(&self, room: &RoomKey) -> HashMap<String, (i64, Vec<PresenceUser>)> {
        let Some(room_map) = self.rooms.get(room) else {
            return HashMap::new();
        };

        // Step 1: per userId, keep the entry with the max last_seen_at
        // (ties broken by insertion order, i.e. higher seq wins on equal ts).
        let mut by_user: HashMap<&str, &Entry> = HashMap::new();
        for entry in room_map.values() {
            match by_user.get(entry.user_id.as_str()) {
                Some(existing)
                    if existing.last_seen_at > entry.last_seen_at
                        || (existing.last_seen_at == entry.last_seen_at
                            && existing.seq >= entry.seq) => {}
                _ => {
                    by_user.insert(&entry.user_id, entry);
                }
            }
        }

        // Step 2: group by functionId.
        let mut by_function: HashMap<String, Vec<&Entry>> = HashMap::new();
        for entry in by_user.values() {
            by_function
                .entry(entry.function_id.clone())
                .or_default()
                .push(entry);
        }

        // Step 3: sort users within a function by last_seen_at desc, truncate.
        let mut out = HashMap::new();
        for (function_id, mut entries) in by_function {
            entries.sort_by(|a, b| b.last_seen_at.cmp(&a.last_seen_at).then(b.seq.cmp(&a.seq)));
            let anchor_line = entries[0].anchor_line;
            let users: Vec<PresenceUser> = entries
                .into_iter()
                .take(MAX_PRESENCE_USERS)
                .map(|e| PresenceUser {
                    user_id: e.user_id.clone(),
                    display_name: e.display_name.clone(),
                    emoji: e.emoji.clone(),
                    last_seen_at: e.last_seen_at,
                })
                .collect();
            out.insert(function_id, (anchor_line, users));
        }
        out
    }

    /// Diff the freshly computed aggregate against the last one broadcast
    /// for this room, emitting removal entries for functions that dropped
    /// to zero users.
    fn recompute(&mut self, room: &RoomKey) -> Option<PresenceDelta> {
        let current = self.aggregate(room);
        let previous = self.previous.entry(room.clone()).or_default();

        let mut changed = Vec::new();

        for (function_id, (anchor_line, users)) in &current {
            let unchanged = previous
                .get(function_id)
                .map(|prev_users| prev_users == users)
                .unwrap_or(false);
            if !unchanged {
                changed.push(FunctionPresenceEntry {
                    function_id: function_id.clone(),
                    anchor_line: *anchor_line,
                    users: users.clone(),
                });
            }
        }

        for function_id in previous.keys() {
            if !current.contains_key(function_id) {
                changed.push(FunctionPresenceEntry {
                    function_id: function_id.clone(),
                    anchor_line: 0,
                    users: Vec::new(),
                });
            }
        }

        *previous = current
            .into_iter()
            .map(|(function_id, (_, users))| (function_id, users))
            .collect();
        let now_empty = previous.is_empty();
        if now_empty {
            self.previous.remove(room);
        }

        if changed.is_empty() {
            None
        } else {
            Some(PresenceDelta {
                room: room.clone(),
                functions: changed,
            })
        }
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.rooms.values().all(|m| m.is_empty())
    }
}
