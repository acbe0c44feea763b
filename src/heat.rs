use std::collections::HashMap;

use crate::models::{HeatEditor, HeatFunction, MAX_TOP_EDITORS, StoredEditEvent};

/// Key identifying a room: the `(repoId, filePath)` pair.
pub type RoomKey = (String, String);

/// Pure in-memory reduction of the edit event stream into the current heat
/// map. Owns no lock of its own — callers (the hub in `hub.rs`) serialize
/// access under a single-writer discipline.
#[derive(Debug, Default)]
pub struct HeatState {
    rooms: HashMap<RoomKey, HashMap<String, HeatFunction>>,
}

impl HeatState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one event to the heat map.
    pub fn apply(&mut self, event: &StoredEditEvent) {
        let key = (event.repo_id.clone(), event.file_path.clone());
        let room = self.rooms.entry(key).or_default();
        let function = room.entry(event.function_id.clone()).or_default();

        let next_editor = HeatEditor {
            user_id: event.user_id.clone(),
            display_name: event.display_name.clone(),
            emoji: event.emoji.clone(),
            last_edit_at: event.server_ts,
        };

        // At most one entry per userId — replace, don't append.
        function.top_editors.retain(|e| e.user_id != event.user_id);
        function.top_editors.push(next_editor);
        function
            .top_editors
            .sort_by(|a, b| b.last_edit_at.cmp(&a.last_edit_at));
        function.top_editors.truncate(MAX_TOP_EDITORS);

        // Later edits always overwrite the anchor line (DESIGN.md open question #1).
        function.anchor_line = event.anchor_line;
        function.last_edit_at = event.server_ts;
    }

    /// Replay a batch of events in ascending `server_ts` order. Order-
    /// equivalent to applying the live stream one event at a time.
    pub fn replay<'a>(&mut self, events: impl IntoIterator<Item = &'a StoredEditEvent>) {
        for event in events {
            self.apply(event);
        }
    }

    /// Drop editors, functions and rooms whose activity predates the
    /// retention cutoff.
    pub fn prune(&mut self, cutoff_ts: i64) {
        self.rooms.retain(|_, functions| {
            functions.retain(|_, function| {
                function.top_editors.retain(|e| e.last_edit_at >= cutoff_ts);
                function.last_edit_at >= cutoff_ts
            });
            !functions.is_empty()
        });
    }

    pub fn room(&self, key: &RoomKey) -> Option<&HashMap<String, HeatFunction>> {
        self.rooms.get(key)
    }

    pub fn function(&self, key: &RoomKey, function_id: &str) -> Option<&HeatFunction> {
        self.rooms.get(key).and_then(|r| r.get(function_id))
    }

    /// All `(repoId, filePath)` rooms whose key's `repoId` matches, paired
    /// with the maximum `lastEditAt` over functions with a qualifying
    /// editor — used by `repo:heat`.
    pub fn repo_heat(&self, repo_id: &str, excluding_user_id: &str) -> HashMap<String, i64> {
        let mut out = HashMap::new();
        for ((r, file_path), functions) in &self.rooms {
            if r != repo_id {
                continue;
            }
            let max_last_edit = functions
                .values()
                .filter(|f| {
                    f.top_editors
                        .iter()
                        .any(|e| e.user_id != excluding_user_id)
                })
                .map(|f| f.last_edit_at)
                .max();
            if let Some(max_last_edit) = max_last_edit {
                out.insert(file_path.clone(), max_last_edit);
            }
        }
        out
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }
}
