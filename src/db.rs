use rusqlite::{Connection, params};
use std::sync::Mutex;

use crate::error::StoreError;
use crate::models::StoredEditEvent;

const SCHEMA_VERSION: i64 = 1;

/// Append-only durable log of edit events. Shared read/write between
/// the Hub (writes on `edit:push`) and the retention sweep (bulk delete,
/// range scan at startup).
pub struct EventStore {
    conn: Mutex<Connection>,
}

impl EventStore {
    pub fn open(path: &str) -> Result<Self, StoreError> {
        if let Some(parent) = std::path::Path::new(path).parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let conn = Connection::open(path).map_err(|source| StoreError::Open {
            path: path.to_string(),
            source,
        })?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")
            .map_err(StoreError::Migration)?;
        let store = EventStore {
            conn: Mutex::new(conn),
        };
        store.migrate()?;
        Ok(store)
    }

    fn migrate(&self) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS schema_meta (version INTEGER NOT NULL);",
        )
        .map_err(StoreError::Migration)?;
        let current: Option<i64> = conn
            .query_row("SELECT version FROM schema_meta LIMIT 1", [], |r| r.get(0))
            .ok();

        if current.is_none() {
            conn.execute_batch(
                "BEGIN;
                CREATE TABLE IF NOT EXISTS edit_events (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    server_ts INTEGER NOT NULL,
                    repo_id TEXT NOT NULL,
                    file_path TEXT NOT NULL,
                    function_id TEXT NOT NULL,
                    anchor_line INTEGER NOT NULL,
                    user_id TEXT NOT NULL,
                    display_name TEXT NOT NULL,
                    emoji TEXT NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_edit_events_room_ts
                    ON edit_events(repo_id, file_path, server_ts);
                CREATE INDEX IF NOT EXISTS idx_edit_events_ts ON edit_events(server_ts);
                INSERT INTO schema_meta (version) VALUES (1);
                COMMIT;",
            )
            .map_err(StoreError::Migration)?;
        }

        Ok(())
    }

    /// Append an event. Total order by insertion is sufficient — no global
    /// ordering beyond `server_ts` is required.
    pub fn insert(&self, event: &StoredEditEvent) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO edit_events
                (server_ts, repo_id, file_path, function_id, anchor_line, user_id, display_name, emoji)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                event.server_ts,
                event.repo_id,
                event.file_path,
                event.function_id,
                event.anchor_line,
                event.user_id,
                event.display_name,
                event.emoji,
            ],
        )
        .map_err(StoreError::Insert)?;
        Ok(())
    }

    /// Events with `server_ts >= cutoff_ts`, ordered ascending by `server_ts`
    /// (ties broken by insertion order via `id`, SQLite's implicit rowid scan
    /// order — see DESIGN.md's resolution of the `listSince` open question).
    /// Used exactly once, at startup, to rebuild Heat State.
    pub fn list_since(&self, cutoff_ts: i64) -> Result<Vec<StoredEditEvent>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare(
                "SELECT server_ts, repo_id, file_path, function_id, anchor_line, user_id, display_name, emoji
                 FROM edit_events WHERE server_ts >= ?1 ORDER BY server_ts ASC, id ASC",
            )
            .map_err(StoreError::Query)?;
        let rows = stmt
            .query_map(params![cutoff_ts], |row| {
                Ok(StoredEditEvent {
                    server_ts: row.get(0)?,
                    repo_id: row.get(1)?,
                    file_path: row.get(2)?,
                    function_id: row.get(3)?,
                    anchor_line: row.get(4)?,
                    user_id: row.get(5)?,
                    display_name: row.get(6)?,
                    emoji: row.get(7)?,
                })
            })
            .map_err(StoreError::Query)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(StoreError::Query)
    }

    /// Bulk delete of events older than `cutoff_ts`. Idempotent. Returns the
    /// number of rows removed.
    pub fn delete_before(&self, cutoff_ts: i64) -> Result<i64, StoreError> {
        let conn = self.conn.lock().unwrap();
        let n = conn
            .execute(
                "DELETE FROM edit_events WHERE server_ts < ?1",
                params![cutoff_ts],
            )
            .map_err(StoreError::Query)?;
        Ok(n as i64)
    }

    /// Releases underlying resources. `Connection` already closes on drop;
    /// this exists to give callers an explicit, documented shutdown point.
    pub fn close(self) {
        drop(self);
    }

    #[cfg(test)]
    pub fn schema_version(&self) -> i64 {
        SCHEMA_VERSION
    }
}
