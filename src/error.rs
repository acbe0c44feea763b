/// Errors surfaced by the Event Store. Startup failures to open the store are
/// fatal; per-event persistence failures are logged and otherwise swallowed
/// by the caller, which still applies the in-memory effect.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("failed to open event store at {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: rusqlite::Error,
    },
    #[error("failed to run schema migration: {0}")]
    Migration(#[source] rusqlite::Error),
    #[error("failed to persist event: {0}")]
    Insert(#[source] rusqlite::Error),
    #[error("failed to query event store: {0}")]
    Query(#[source] rusqlite::Error),
}
