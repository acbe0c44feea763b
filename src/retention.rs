use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::config::{PRESENCE_SWEEP_INTERVAL_SECS, RETENTION_SWEEP_INTERVAL_SECS};
use crate::db::EventStore;
use crate::heat::HeatState;
use crate::hub::Hub;

/// Prunes events older than the retention window, then rebuilds Heat State
/// by replaying whatever remains. Runs once, synchronously, before the
/// server starts accepting connections.
pub fn replay_on_startup(store: &EventStore, retention_days: i64) -> Result<HeatState, crate::error::StoreError> {
    let now_ms = chrono::Utc::now().timestamp_millis();
    let cutoff = now_ms - retention_days * 86_400_000;
    let deleted = store.delete_before(cutoff)?;
    if deleted > 0 {
        info!(deleted, "pruned events older than the retention window at startup");
    }
    let events = store.list_since(cutoff)?;
    let mut heat = HeatState::new();
    heat.replay(&events);
    info!(event_count = events.len(), "replayed edit events into heat state");
    Ok(heat)
}

/// Spawns the two independent periodic sweeps: presence TTL expiry every
/// `PRESENCE_SWEEP_INTERVAL_SECS`, and retention pruning of both the Event
/// Store and Heat State every `RETENTION_SWEEP_INTERVAL_SECS` — one
/// `tokio::spawn` loop per concern rather than a single combined timer.
pub fn spawn_sweeps(hub: Arc<Hub>) {
    let presence_hub = Arc::clone(&hub);
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(Duration::from_secs(PRESENCE_SWEEP_INTERVAL_SECS)).await;
            let now_ms = chrono::Utc::now().timestamp_millis();
            presence_hub.sweep_presence(now_ms).await;
        }
    });

    tokio::spawn(async move {
        loop {
            tokio::time::sleep(Duration::from_secs(RETENTION_SWEEP_INTERVAL_SECS)).await;
            let now_ms = chrono::Utc::now().timestamp_millis();
            match hub.sweep_retention(now_ms).await {
                Ok(deleted) if deleted > 0 => info!(deleted, "retention sweep pruned events"),
                Ok(_) => {}
                Err(err) => warn!(error = %err, "retention sweep failed"),
            }
        }
    });
}
