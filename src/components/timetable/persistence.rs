use super::models::ScheduleSnapshot;
use crate::components::redis_service::{keys, KeyValueStore};
use crate::error::DashResult;
use tracing::{debug, warn};

/// Save the snapshot as JSON under the snapshot key
pub async fn save_snapshot(store: &dyn KeyValueStore, snapshot: &ScheduleSnapshot) -> DashResult<()> {
    let json = serde_json::to_string(snapshot)?;

    store.set(keys::TIMETABLE_SNAPSHOT, json).await?;
    debug!(events = snapshot.len(), "Saved timetable snapshot");
    Ok(())
}

/// Load the last saved snapshot.
///
/// Any read or decode failure counts as "nothing saved".
pub async fn load_snapshot(store: &dyn KeyValueStore) -> Option<ScheduleSnapshot> {
    let json = match store.get(keys::TIMETABLE_SNAPSHOT).await {
        Ok(Some(json)) => json,
        Ok(None) => return None,
        Err(e) => {
            warn!("Failed to read cached timetable: {}", e);
            return None;
        }
    };

    match serde_json::from_str::<ScheduleSnapshot>(&json) {
        Ok(snapshot) => Some(snapshot),
        Err(e) => {
            warn!("Discarding unreadable cached timetable: {}", e);
            None
        }
    }
}

/// Remember the last identifier that produced a snapshot
pub async fn save_identifier(store: &dyn KeyValueStore, identifier: &str) -> DashResult<()> {
    store
        .set(keys::TIMETABLE_IDENTIFIER, identifier.to_string())
        .await
}

pub async fn load_identifier(store: &dyn KeyValueStore) -> DashResult<Option<String>> {
    store.get(keys::TIMETABLE_IDENTIFIER).await
}
