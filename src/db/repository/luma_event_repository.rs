use std::time::Duration;

use tracing::warn;

use crate::db::keys::{event_key, EVENTS_INDEX_KEY, EVENT_KEY_PATTERN};
use crate::db::models::Event;
use crate::db::store::{KvStore, StoreResult};

/// Repository for Luma events stored as JSON strings under `luma:event:<id>`.
pub struct LumaEventRepository;

impl LumaEventRepository {
    /// List every persisted event key, sorted.
    pub async fn list_keys(store: &dyn KvStore) -> StoreResult<Vec<String>> {
        let mut keys = store.scan_match(EVENT_KEY_PATTERN).await?;
        keys.sort();
        Ok(keys)
    }

    /// Load and decode the events stored under `keys`.
    ///
    /// Records that vanished in the meantime (TTL) or fail to decode are
    /// skipped and logged; store errors abort the load.
    pub async fn load_many(store: &dyn KvStore, keys: &[String]) -> StoreResult<Vec<Event>> {
        let mut events = Vec::with_capacity(keys.len());

        for key in keys {
            let Some(raw) = store.get(key).await? else {
                continue;
            };

            match serde_json::from_str::<Event>(&raw) {
                Ok(event) => events.push(event),
                Err(e) => warn!("Failed to decode stored event {}: {}", key, e),
            }
        }

        Ok(events)
    }

    /// Load every decodable event in the store.
    pub async fn load_all(store: &dyn KvStore) -> StoreResult<Vec<Event>> {
        let keys = Self::list_keys(store).await?;
        Self::load_many(store, &keys).await
    }

    /// Persist an event under the key derived from its registration link.
    ///
    /// Returns the key the event was written to.
    pub async fn insert(store: &dyn KvStore, event: &Event, ttl: Duration) -> StoreResult<String> {
        let key = event_key(&event.registration_link);
        let body = serde_json::to_string(event)?;
        store.set_ex(&key, &body, ttl).await?;
        Ok(key)
    }

    /// Overwrite the event index (`luma:events:index`) with `keys`.
    pub async fn write_index(store: &dyn KvStore, keys: &[String]) -> StoreResult<()> {
        let body = serde_json::to_string(keys)?;
        store.set(EVENTS_INDEX_KEY, &body).await
    }

    pub async fn read_index(store: &dyn KvStore) -> StoreResult<Vec<String>> {
        match store.get(EVENTS_INDEX_KEY).await? {
            Some(raw) => Ok(serde_json::from_str(&raw)?),
            None => Ok(Vec::new()),
        }
    }
}
