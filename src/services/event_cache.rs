//! Read-through cache in front of the persisted event set.
//!
//! An entry is served while it is younger than the configured duration and
//! the sync marker (`last_sync` of the stats record) still matches the one
//! seen at capture time. Anything else is a miss and triggers a full reload.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::db::models::Event;
use crate::db::repository::{LumaEventRepository, SyncStatsRepository};
use crate::db::store::{KvStore, StoreError, StoreResult};
use crate::services::clock::Clock;
use crate::services::retry::RetryPolicy;

/// Events as served by the cache, newest start date first.
#[derive(Debug, Clone)]
pub struct CachedEvents {
    pub events: Arc<Vec<Event>>,
    pub cached: bool,
    pub age: chrono::Duration,
}

struct CacheEntry {
    events: Arc<Vec<Event>>,
    captured_at: DateTime<Utc>,
    marker: Option<DateTime<Utc>>,
}

/// Retry connection failures `max_attempts` times with a linear backoff.
pub fn store_retry_policy(max_attempts: u32, base_delay: Duration) -> RetryPolicy<StoreError> {
    RetryPolicy::linear(max_attempts, base_delay).retry_if(StoreError::is_retryable)
}

pub struct EventCache {
    store: Arc<dyn KvStore>,
    clock: Arc<dyn Clock>,
    duration: chrono::Duration,
    retry: RetryPolicy<StoreError>,
    entry: RwLock<Option<CacheEntry>>,
}

impl EventCache {
    pub fn new(
        store: Arc<dyn KvStore>,
        clock: Arc<dyn Clock>,
        duration: chrono::Duration,
        retry: RetryPolicy<StoreError>,
    ) -> Self {
        Self {
            store,
            clock,
            duration,
            retry,
            entry: RwLock::new(None),
        }
    }

    pub async fn get_events(&self) -> StoreResult<CachedEvents> {
        self.retry.run(|| self.read_through()).await
    }

    /// Drop the current entry; the next read goes to the store.
    pub async fn invalidate(&self) {
        *self.entry.write().await = None;
        tracing::info!("Event cache invalidated");
    }

    async fn read_through(&self) -> StoreResult<CachedEvents> {
        let store = self.store.as_ref();
        let marker = SyncStatsRepository::last_sync_marker(store).await?;
        let now = self.clock.now();

        if let Some(entry) = self.entry.read().await.as_ref() {
            let age = now - entry.captured_at;
            if age <= self.duration && entry.marker == marker {
                tracing::debug!("Event cache hit (age {}ms)", age.num_milliseconds());
                return Ok(CachedEvents {
                    events: entry.events.clone(),
                    cached: true,
                    age,
                });
            }
        }

        let keys = LumaEventRepository::list_keys(store).await?;
        let mut events = if keys.is_empty() {
            Vec::new()
        } else {
            LumaEventRepository::load_many(store, &keys).await?
        };
        events.sort_by(|a, b| b.start_date.cmp(&a.start_date));
        tracing::debug!("Event cache miss, loaded {} events", events.len());

        let events = Arc::new(events);
        *self.entry.write().await = Some(CacheEntry {
            events: events.clone(),
            captured_at: now,
            marker,
        });

        Ok(CachedEvents {
            events,
            cached: false,
            age: chrono::Duration::zero(),
        })
    }
}
