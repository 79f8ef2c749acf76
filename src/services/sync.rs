//! Reconciles scraped events against the persisted set.
//!
//! Known events (by registration link) are never rewritten; new ones are
//! stored with a TTL and age out on their own. After each run the event
//! index, the sync stats and `luma:last_sync` are refreshed.

use std::collections::HashSet;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::db::models::{Event, SyncSource, SyncStats};
use crate::db::repository::{LumaEventRepository, SyncStatsRepository};
use crate::db::store::{KvStore, StoreResult};
use crate::services::clock::Clock;
use crate::services::fallback::fallback_events;
use crate::services::scraper::{EventSource, ScrapeOutcome};

/// Outcome of one sync run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub added: usize,
    pub total: usize,
    pub source: SyncSource,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScheduledSync {
    Synced(SyncReport),
    Skipped {
        last_sync: DateTime<Utc>,
        next_sync_at: DateTime<Utc>,
    },
}

pub struct LumaSyncManager<'a> {
    store: &'a dyn KvStore,
    source: &'a dyn EventSource,
    clock: &'a dyn Clock,
    event_ttl: Duration,
}

impl<'a> LumaSyncManager<'a> {
    pub fn new(
        store: &'a dyn KvStore,
        source: &'a dyn EventSource,
        clock: &'a dyn Clock,
        event_ttl: Duration,
    ) -> Self {
        Self {
            store,
            source,
            clock,
            event_ttl,
        }
    }

    async fn candidates(&self, now: DateTime<Utc>) -> (Vec<Event>, SyncSource) {
        let outcome = self.source.fetch_remote_events().await;
        if let ScrapeOutcome::Degraded(reason) = &outcome {
            tracing::warn!("Scrape degraded: {}", reason);
        }

        let events = outcome.into_events();
        if events.is_empty() {
            tracing::warn!("No events extracted, using fallback set");
            (fallback_events(now), SyncSource::Fallback)
        } else {
            (events, SyncSource::LumaPage)
        }
    }

    /// Run one full sync. Store errors while reading the persisted set or
    /// writing the bookkeeping records abort the run; a failed write of a
    /// single event is logged and skipped.
    pub async fn sync(&self) -> StoreResult<SyncReport> {
        let now = self.clock.now();
        let (candidates, source) = self.candidates(now).await;
        tracing::info!(
            "Syncing {} candidate events (source: {})",
            candidates.len(),
            source
        );

        let existing = LumaEventRepository::load_all(self.store).await?;
        let mut known: HashSet<String> =
            existing.into_iter().map(|e| e.registration_link).collect();

        let mut added = 0;
        for event in candidates {
            if let Err(e) = event.validate() {
                tracing::warn!("Skipping invalid event: {}", e);
                continue;
            }
            if !known.insert(event.registration_link.clone()) {
                tracing::debug!("Event already known: {}", event.registration_link);
                continue;
            }

            match LumaEventRepository::insert(self.store, &event, self.event_ttl).await {
                Ok(key) => {
                    added += 1;
                    tracing::debug!("Stored event '{}' under {}", event.title, key);
                }
                Err(e) => tracing::error!("Failed to store event {}: {}", event.id, e),
            }
        }

        let keys = LumaEventRepository::list_keys(self.store).await?;
        LumaEventRepository::write_index(self.store, &keys).await?;

        let stats = SyncStats {
            last_sync: now,
            total_events: keys.len(),
            new_events_added: added,
            sync_source: source,
        };
        SyncStatsRepository::put(self.store, &stats).await?;
        SyncStatsRepository::set_last_sync_at(self.store, now).await?;

        tracing::info!(
            "Sync completed: {} new events, {} total (source: {})",
            added,
            keys.len(),
            source
        );

        Ok(SyncReport {
            added,
            total: keys.len(),
            source,
        })
    }

    /// Sync only when more than `interval` has passed since the last run.
    pub async fn scheduled_sync(&self, interval: chrono::Duration) -> StoreResult<ScheduledSync> {
        let now = self.clock.now();

        if let Some(last_sync) = SyncStatsRepository::last_sync_at(self.store).await? {
            if now - last_sync <= interval {
                let next_sync_at = last_sync
                    .checked_add_signed(interval)
                    .unwrap_or(DateTime::<Utc>::MAX_UTC);
                tracing::debug!("Skipping scheduled sync, next run due at {}", next_sync_at);
                return Ok(ScheduledSync::Skipped {
                    last_sync,
                    next_sync_at,
                });
            }
        }

        Ok(ScheduledSync::Synced(self.sync().await?))
    }
}
