use chrono::{DateTime, TimeZone, Utc};
use tracing::warn;

use crate::db::keys::{LAST_SYNC_KEY, SYNC_STATS_KEY};
use crate::db::models::SyncStats;
use crate::db::store::{KvStore, StoreResult};

/// Repository for sync bookkeeping: the `luma:sync:stats` record and the
/// `luma:last_sync` timestamp used to gate scheduled runs.
pub struct SyncStatsRepository;

impl SyncStatsRepository {
    /// Read the stats record. An undecodable record is logged and treated as absent.
    pub async fn get(store: &dyn KvStore) -> StoreResult<Option<SyncStats>> {
        let Some(raw) = store.get(SYNC_STATS_KEY).await? else {
            return Ok(None);
        };

        match serde_json::from_str::<SyncStats>(&raw) {
            Ok(stats) => Ok(Some(stats)),
            Err(e) => {
                warn!("Failed to decode {}: {}", SYNC_STATS_KEY, e);
                Ok(None)
            }
        }
    }

    pub async fn put(store: &dyn KvStore, stats: &SyncStats) -> StoreResult<()> {
        let body = serde_json::to_string(stats)?;
        store.set(SYNC_STATS_KEY, &body).await
    }

    /// The freshness marker: `last_sync` of the stats record.
    pub async fn last_sync_marker(store: &dyn KvStore) -> StoreResult<Option<DateTime<Utc>>> {
        Ok(Self::get(store).await?.map(|stats| stats.last_sync))
    }

    /// Time of the last completed sync run (`luma:last_sync`, epoch millis).
    pub async fn last_sync_at(store: &dyn KvStore) -> StoreResult<Option<DateTime<Utc>>> {
        let Some(raw) = store.get(LAST_SYNC_KEY).await? else {
            return Ok(None);
        };

        match raw.trim().parse::<i64>() {
            Ok(millis) => Ok(Utc.timestamp_millis_opt(millis).single()),
            Err(e) => {
                warn!("Ignoring malformed {} value {:?}: {}", LAST_SYNC_KEY, raw, e);
                Ok(None)
            }
        }
    }

    pub async fn set_last_sync_at(store: &dyn KvStore, at: DateTime<Utc>) -> StoreResult<()> {
        store
            .set(LAST_SYNC_KEY, &at.timestamp_millis().to_string())
            .await
    }
}
