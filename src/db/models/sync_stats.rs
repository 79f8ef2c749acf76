use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Where the events of a sync run came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncSource {
    LumaPage,
    Fallback,
}

impl fmt::Display for SyncSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncSource::LumaPage => write!(f, "luma_page"),
            SyncSource::Fallback => write!(f, "fallback"),
        }
    }
}

/// Statistics of the latest sync run, stored under `luma:sync:stats`.
///
/// `last_sync` doubles as the freshness marker for the read-through cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStats {
    pub last_sync: DateTime<Utc>,
    pub total_events: usize,
    pub new_events_added: usize,
    pub sync_source: SyncSource,
}
