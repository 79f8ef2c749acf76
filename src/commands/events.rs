use anyhow::Result;
use chrono::{DateTime, Utc};

use crate::db::models::Event;
use crate::db::repository::{LumaEventRepository, SyncStatsRepository};
use crate::db::store::KvStore;

/// Stored events in ascending start order, split at `now`.
pub fn split_upcoming(mut events: Vec<Event>, now: DateTime<Utc>) -> (Vec<Event>, Vec<Event>) {
    events.sort_by(|a, b| a.start_date.cmp(&b.start_date));
    events.into_iter().partition(|e| e.start_date > now)
}

pub async fn run(store: &dyn KvStore, now: DateTime<Utc>) -> Result<()> {
    let keys = LumaEventRepository::list_keys(store).await?;
    println!("=== Luma events ===");
    println!("Stored events: {}", keys.len());

    if keys.is_empty() {
        println!("No Luma events stored yet, run `sync` first");
        return Ok(());
    }

    let index = LumaEventRepository::read_index(store).await?;
    println!("Indexed at last sync: {}", index.len());

    if let Some(stats) = SyncStatsRepository::get(store).await? {
        println!("Last sync: {}", stats.last_sync.to_rfc3339());
        println!("Sync source: {}", stats.sync_source);
        println!("Added in last sync: {}", stats.new_events_added);
    }

    let events = LumaEventRepository::load_many(store, &keys).await?;
    let (upcoming, past) = split_upcoming(events, now);

    println!();
    for (i, event) in past.iter().chain(upcoming.iter()).enumerate() {
        let marker = if event.start_date > now { "upcoming" } else { "done" };
        println!("{}. [{}] {}", i + 1, marker, event.title);
        println!("   When: {}", event.start_date.format("%Y-%m-%d %H:%M UTC"));
        println!("   Where: {}", event.location);
        println!("   Status: {:?}", event.status_at(now));
        println!("   Link: {}", event.registration_link);
        if !event.tags.is_empty() {
            println!("   Tags: {}", event.tags.join(", "));
        }
        println!();
    }

    println!("Upcoming: {}", upcoming.len());
    println!("Past: {}", past.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::fallback::fallback_events;
    use chrono::TimeZone;

    #[test]
    fn splits_and_orders_by_start() {
        let now = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let (upcoming, past) = split_upcoming(fallback_events(now), now);

        assert_eq!(past.len(), 1);
        assert_eq!(past[0].id, "kaia-community-ama");
        assert_eq!(upcoming.len(), 3);
        assert!(upcoming
            .windows(2)
            .all(|w| w[0].start_date <= w[1].start_date));
    }
}
