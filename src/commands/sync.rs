use anyhow::Result;

use crate::services::sync::{LumaSyncManager, ScheduledSync};

pub async fn run(manager: &LumaSyncManager<'_>) -> Result<()> {
    let report = manager.sync().await?;

    println!("Sync completed (source: {})", report.source);
    println!("New events: {}", report.added);
    println!("Total events: {}", report.total);
    Ok(())
}

pub async fn run_scheduled(manager: &LumaSyncManager<'_>, interval: chrono::Duration) -> Result<()> {
    match manager.scheduled_sync(interval).await? {
        ScheduledSync::Synced(report) => {
            println!(
                "Scheduled sync ran: {} new, {} total (source: {})",
                report.added, report.total, report.source
            );
        }
        ScheduledSync::Skipped {
            last_sync,
            next_sync_at,
        } => {
            println!("Last sync at {}", last_sync.to_rfc3339());
            println!("Not due yet, next sync at {}", next_sync_at.to_rfc3339());
        }
    }
    Ok(())
}
