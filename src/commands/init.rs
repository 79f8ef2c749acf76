use anyhow::Result;
use chrono::{DateTime, Utc};

use crate::db::store::KvStore;

pub const APP_VERSION_KEY: &str = "app:version";
pub const APP_INITIALIZED_AT_KEY: &str = "app:initialized_at";
pub const APP_STATUS_KEY: &str = "app:status";

/// Bootstrap values written by `init`.
pub fn bootstrap_values(now: DateTime<Utc>) -> [(&'static str, String); 3] {
    [
        (APP_VERSION_KEY, env!("CARGO_PKG_VERSION").to_string()),
        (APP_INITIALIZED_AT_KEY, now.to_rfc3339()),
        (APP_STATUS_KEY, "active".to_string()),
    ]
}

pub async fn run(store: &dyn KvStore, now: DateTime<Utc>) -> Result<()> {
    for (key, value) in bootstrap_values(now) {
        store.set(key, &value).await?;
        println!("Set {}: {}", key, value);
    }

    println!("Store initialized");
    Ok(())
}
