use std::time::Instant;

use anyhow::Result;

use crate::commands::environment_label;
use crate::db::store::KvStore;

pub async fn run(store: &dyn KvStore) -> Result<()> {
    let started = Instant::now();
    store.ping().await?;
    let latency = started.elapsed();

    println!("Store connection OK ({})", environment_label(store.prefix()));
    println!("Latency: {}ms", latency.as_millis());
    Ok(())
}
