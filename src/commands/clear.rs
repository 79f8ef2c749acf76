use anyhow::{bail, Result};

use crate::config::AdminConfig;
use crate::db::store::KvStore;

/// Delete every key matching `pattern` (all keys when `None`) and return
/// how many were removed. Refused in production unless `FORCE_CLEAR=true`.
pub async fn clear_keys(
    store: &dyn KvStore,
    pattern: Option<&str>,
    admin: &AdminConfig,
) -> Result<u64> {
    if admin.is_production() && !admin.force_clear {
        bail!("Refusing to clear a production store, set FORCE_CLEAR=true to proceed");
    }

    let keys = store.keys(pattern.unwrap_or("*")).await?;
    if keys.is_empty() {
        return Ok(0);
    }

    for (i, key) in keys.iter().enumerate() {
        println!("  {}. {}", i + 1, key);
    }

    Ok(store.del(&keys).await?)
}

pub async fn run(store: &dyn KvStore, pattern: Option<&str>, admin: &AdminConfig) -> Result<()> {
    match pattern {
        Some(p) => println!("Clearing keys matching \"{}\"", p),
        None => println!("Clearing ALL keys in this environment"),
    }

    let deleted = clear_keys(store, pattern, admin).await?;
    println!("Deleted {} keys", deleted);

    let remaining = store.keys("*").await?.len();
    println!("Keys remaining: {}", remaining);
    Ok(())
}
