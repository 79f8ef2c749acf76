use anyhow::Result;

use crate::commands::{environment_label, preview};
use crate::db::store::{KeyType, KvStore, StoreResult};

/// One-line description of a key: its type plus a size or value preview.
pub async fn describe_key(store: &dyn KvStore, key: &str) -> StoreResult<String> {
    let key_type = store.key_type(key).await?;

    Ok(match key_type {
        KeyType::String => {
            let value = store.get(key).await?.unwrap_or_default();
            format!("(string, length: {}) {}", value.chars().count(), preview(&value))
        }
        KeyType::List => format!("(list, length: {})", store.llen(key).await?),
        KeyType::Set => format!("(set, members: {})", store.scard(key).await?),
        KeyType::Hash => format!("(hash, fields: {})", store.hlen(key).await?),
        KeyType::ZSet => format!("(zset, members: {})", store.zcard(key).await?),
        other => format!("({})", other.as_str()),
    })
}

pub async fn run(store: &dyn KvStore) -> Result<()> {
    let keys = store.keys("*").await?;

    println!("=== Store overview: {} ===", environment_label(store.prefix()));
    println!("Total keys: {}", keys.len());

    for (i, key) in keys.iter().enumerate() {
        let info = match describe_key(store, key).await {
            Ok(info) => info,
            Err(e) => format!("(failed to inspect: {})", e),
        };
        println!("  {}. {} {}", i + 1, key, info);
    }

    Ok(())
}
