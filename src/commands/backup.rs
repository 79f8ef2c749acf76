//! JSON dump and restore of the keyspace.
//!
//! Strings, lists, sets, hashes and sorted sets are captured along with
//! their remaining TTL. Other types (streams, modules) are reported and
//! skipped.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::db::store::{KeyType, KvStore};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Backup {
    pub timestamp: DateTime<Utc>,
    pub keys_count: usize,
    pub data: BTreeMap<String, BackupEntry>,
}

/// `value` is a string for `string` keys, an array for `list` and `set`
/// keys, an object for `hash` keys and a list of `[member, score]` pairs
/// for `zset` keys.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupEntry {
    #[serde(rename = "type")]
    pub kind: String,
    pub value: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl_seconds: Option<u64>,
}

pub fn default_backup_path(now: DateTime<Utc>) -> PathBuf {
    PathBuf::from(format!(
        "redis-backup-{}.json",
        now.format("%Y-%m-%dT%H-%M-%S-%3fZ")
    ))
}

pub async fn create_backup(store: &dyn KvStore, now: DateTime<Utc>) -> Result<Backup> {
    let keys = store.keys("*").await?;
    let mut data = BTreeMap::new();

    for key in keys {
        let key_type = store.key_type(&key).await?;
        let value = match key_type {
            KeyType::String => match store.get(&key).await? {
                Some(v) => Value::String(v),
                None => continue,
            },
            KeyType::List => serde_json::to_value(store.lrange_all(&key).await?)?,
            KeyType::Set => serde_json::to_value(store.smembers(&key).await?)?,
            KeyType::Hash => serde_json::to_value(store.hgetall(&key).await?)?,
            KeyType::ZSet => serde_json::to_value(store.zrange_with_scores(&key).await?)?,
            KeyType::None => continue,
            other => {
                tracing::warn!("Skipping {} key {}: type not supported", other.as_str(), key);
                continue;
            }
        };

        let ttl_seconds = store.ttl(&key).await?.map(|ttl| ttl.as_secs().max(1));
        data.insert(
            key,
            BackupEntry {
                kind: key_type.as_str().to_string(),
                value,
                ttl_seconds,
            },
        );
    }

    Ok(Backup {
        timestamp: now,
        keys_count: data.len(),
        data,
    })
}

fn decode<T: serde::de::DeserializeOwned>(key: &str, entry: &BackupEntry) -> Result<T> {
    serde_json::from_value(entry.value.clone())
        .with_context(|| format!("{} entry {} is malformed", entry.kind, key))
}

/// Write every entry of `backup` back into the store, overwriting existing
/// values. Returns the number of keys restored.
pub async fn restore_backup(store: &dyn KvStore, backup: &Backup) -> Result<usize> {
    let mut restored = 0;

    for (key, entry) in &backup.data {
        match entry.kind.as_str() {
            "string" => {
                let Value::String(value) = &entry.value else {
                    bail!("string entry {} does not hold a string", key);
                };
                store.set(key, value).await?;
            }
            "list" => {
                let items: Vec<String> = decode(key, entry)?;
                store.del(std::slice::from_ref(key)).await?;
                store.rpush(key, &items).await?;
            }
            "set" => {
                let members: Vec<String> = decode(key, entry)?;
                store.del(std::slice::from_ref(key)).await?;
                store.sadd(key, &members).await?;
            }
            "hash" => {
                let fields: BTreeMap<String, String> = decode(key, entry)?;
                store.del(std::slice::from_ref(key)).await?;
                store.hset_all(key, &fields).await?;
            }
            "zset" => {
                let members: Vec<(String, f64)> = decode(key, entry)?;
                store.del(std::slice::from_ref(key)).await?;
                for (member, score) in members {
                    store.zadd(key, &member, score).await?;
                }
            }
            other => {
                tracing::warn!("Skipping {} entry {}: type not supported", other, key);
                continue;
            }
        }

        if let Some(ttl) = entry.ttl_seconds {
            store.expire(key, Duration::from_secs(ttl)).await?;
        }
        restored += 1;
    }

    Ok(restored)
}

pub async fn run(store: &dyn KvStore, output: Option<&Path>, now: DateTime<Utc>) -> Result<()> {
    let backup = create_backup(store, now).await?;
    let path = output
        .map(Path::to_path_buf)
        .unwrap_or_else(|| default_backup_path(now));

    let body = serde_json::to_string_pretty(&backup)?;
    std::fs::write(&path, body)
        .with_context(|| format!("Failed to write backup to {}", path.display()))?;

    println!("Backup written to {}", path.display());
    println!("Backed up {} keys", backup.keys_count);
    Ok(())
}

pub async fn run_restore(store: &dyn KvStore, input: &Path) -> Result<()> {
    let body = std::fs::read_to_string(input)
        .with_context(|| format!("Failed to read backup {}", input.display()))?;
    let backup: Backup = serde_json::from_str(&body)
        .with_context(|| format!("{} is not a valid backup file", input.display()))?;

    let restored = restore_backup(store, &backup).await?;
    println!(
        "Restored {} of {} keys from backup taken at {}",
        restored,
        backup.keys_count,
        backup.timestamp.to_rfc3339()
    );
    Ok(())
}
