//! In-process implementation of [`KvStore`].
//!
//! Mirrors the Redis semantics the application relies on (glob matching,
//! TTL expiry, sorted sets ordered by score) so the pipeline can run
//! without a Redis server: tests, and `REDIS_URL=memory://` for local work.
//! Expired entries are dropped when an operation touches them, and every
//! key listing sweeps the whole map.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{pattern_matches, KeyType, KvStore, StoreError, StoreResult};

#[derive(Debug, Clone)]
enum MemoryValue {
    Str(String),
    List(Vec<String>),
    Set(BTreeSet<String>),
    Hash(BTreeMap<String, String>),
    ZSet(Vec<(String, f64)>),
}

impl MemoryValue {
    fn key_type(&self) -> KeyType {
        match self {
            MemoryValue::Str(_) => KeyType::String,
            MemoryValue::List(_) => KeyType::List,
            MemoryValue::Set(_) => KeyType::Set,
            MemoryValue::Hash(_) => KeyType::Hash,
            MemoryValue::ZSet(_) => KeyType::ZSet,
        }
    }
}

#[derive(Debug, Clone)]
struct MemoryEntry {
    value: MemoryValue,
    expires_at: Option<Instant>,
}

impl MemoryEntry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|exp| now >= exp)
    }
}

type Entries = HashMap<String, MemoryEntry>;

/// `None` when `ttl` reaches past what `Instant` can represent; such a key
/// simply never expires.
fn expiry(now: Instant, ttl: Duration) -> Option<Instant> {
    now.checked_add(ttl.max(Duration::from_secs(1)))
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: Arc<Mutex<Entries>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn wrong_type(key: &str) -> StoreError {
        StoreError::OperationFailed(format!(
            "WRONGTYPE Operation against a key holding the wrong kind of value: {}",
            key
        ))
    }

    /// Live entry for `key`; an expired one is removed on the way.
    fn live<'a>(entries: &'a mut Entries, key: &str, now: Instant) -> Option<&'a mut MemoryEntry> {
        if entries.get(key).is_some_and(|e| e.is_expired(now)) {
            entries.remove(key);
        }
        entries.get_mut(key)
    }

    /// Read a value of the kind `pick` accepts; a missing key reads as `None`.
    async fn read<T>(
        &self,
        key: &str,
        pick: impl FnOnce(&MemoryValue) -> Option<T>,
    ) -> StoreResult<Option<T>> {
        let mut entries = self.entries.lock().await;
        match Self::live(&mut entries, key, Instant::now()) {
            Some(entry) => pick(&entry.value)
                .map(Some)
                .ok_or_else(|| Self::wrong_type(key)),
            None => Ok(None),
        }
    }

    /// Modify the value at `key`, creating it from `empty` when missing.
    async fn update(
        &self,
        key: &str,
        empty: MemoryValue,
        apply: impl FnOnce(&mut MemoryValue) -> bool,
    ) -> StoreResult<()> {
        let mut entries = self.entries.lock().await;
        if Self::live(&mut entries, key, Instant::now()).is_none() {
            entries.insert(
                key.to_string(),
                MemoryEntry {
                    value: empty,
                    expires_at: None,
                },
            );
        }

        let applied = entries
            .get_mut(key)
            .is_some_and(|entry| apply(&mut entry.value));
        if applied {
            Ok(())
        } else {
            Err(Self::wrong_type(key))
        }
    }

    async fn live_keys(&self, pattern: &str) -> Vec<String> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        entries.retain(|_, e| !e.is_expired(now));

        let mut keys: Vec<String> = entries
            .keys()
            .filter(|k| pattern_matches(pattern, k))
            .cloned()
            .collect();
        keys.sort();
        keys
    }

    #[cfg(test)]
    async fn stored_len(&self) -> usize {
        self.entries.lock().await.len()
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    fn prefix(&self) -> Option<&str> {
        None
    }

    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }

    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        self.read(key, |value| match value {
            MemoryValue::Str(s) => Some(s.clone()),
            _ => None,
        })
        .await
    }

    async fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        let mut entries = self.entries.lock().await;
        entries.insert(
            key.to_string(),
            MemoryEntry {
                value: MemoryValue::Str(value.to_string()),
                expires_at: None,
            },
        );
        Ok(())
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<()> {
        let mut entries = self.entries.lock().await;
        entries.insert(
            key.to_string(),
            MemoryEntry {
                value: MemoryValue::Str(value.to_string()),
                expires_at: expiry(Instant::now(), ttl),
            },
        );
        Ok(())
    }

    async fn expire(&self, key: &str, ttl: Duration) -> StoreResult<bool> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        match Self::live(&mut entries, key, now) {
            Some(entry) => {
                entry.expires_at = expiry(now, ttl);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn ttl(&self, key: &str) -> StoreResult<Option<Duration>> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        Ok(Self::live(&mut entries, key, now)
            .and_then(|e| e.expires_at)
            .map(|exp| exp.saturating_duration_since(now)))
    }

    async fn del(&self, keys: &[String]) -> StoreResult<u64> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        let mut removed = 0;
        for key in keys {
            if let Some(entry) = entries.remove(key) {
                if !entry.is_expired(now) {
                    removed += 1;
                }
            }
        }
        Ok(removed)
    }

    async fn keys(&self, pattern: &str) -> StoreResult<Vec<String>> {
        Ok(self.live_keys(pattern).await)
    }

    async fn scan_match(&self, pattern: &str) -> StoreResult<Vec<String>> {
        Ok(self.live_keys(pattern).await)
    }

    async fn key_type(&self, key: &str) -> StoreResult<KeyType> {
        let mut entries = self.entries.lock().await;
        Ok(Self::live(&mut entries, key, Instant::now())
            .map(|e| e.value.key_type())
            .unwrap_or(KeyType::None))
    }

    async fn rpush(&self, key: &str, values: &[String]) -> StoreResult<()> {
        self.update(key, MemoryValue::List(Vec::new()), |value| match value {
            MemoryValue::List(items) => {
                items.extend_from_slice(values);
                true
            }
            _ => false,
        })
        .await
    }

    async fn lrange_all(&self, key: &str) -> StoreResult<Vec<String>> {
        let items = self
            .read(key, |value| match value {
                MemoryValue::List(items) => Some(items.clone()),
                _ => None,
            })
            .await?;
        Ok(items.unwrap_or_default())
    }

    async fn llen(&self, key: &str) -> StoreResult<u64> {
        Ok(self.lrange_all(key).await?.len() as u64)
    }

    async fn sadd(&self, key: &str, members: &[String]) -> StoreResult<()> {
        self.update(key, MemoryValue::Set(BTreeSet::new()), |value| match value {
            MemoryValue::Set(set) => {
                set.extend(members.iter().cloned());
                true
            }
            _ => false,
        })
        .await
    }

    async fn smembers(&self, key: &str) -> StoreResult<Vec<String>> {
        let members = self
            .read(key, |value| match value {
                MemoryValue::Set(set) => Some(set.iter().cloned().collect()),
                _ => None,
            })
            .await?;
        Ok(members.unwrap_or_default())
    }

    async fn scard(&self, key: &str) -> StoreResult<u64> {
        Ok(self.smembers(key).await?.len() as u64)
    }

    async fn hset_all(&self, key: &str, fields: &BTreeMap<String, String>) -> StoreResult<()> {
        self.update(key, MemoryValue::Hash(BTreeMap::new()), |value| match value {
            MemoryValue::Hash(hash) => {
                hash.extend(fields.iter().map(|(k, v)| (k.clone(), v.clone())));
                true
            }
            _ => false,
        })
        .await
    }

    async fn hgetall(&self, key: &str) -> StoreResult<BTreeMap<String, String>> {
        let fields = self
            .read(key, |value| match value {
                MemoryValue::Hash(hash) => Some(hash.clone()),
                _ => None,
            })
            .await?;
        Ok(fields.unwrap_or_default())
    }

    async fn hlen(&self, key: &str) -> StoreResult<u64> {
        Ok(self.hgetall(key).await?.len() as u64)
    }

    async fn zadd(&self, key: &str, member: &str, score: f64) -> StoreResult<()> {
        self.update(key, MemoryValue::ZSet(Vec::new()), |value| {
            let MemoryValue::ZSet(members) = value else {
                return false;
            };
            match members.iter_mut().find(|(m, _)| m == member) {
                Some(existing) => existing.1 = score,
                None => members.push((member.to_string(), score)),
            }
            members.sort_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
            true
        })
        .await
    }

    async fn zrange_with_scores(&self, key: &str) -> StoreResult<Vec<(String, f64)>> {
        let members = self
            .read(key, |value| match value {
                MemoryValue::ZSet(members) => Some(members.clone()),
                _ => None,
            })
            .await?;
        Ok(members.unwrap_or_default())
    }

    async fn zcard(&self, key: &str) -> StoreResult<u64> {
        Ok(self.zrange_with_scores(key).await?.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_get_and_delete() {
        let store = MemoryStore::new();
        store.set("a", "1").await.unwrap();
        store.set("b", "2").await.unwrap();

        assert_eq!(store.get("a").await.unwrap().as_deref(), Some("1"));
        assert_eq!(
            store
                .del(&["a".to_string(), "missing".to_string()])
                .await
                .unwrap(),
            1
        );
        assert_eq!(store.get("a").await.unwrap(), None);
        assert_eq!(store.keys("*").await.unwrap(), vec!["b".to_string()]);
    }

    #[tokio::test]
    async fn ttl_is_reported_for_expiring_keys_only() {
        let store = MemoryStore::new();
        store
            .set_ex("luma:event:x", "{}", Duration::from_secs(60))
            .await
            .unwrap();
        store.set("plain", "v").await.unwrap();

        let ttl = store.ttl("luma:event:x").await.unwrap().unwrap();
        assert!(ttl <= Duration::from_secs(60) && ttl > Duration::from_secs(55));
        assert_eq!(store.ttl("plain").await.unwrap(), None);
        assert_eq!(store.ttl("missing").await.unwrap(), None);

        assert!(store.expire("plain", Duration::from_secs(10)).await.unwrap());
        assert!(!store.expire("missing", Duration::from_secs(10)).await.unwrap());
        assert!(store.ttl("plain").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn unrepresentable_ttl_never_expires() {
        let store = MemoryStore::new();
        store
            .set_ex("luma:event:x", "{}", Duration::MAX)
            .await
            .unwrap();

        assert_eq!(store.get("luma:event:x").await.unwrap().as_deref(), Some("{}"));
        assert_eq!(store.ttl("luma:event:x").await.unwrap(), None);
    }

    #[tokio::test]
    async fn expired_entries_are_evicted() {
        let store = MemoryStore::new();
        store.set_ex("a", "1", Duration::from_secs(1)).await.unwrap();
        store.set_ex("b", "2", Duration::from_secs(1)).await.unwrap();
        store.set("kept", "v").await.unwrap();

        // Backdate instead of sleeping past the one-second minimum.
        {
            let mut entries = store.entries.lock().await;
            let past = Instant::now() - Duration::from_millis(1);
            for key in ["a", "b"] {
                entries.get_mut(key).unwrap().expires_at = Some(past);
            }
        }

        assert_eq!(store.get("a").await.unwrap(), None);
        assert_eq!(store.stored_len().await, 2);

        assert_eq!(store.keys("*").await.unwrap(), vec!["kept".to_string()]);
        assert_eq!(store.stored_len().await, 1);
    }

    #[tokio::test]
    async fn sorted_sets_order_by_score() {
        let store = MemoryStore::new();
        store.zadd("events", "late", 3.0).await.unwrap();
        store.zadd("events", "early", 1.0).await.unwrap();
        store.zadd("events", "late", 0.5).await.unwrap();

        let members = store.zrange_with_scores("events").await.unwrap();
        assert_eq!(
            members,
            vec![("late".to_string(), 0.5), ("early".to_string(), 1.0)]
        );
        assert_eq!(store.zcard("events").await.unwrap(), 2);
        assert_eq!(store.key_type("events").await.unwrap(), KeyType::ZSet);
        assert!(store.get("events").await.is_err());
    }

    #[tokio::test]
    async fn lists_sets_and_hashes() {
        let store = MemoryStore::new();
        let strings = |items: &[&str]| items.iter().map(|s| s.to_string()).collect::<Vec<_>>();

        store.rpush("queue", &strings(&["a", "b"])).await.unwrap();
        store.rpush("queue", &strings(&["a"])).await.unwrap();
        assert_eq!(store.lrange_all("queue").await.unwrap(), strings(&["a", "b", "a"]));
        assert_eq!(store.llen("queue").await.unwrap(), 3);
        assert_eq!(store.key_type("queue").await.unwrap(), KeyType::List);

        store.sadd("tags", &strings(&["kaia", "defi", "kaia"])).await.unwrap();
        assert_eq!(store.smembers("tags").await.unwrap(), strings(&["defi", "kaia"]));
        assert_eq!(store.scard("tags").await.unwrap(), 2);

        let fields = BTreeMap::from([
            ("name".to_string(), "Kaia".to_string()),
            ("slug".to_string(), "kaiachain".to_string()),
        ]);
        store.hset_all("calendar", &fields).await.unwrap();
        assert_eq!(store.hgetall("calendar").await.unwrap(), fields);
        assert_eq!(store.hlen("calendar").await.unwrap(), 2);
        assert_eq!(store.key_type("calendar").await.unwrap(), KeyType::Hash);

        assert!(store.sadd("queue", &strings(&["x"])).await.is_err());
        assert_eq!(store.hlen("missing").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn scan_filters_by_pattern() {
        let store = MemoryStore::new();
        store.set("luma:event:a", "{}").await.unwrap();
        store.set("luma:event:b", "{}").await.unwrap();
        store.set("luma:events:index", "[]").await.unwrap();

        let keys = store.scan_match("luma:event:*").await.unwrap();
        assert_eq!(keys, vec!["luma:event:a", "luma:event:b"]);
    }
}
