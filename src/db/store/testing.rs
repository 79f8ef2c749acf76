//! Fault-injecting store wrapper for tests.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use super::{KeyType, KvStore, MemoryStore, StoreError, StoreResult};

/// Wraps a [`MemoryStore`] and fails selected operations on demand.
#[derive(Debug, Default)]
pub struct FlakyStore {
    pub inner: MemoryStore,
    read_failures: AtomicU32,
    read_error: Mutex<Option<StoreError>>,
    reads: AtomicU32,
    reject_writes_containing: Mutex<Option<String>>,
}

impl FlakyStore {
    pub fn new(inner: MemoryStore) -> Self {
        Self {
            inner,
            ..Default::default()
        }
    }

    /// Fail the next `count` reads (`get`, `keys`, `scan_match`) with `error`.
    pub fn fail_reads(&self, count: u32, error: StoreError) {
        self.read_failures.store(count, Ordering::SeqCst);
        *self.read_error.lock().unwrap() = Some(error);
    }

    /// Reject `set_ex` for keys containing `fragment`.
    pub fn reject_writes_containing(&self, fragment: &str) {
        *self.reject_writes_containing.lock().unwrap() = Some(fragment.to_string());
    }

    /// Number of read calls seen so far, failed ones included.
    pub fn reads(&self) -> u32 {
        self.reads.load(Ordering::SeqCst)
    }

    fn check_read(&self) -> StoreResult<()> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        let remaining = self.read_failures.load(Ordering::SeqCst);
        if remaining == 0 {
            return Ok(());
        }
        self.read_failures.store(remaining - 1, Ordering::SeqCst);
        let error = self.read_error.lock().unwrap().clone();
        Err(error.unwrap_or_else(|| StoreError::ConnectionFailed("injected".to_string())))
    }
}

#[async_trait]
impl KvStore for FlakyStore {
    fn prefix(&self) -> Option<&str> {
        None
    }

    async fn ping(&self) -> StoreResult<()> {
        self.inner.ping().await
    }

    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        self.check_read()?;
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        self.inner.set(key, value).await
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<()> {
        let rejected = self.reject_writes_containing.lock().unwrap().clone();
        if rejected.is_some_and(|fragment| key.contains(&fragment)) {
            return Err(StoreError::OperationFailed(format!("write rejected: {}", key)));
        }
        self.inner.set_ex(key, value, ttl).await
    }

    async fn expire(&self, key: &str, ttl: Duration) -> StoreResult<bool> {
        self.inner.expire(key, ttl).await
    }

    async fn ttl(&self, key: &str) -> StoreResult<Option<Duration>> {
        self.inner.ttl(key).await
    }

    async fn del(&self, keys: &[String]) -> StoreResult<u64> {
        self.inner.del(keys).await
    }

    async fn keys(&self, pattern: &str) -> StoreResult<Vec<String>> {
        self.check_read()?;
        self.inner.keys(pattern).await
    }

    async fn scan_match(&self, pattern: &str) -> StoreResult<Vec<String>> {
        self.check_read()?;
        self.inner.scan_match(pattern).await
    }

    async fn key_type(&self, key: &str) -> StoreResult<KeyType> {
        self.inner.key_type(key).await
    }

    async fn rpush(&self, key: &str, values: &[String]) -> StoreResult<()> {
        self.inner.rpush(key, values).await
    }

    async fn lrange_all(&self, key: &str) -> StoreResult<Vec<String>> {
        self.inner.lrange_all(key).await
    }

    async fn llen(&self, key: &str) -> StoreResult<u64> {
        self.inner.llen(key).await
    }

    async fn sadd(&self, key: &str, members: &[String]) -> StoreResult<()> {
        self.inner.sadd(key, members).await
    }

    async fn smembers(&self, key: &str) -> StoreResult<Vec<String>> {
        self.inner.smembers(key).await
    }

    async fn scard(&self, key: &str) -> StoreResult<u64> {
        self.inner.scard(key).await
    }

    async fn hset_all(&self, key: &str, fields: &BTreeMap<String, String>) -> StoreResult<()> {
        self.inner.hset_all(key, fields).await
    }

    async fn hgetall(&self, key: &str) -> StoreResult<BTreeMap<String, String>> {
        self.inner.hgetall(key).await
    }

    async fn hlen(&self, key: &str) -> StoreResult<u64> {
        self.inner.hlen(key).await
    }

    async fn zadd(&self, key: &str, member: &str, score: f64) -> StoreResult<()> {
        self.inner.zadd(key, member, score).await
    }

    async fn zrange_with_scores(&self, key: &str) -> StoreResult<Vec<(String, f64)>> {
        self.inner.zrange_with_scores(key).await
    }

    async fn zcard(&self, key: &str) -> StoreResult<u64> {
        self.inner.zcard(key).await
    }
}
