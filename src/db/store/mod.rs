//! Key-value store abstraction.
//!
//! `KvStore` is the narrow surface the sync pipeline and the admin commands
//! need from Redis. Keys passed in and returned out are always un-prefixed;
//! implementations apply the environment prefix (`dev-`, `prod-`, ...) themselves.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;

pub mod memory_store;
pub mod redis_store;
#[cfg(test)]
pub mod testing;

pub use memory_store::MemoryStore;
pub use redis_store::RedisStore;

/// Errors that can occur during store operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("Store connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Store operation failed: {0}")]
    OperationFailed(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl StoreError {
    /// Connection-level failures are worth retrying; everything else is not.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::ConnectionFailed(_))
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Redis value type as reported by `TYPE`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyType {
    String,
    List,
    Set,
    ZSet,
    Hash,
    None,
    Other(String),
}

impl KeyType {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "string" => KeyType::String,
            "list" => KeyType::List,
            "set" => KeyType::Set,
            "zset" => KeyType::ZSet,
            "hash" => KeyType::Hash,
            "none" => KeyType::None,
            other => KeyType::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            KeyType::String => "string",
            KeyType::List => "list",
            KeyType::Set => "set",
            KeyType::ZSet => "zset",
            KeyType::Hash => "hash",
            KeyType::None => "none",
            KeyType::Other(other) => other,
        }
    }
}

#[async_trait]
pub trait KvStore: Send + Sync {
    /// Environment name keys are prefixed with (`<env>-<key>`), if any.
    fn prefix(&self) -> Option<&str>;

    async fn ping(&self) -> StoreResult<()>;

    async fn get(&self, key: &str) -> StoreResult<Option<String>>;

    async fn set(&self, key: &str, value: &str) -> StoreResult<()>;

    /// `SET` with an expiry. TTLs below one second are rounded up.
    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<()>;

    /// Returns `false` when the key does not exist.
    async fn expire(&self, key: &str, ttl: Duration) -> StoreResult<bool>;

    /// Remaining time to live; `None` for missing keys and keys without expiry.
    async fn ttl(&self, key: &str) -> StoreResult<Option<Duration>>;

    /// Deletes the given keys and returns how many existed.
    async fn del(&self, keys: &[String]) -> StoreResult<u64>;

    /// Glob-style `KEYS` lookup. Blocks Redis on large keyspaces; admin use only.
    async fn keys(&self, pattern: &str) -> StoreResult<Vec<String>>;

    /// Cursor-based equivalent of `keys`.
    async fn scan_match(&self, pattern: &str) -> StoreResult<Vec<String>>;

    async fn key_type(&self, key: &str) -> StoreResult<KeyType>;

    /// `RPUSH`; a no-op for an empty slice.
    async fn rpush(&self, key: &str, values: &[String]) -> StoreResult<()>;

    /// The whole list, head first.
    async fn lrange_all(&self, key: &str) -> StoreResult<Vec<String>>;

    async fn llen(&self, key: &str) -> StoreResult<u64>;

    /// `SADD`; a no-op for an empty slice.
    async fn sadd(&self, key: &str, members: &[String]) -> StoreResult<()>;

    /// Set members in lexicographic order.
    async fn smembers(&self, key: &str) -> StoreResult<Vec<String>>;

    async fn scard(&self, key: &str) -> StoreResult<u64>;

    /// `HSET` of every field; a no-op for an empty map.
    async fn hset_all(&self, key: &str, fields: &BTreeMap<String, String>) -> StoreResult<()>;

    async fn hgetall(&self, key: &str) -> StoreResult<BTreeMap<String, String>>;

    async fn hlen(&self, key: &str) -> StoreResult<u64>;

    async fn zadd(&self, key: &str, member: &str, score: f64) -> StoreResult<()>;

    /// All members of a sorted set in ascending score order.
    async fn zrange_with_scores(&self, key: &str) -> StoreResult<Vec<(String, f64)>>;

    async fn zcard(&self, key: &str) -> StoreResult<u64>;
}

/// Checks whether a key matches a glob pattern where `*` matches any run of
/// characters and `?` matches exactly one.
pub fn pattern_matches(pattern: &str, key: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let k: Vec<char> = key.chars().collect();

    let (mut pi, mut ki) = (0usize, 0usize);
    let mut star: Option<usize> = None;
    let mut star_ki = 0usize;

    while ki < k.len() {
        if pi < p.len() && (p[pi] == '?' || p[pi] == k[ki]) {
            pi += 1;
            ki += 1;
        } else if pi < p.len() && p[pi] == '*' {
            star = Some(pi);
            star_ki = ki;
            pi += 1;
        } else if let Some(s) = star {
            // backtrack: let the last `*` swallow one more character
            pi = s + 1;
            star_ki += 1;
            ki = star_ki;
        } else {
            return false;
        }
    }

    while pi < p.len() && p[pi] == '*' {
        pi += 1;
    }

    pi == p.len()
}
