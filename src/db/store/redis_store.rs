//! Redis implementation of [`KvStore`].
//!
//! Every key is namespaced with `<env>-` when an environment is configured so
//! development and production data can share one Redis instance.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use redis::AsyncCommands;

use super::{KeyType, KvStore, StoreError, StoreResult};

const SCAN_BATCH: usize = 200;

/// Maps Redis errors to StoreError.
pub fn map_redis_error(err: redis::RedisError) -> StoreError {
    if err.is_connection_refusal()
        || err.is_timeout()
        || err.is_connection_dropped()
        || err.is_io_error()
    {
        StoreError::ConnectionFailed(err.to_string())
    } else {
        StoreError::OperationFailed(err.to_string())
    }
}

/// Redis store backed by a connection manager (reconnects automatically).
#[derive(Clone)]
pub struct RedisStore {
    conn: redis::aio::ConnectionManager,
    prefix: Option<String>,
}

impl RedisStore {
    /// Connects to `url` and namespaces keys with `<env>-` when `env` is set.
    pub async fn connect(url: &str, env: Option<&str>) -> StoreResult<Self> {
        let client = redis::Client::open(url).map_err(map_redis_error)?;
        let conn = redis::aio::ConnectionManager::new(client)
            .await
            .map_err(map_redis_error)?;

        Ok(Self {
            conn,
            prefix: env.filter(|e| !e.is_empty()).map(str::to_string),
        })
    }

    fn full_key(&self, key: &str) -> String {
        prefixed_key(self.prefix.as_deref(), key)
    }

    fn strip_prefix(&self, key: String) -> String {
        unprefixed_key(self.prefix.as_deref(), key)
    }
}

fn prefixed_key(prefix: Option<&str>, key: &str) -> String {
    match prefix {
        Some(prefix) => format!("{}-{}", prefix, key),
        None => key.to_string(),
    }
}

/// Keys outside the namespace come back untouched.
fn unprefixed_key(prefix: Option<&str>, key: String) -> String {
    match prefix {
        Some(prefix) => key
            .strip_prefix(prefix)
            .and_then(|rest| rest.strip_prefix('-'))
            .map(str::to_string)
            .unwrap_or(key),
        None => key,
    }
}

#[async_trait]
impl KvStore for RedisStore {
    fn prefix(&self) -> Option<&str> {
        self.prefix.as_deref()
    }

    async fn ping(&self) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(map_redis_error)?;
        Ok(())
    }

    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let mut conn = self.conn.clone();
        conn.get(self.full_key(key)).await.map_err(map_redis_error)
    }

    async fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        conn.set::<_, _, ()>(self.full_key(key), value)
            .await
            .map_err(map_redis_error)
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        let seconds = ttl.as_secs().max(1);
        conn.set_ex::<_, _, ()>(self.full_key(key), value, seconds)
            .await
            .map_err(map_redis_error)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> StoreResult<bool> {
        let mut conn = self.conn.clone();
        let seconds = ttl.as_secs().max(1) as i64;
        conn.expire(self.full_key(key), seconds)
            .await
            .map_err(map_redis_error)
    }

    async fn ttl(&self, key: &str) -> StoreResult<Option<Duration>> {
        let mut conn = self.conn.clone();
        // -2: missing key, -1: no expiry
        let seconds: i64 = conn
            .ttl(self.full_key(key))
            .await
            .map_err(map_redis_error)?;
        Ok((seconds >= 0).then(|| Duration::from_secs(seconds as u64)))
    }

    async fn del(&self, keys: &[String]) -> StoreResult<u64> {
        if keys.is_empty() {
            return Ok(0);
        }
        let mut conn = self.conn.clone();
        let full: Vec<String> = keys.iter().map(|k| self.full_key(k)).collect();
        conn.del(full).await.map_err(map_redis_error)
    }

    async fn keys(&self, pattern: &str) -> StoreResult<Vec<String>> {
        let mut conn = self.conn.clone();
        let found: Vec<String> = conn
            .keys(self.full_key(pattern))
            .await
            .map_err(map_redis_error)?;
        Ok(found.into_iter().map(|k| self.strip_prefix(k)).collect())
    }

    async fn scan_match(&self, pattern: &str) -> StoreResult<Vec<String>> {
        let mut conn = self.conn.clone();
        let full_pattern = self.full_key(pattern);
        let mut cursor: u64 = 0;
        let mut found = Vec::new();

        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&full_pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(&mut conn)
                .await
                .map_err(map_redis_error)?;

            found.extend(batch.into_iter().map(|k| self.strip_prefix(k)));

            if next == 0 {
                break;
            }
            cursor = next;
        }

        // SCAN may return a key more than once
        found.sort();
        found.dedup();
        Ok(found)
    }

    async fn key_type(&self, key: &str) -> StoreResult<KeyType> {
        let mut conn = self.conn.clone();
        let raw: String = conn
            .key_type(self.full_key(key))
            .await
            .map_err(map_redis_error)?;
        Ok(KeyType::parse(&raw))
    }

    async fn rpush(&self, key: &str, values: &[String]) -> StoreResult<()> {
        if values.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn.clone();
        conn.rpush::<_, _, ()>(self.full_key(key), values)
            .await
            .map_err(map_redis_error)
    }

    async fn lrange_all(&self, key: &str) -> StoreResult<Vec<String>> {
        let mut conn = self.conn.clone();
        conn.lrange(self.full_key(key), 0, -1)
            .await
            .map_err(map_redis_error)
    }

    async fn llen(&self, key: &str) -> StoreResult<u64> {
        let mut conn = self.conn.clone();
        conn.llen(self.full_key(key)).await.map_err(map_redis_error)
    }

    async fn sadd(&self, key: &str, members: &[String]) -> StoreResult<()> {
        if members.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn.clone();
        conn.sadd::<_, _, ()>(self.full_key(key), members)
            .await
            .map_err(map_redis_error)
    }

    async fn smembers(&self, key: &str) -> StoreResult<Vec<String>> {
        let mut conn = self.conn.clone();
        let mut members: Vec<String> = conn
            .smembers(self.full_key(key))
            .await
            .map_err(map_redis_error)?;
        members.sort();
        Ok(members)
    }

    async fn scard(&self, key: &str) -> StoreResult<u64> {
        let mut conn = self.conn.clone();
        conn.scard(self.full_key(key)).await.map_err(map_redis_error)
    }

    async fn hset_all(&self, key: &str, fields: &BTreeMap<String, String>) -> StoreResult<()> {
        if fields.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn.clone();
        let pairs: Vec<(&String, &String)> = fields.iter().collect();
        conn.hset_multiple::<_, _, _, ()>(self.full_key(key), pairs.as_slice())
            .await
            .map_err(map_redis_error)
    }

    async fn hgetall(&self, key: &str) -> StoreResult<BTreeMap<String, String>> {
        let mut conn = self.conn.clone();
        conn.hgetall(self.full_key(key))
            .await
            .map_err(map_redis_error)
    }

    async fn hlen(&self, key: &str) -> StoreResult<u64> {
        let mut conn = self.conn.clone();
        conn.hlen(self.full_key(key)).await.map_err(map_redis_error)
    }

    async fn zadd(&self, key: &str, member: &str, score: f64) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        conn.zadd::<_, _, _, ()>(self.full_key(key), member, score)
            .await
            .map_err(map_redis_error)
    }

    async fn zrange_with_scores(&self, key: &str) -> StoreResult<Vec<(String, f64)>> {
        let mut conn = self.conn.clone();
        conn.zrange_withscores(self.full_key(key), 0, -1)
            .await
            .map_err(map_redis_error)
    }

    async fn zcard(&self, key: &str) -> StoreResult<u64> {
        let mut conn = self.conn.clone();
        conn.zcard(self.full_key(key))
            .await
            .map_err(map_redis_error)
    }
}
