use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Script};

use crate::repositories::errors::StoreError;
use crate::repositories::live_store::LiveStore;

/// Deadline for any single live-store operation.
const OP_TIMEOUT: Duration = Duration::from_secs(2);

const RELEASE_LOCK_SCRIPT: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    return redis.call('DEL', KEYS[1])
end
return 0
"#;

const REMOVE_IF_MEMBER_SCRIPT: &str = r#"
if redis.call('ZSCORE', KEYS[1], ARGV[1]) then
    return redis.call('ZREM', KEYS[1], ARGV[1])
end
return 0
"#;

const FLIP_FLAG_SCRIPT: &str = r#"
if redis.call('HGET', KEYS[1], ARGV[1]) == 'true' then
    return 0
end
redis.call('HSET', KEYS[1], ARGV[1], 'true')
return 1
"#;

pub struct RedisLiveStore {
    conn: MultiplexedConnection,
    release_lock: Script,
    remove_if_member: Script,
    flip_flag: Script,
}

impl RedisLiveStore {
    pub async fn connect(url: &str) -> Result<RedisLiveStore, StoreError> {
        let client =
            redis::Client::open(url).map_err(|e| StoreError::Unavailable(e.to_string()))?;
        let conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        Ok(RedisLiveStore::new(conn))
    }

    pub fn new(conn: MultiplexedConnection) -> RedisLiveStore {
        RedisLiveStore {
            conn,
            release_lock: Script::new(RELEASE_LOCK_SCRIPT),
            remove_if_member: Script::new(REMOVE_IF_MEMBER_SCRIPT),
            flip_flag: Script::new(FLIP_FLAG_SCRIPT),
        }
    }

    async fn bounded<T, F>(fut: F) -> Result<T, StoreError>
    where
        F: Future<Output = redis::RedisResult<T>>,
    {
        match tokio::time::timeout(OP_TIMEOUT, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(StoreError::Unavailable(e.to_string())),
            Err(_) => Err(StoreError::Unavailable("operation timed out".to_string())),
        }
    }
}

#[async_trait]
impl LiveStore for RedisLiveStore {
    async fn hash_set(&self, key: &str, fields: Vec<(String, String)>) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        Self::bounded(async move { conn.hset_multiple(key, &fields).await }).await
    }

    async fn hash_get_all(&self, key: &str) -> Result<HashMap<String, String>, StoreError> {
        let mut conn = self.conn.clone();
        Self::bounded(async move { conn.hgetall(key).await }).await
    }

    async fn hash_set_field(&self, key: &str, field: &str, value: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        Self::bounded(async move { conn.hset(key, field, value).await }).await
    }

    async fn expire(&self, key: &str, ttl_secs: u64) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        Self::bounded(async move { conn.expire(key, ttl_secs as i64).await }).await
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.conn.clone();
        Self::bounded(async move { conn.get(key).await }).await
    }

    async fn set(&self, key: &str, value: &str, ttl_secs: Option<u64>) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        match ttl_secs {
            Some(ttl) => Self::bounded(async move { conn.set_ex(key, value, ttl).await }).await,
            None => Self::bounded(async move { conn.set(key, value).await }).await,
        }
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        Self::bounded(async move { conn.del(key).await }).await
    }

    async fn zadd(&self, key: &str, member: &str, score: f64) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        Self::bounded(async move { conn.zadd(key, member, score).await }).await
    }

    async fn zrem(&self, key: &str, member: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        Self::bounded(async move { conn.zrem(key, member).await }).await
    }

    async fn zrange_by_score(
        &self,
        key: &str,
        min: f64,
        max: f64,
    ) -> Result<Vec<(String, f64)>, StoreError> {
        let mut conn = self.conn.clone();
        Self::bounded(async move { conn.zrangebyscore_withscores(key, min, max).await }).await
    }

    async fn zscore(&self, key: &str, member: &str) -> Result<Option<f64>, StoreError> {
        let mut conn = self.conn.clone();
        Self::bounded(async move { conn.zscore(key, member).await }).await
    }

    async fn zcard(&self, key: &str) -> Result<u64, StoreError> {
        let mut conn = self.conn.clone();
        Self::bounded(async move { conn.zcard(key).await }).await
    }

    async fn acquire_lock(
        &self,
        key: &str,
        token: &str,
        ttl_secs: u64,
    ) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        let reply: Option<String> = Self::bounded(async move {
            redis::cmd("SET")
                .arg(key)
                .arg(token)
                .arg("NX")
                .arg("EX")
                .arg(ttl_secs)
                .query_async(&mut conn)
                .await
        })
        .await?;
        Ok(reply.is_some())
    }

    async fn release_lock(&self, key: &str, token: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let mut invocation = self.release_lock.key(key);
        invocation.arg(token);
        let _: i64 = Self::bounded(invocation.invoke_async(&mut conn)).await?;
        Ok(())
    }

    async fn remove_if_member(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        let mut invocation = self.remove_if_member.key(key);
        invocation.arg(member);
        let removed: i64 = Self::bounded(invocation.invoke_async(&mut conn)).await?;
        Ok(removed == 1)
    }

    async fn flip_flag(&self, key: &str, field: &str) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        let mut invocation = self.flip_flag.key(key);
        invocation.arg(field);
        let won: i64 = Self::bounded(invocation.invoke_async(&mut conn)).await?;
        Ok(won == 1)
    }

    async fn scan_keys(&self, pattern: &str) -> Result<Vec<String>, StoreError> {
        let mut conn = self.conn.clone();
        Self::bounded(async move {
            let mut keys = Vec::new();
            let mut iter = conn.scan_match::<_, String>(pattern).await?;
            while let Some(key) = iter.next_item().await {
                keys.push(key);
            }
            Ok(keys)
        })
        .await
    }
}
