use std::collections::HashMap;

use async_trait::async_trait;

use crate::repositories::errors::StoreError;

/// KV abstraction over the live store: hashes, strings, sorted sets, TTLs,
/// and the three atomic primitives the core's critical sections rely on.
/// Every operation completes within a bounded deadline; a blown deadline or a
/// broken connection surfaces as [`StoreError::Unavailable`]. No ordering is
/// guaranteed across keys.
#[async_trait]
pub trait LiveStore: Send + Sync {
    async fn hash_set(&self, key: &str, fields: Vec<(String, String)>) -> Result<(), StoreError>;

    async fn hash_get_all(&self, key: &str) -> Result<HashMap<String, String>, StoreError>;

    async fn hash_set_field(&self, key: &str, field: &str, value: &str) -> Result<(), StoreError>;

    async fn expire(&self, key: &str, ttl_secs: u64) -> Result<(), StoreError>;

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    async fn set(&self, key: &str, value: &str, ttl_secs: Option<u64>) -> Result<(), StoreError>;

    async fn delete(&self, key: &str) -> Result<(), StoreError>;

    async fn zadd(&self, key: &str, member: &str, score: f64) -> Result<(), StoreError>;

    async fn zrem(&self, key: &str, member: &str) -> Result<(), StoreError>;

    /// Members with score in `[min, max]`, ascending by score.
    async fn zrange_by_score(
        &self,
        key: &str,
        min: f64,
        max: f64,
    ) -> Result<Vec<(String, f64)>, StoreError>;

    async fn zscore(&self, key: &str, member: &str) -> Result<Option<f64>, StoreError>;

    async fn zcard(&self, key: &str) -> Result<u64, StoreError>;

    /// Set-if-absent with TTL: the cross-node claim primitive. Returns true
    /// iff this caller created the key.
    async fn acquire_lock(&self, key: &str, token: &str, ttl_secs: u64)
        -> Result<bool, StoreError>;

    /// Delete the lock only if it still holds this caller's token.
    async fn release_lock(&self, key: &str, token: &str) -> Result<(), StoreError>;

    /// Atomic check-and-remove on a sorted set. Returns true iff the member
    /// existed and was removed by this call.
    async fn remove_if_member(&self, key: &str, member: &str) -> Result<bool, StoreError>;

    /// Atomic false-to-true transition of a hash field. Returns true iff this
    /// call won the flip; the finalization guard.
    async fn flip_flag(&self, key: &str, field: &str) -> Result<bool, StoreError>;

    /// Keys matching a glob pattern. Used to rebuild node-local state after a
    /// restart; never on the per-move hot path.
    async fn scan_keys(&self, pattern: &str) -> Result<Vec<String>, StoreError>;
}
