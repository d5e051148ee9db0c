use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;

use crate::repositories::errors::StoreError;
use crate::repositories::live_store::LiveStore;

#[derive(Debug, Clone)]
enum Entry {
    Str(String),
    Hash(HashMap<String, String>),
    ZSet(BTreeMap<String, f64>),
}

#[derive(Default)]
struct Inner {
    entries: HashMap<String, Entry>,
    expiries: HashMap<String, Instant>,
}

impl Inner {
    fn evict_expired(&mut self, key: &str) {
        if let Some(deadline) = self.expiries.get(key) {
            if Instant::now() >= *deadline {
                self.entries.remove(key);
                self.expiries.remove(key);
            }
        }
    }
}

/// In-process [`LiveStore`] with the same semantics as the Redis-backed one,
/// including TTLs and the atomic primitives. Backs tests, local development,
/// and the degraded single-node mode.
#[derive(Default)]
pub struct InMemoryLiveStore {
    inner: Mutex<Inner>,
}

impl InMemoryLiveStore {
    pub fn new() -> InMemoryLiveStore {
        InMemoryLiveStore::default()
    }
}

#[async_trait]
impl LiveStore for InMemoryLiveStore {
    async fn hash_set(&self, key: &str, fields: Vec<(String, String)>) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        inner.evict_expired(key);
        let entry = inner
            .entries
            .entry(key.to_string())
            .or_insert_with(|| Entry::Hash(HashMap::new()));
        if let Entry::Hash(map) = entry {
            map.extend(fields);
        }
        Ok(())
    }

    async fn hash_get_all(&self, key: &str) -> Result<HashMap<String, String>, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        inner.evict_expired(key);
        Ok(match inner.entries.get(key) {
            Some(Entry::Hash(map)) => map.clone(),
            _ => HashMap::new(),
        })
    }

    async fn hash_set_field(&self, key: &str, field: &str, value: &str) -> Result<(), StoreError> {
        self.hash_set(key, vec![(field.to_string(), value.to_string())])
            .await
    }

    async fn expire(&self, key: &str, ttl_secs: u64) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.entries.contains_key(key) {
            inner
                .expiries
                .insert(key.to_string(), Instant::now() + Duration::from_secs(ttl_secs));
        }
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        inner.evict_expired(key);
        Ok(match inner.entries.get(key) {
            Some(Entry::Str(value)) => Some(value.clone()),
            _ => None,
        })
    }

    async fn set(&self, key: &str, value: &str, ttl_secs: Option<u64>) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        inner
            .entries
            .insert(key.to_string(), Entry::Str(value.to_string()));
        match ttl_secs {
            Some(ttl) => {
                inner
                    .expiries
                    .insert(key.to_string(), Instant::now() + Duration::from_secs(ttl));
            }
            None => {
                inner.expiries.remove(key);
            }
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        inner.entries.remove(key);
        inner.expiries.remove(key);
        Ok(())
    }

    async fn zadd(&self, key: &str, member: &str, score: f64) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        inner.evict_expired(key);
        let entry = inner
            .entries
            .entry(key.to_string())
            .or_insert_with(|| Entry::ZSet(BTreeMap::new()));
        if let Entry::ZSet(set) = entry {
            set.insert(member.to_string(), score);
        }
        Ok(())
    }

    async fn zrem(&self, key: &str, member: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(Entry::ZSet(set)) = inner.entries.get_mut(key) {
            set.remove(member);
        }
        Ok(())
    }

    async fn zrange_by_score(
        &self,
        key: &str,
        min: f64,
        max: f64,
    ) -> Result<Vec<(String, f64)>, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        inner.evict_expired(key);
        let mut members: Vec<(String, f64)> = match inner.entries.get(key) {
            Some(Entry::ZSet(set)) => set
                .iter()
                .filter(|(_, score)| **score >= min && **score <= max)
                .map(|(member, score)| (member.clone(), *score))
                .collect(),
            _ => Vec::new(),
        };
        members.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap().then_with(|| a.0.cmp(&b.0)));
        Ok(members)
    }

    async fn zscore(&self, key: &str, member: &str) -> Result<Option<f64>, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        inner.evict_expired(key);
        Ok(match inner.entries.get(key) {
            Some(Entry::ZSet(set)) => set.get(member).copied(),
            _ => None,
        })
    }

    async fn zcard(&self, key: &str) -> Result<u64, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        inner.evict_expired(key);
        Ok(match inner.entries.get(key) {
            Some(Entry::ZSet(set)) => set.len() as u64,
            _ => 0,
        })
    }

    async fn acquire_lock(
        &self,
        key: &str,
        token: &str,
        ttl_secs: u64,
    ) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        inner.evict_expired(key);
        if inner.entries.contains_key(key) {
            return Ok(false);
        }
        inner
            .entries
            .insert(key.to_string(), Entry::Str(token.to_string()));
        inner
            .expiries
            .insert(key.to_string(), Instant::now() + Duration::from_secs(ttl_secs));
        Ok(true)
    }

    async fn release_lock(&self, key: &str, token: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        if matches!(inner.entries.get(key), Some(Entry::Str(held)) if held == token) {
            inner.entries.remove(key);
            inner.expiries.remove(key);
        }
        Ok(())
    }

    async fn remove_if_member(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        inner.evict_expired(key);
        if let Some(Entry::ZSet(set)) = inner.entries.get_mut(key) {
            return Ok(set.remove(member).is_some());
        }
        Ok(false)
    }

    async fn flip_flag(&self, key: &str, field: &str) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        inner.evict_expired(key);
        let entry = inner
            .entries
            .entry(key.to_string())
            .or_insert_with(|| Entry::Hash(HashMap::new()));
        if let Entry::Hash(map) = entry {
            if map.get(field).map(String::as_str) == Some("true") {
                return Ok(false);
            }
            map.insert(field.to_string(), "true".to_string());
            return Ok(true);
        }
        Ok(false)
    }

    async fn scan_keys(&self, pattern: &str) -> Result<Vec<String>, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let keys: Vec<String> = inner.entries.keys().cloned().collect();
        for key in &keys {
            inner.evict_expired(key);
        }
        let prefix = pattern.trim_end_matches('*');
        Ok(inner
            .entries
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn lock_is_exclusive_until_released() {
        let store = InMemoryLiveStore::new();
        assert!(store.acquire_lock("lock:a", "t1", 5).await.unwrap());
        assert!(!store.acquire_lock("lock:a", "t2", 5).await.unwrap());

        // A non-holder cannot release it.
        store.release_lock("lock:a", "t2").await.unwrap();
        assert!(!store.acquire_lock("lock:a", "t2", 5).await.unwrap());

        store.release_lock("lock:a", "t1").await.unwrap();
        assert!(store.acquire_lock("lock:a", "t2", 5).await.unwrap());
    }

    #[tokio::test]
    async fn remove_if_member_reports_prior_membership() {
        let store = InMemoryLiveStore::new();
        store.zadd("q", "alice", 1200.0).await.unwrap();
        assert!(store.remove_if_member("q", "alice").await.unwrap());
        assert!(!store.remove_if_member("q", "alice").await.unwrap());
    }

    #[tokio::test]
    async fn flip_flag_has_a_single_winner() {
        let store = InMemoryLiveStore::new();
        assert!(store.flip_flag("game:g", "gameOver").await.unwrap());
        assert!(!store.flip_flag("game:g", "gameOver").await.unwrap());
    }

    #[tokio::test]
    async fn zrange_orders_by_score() {
        let store = InMemoryLiveStore::new();
        store.zadd("q", "c", 1300.0).await.unwrap();
        store.zadd("q", "a", 1100.0).await.unwrap();
        store.zadd("q", "b", 1200.0).await.unwrap();
        let members = store.zrange_by_score("q", 1150.0, 1400.0).await.unwrap();
        assert_eq!(
            members,
            vec![("b".to_string(), 1200.0), ("c".to_string(), 1300.0)]
        );
    }
}
