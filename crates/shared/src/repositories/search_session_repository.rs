use std::sync::Arc;

use crate::models::matchmaking::{session_key, SearchSession, SEARCH_SESSION_TTL_SECS};
use crate::repositories::errors::StoreError;
use crate::repositories::live_store::LiveStore;

/// Search sessions, keyed `search_session:<playerId>` as a JSON string with a
/// 300 s TTL. At most one session exists per player; the TTL bounds orphans.
#[derive(Clone)]
pub struct SearchSessionRepository {
    store: Arc<dyn LiveStore>,
}

impl SearchSessionRepository {
    pub fn new(store: Arc<dyn LiveStore>) -> SearchSessionRepository {
        SearchSessionRepository { store }
    }

    pub async fn put(&self, session: &SearchSession) -> Result<(), StoreError> {
        let body = serde_json::to_string(session)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        self.store
            .set(
                &session_key(&session.player_id),
                &body,
                Some(SEARCH_SESSION_TTL_SECS),
            )
            .await
    }

    pub async fn get(&self, player_id: &str) -> Result<Option<SearchSession>, StoreError> {
        match self.store.get(&session_key(player_id)).await? {
            Some(body) => serde_json::from_str(&body)
                .map(Some)
                .map_err(|e| StoreError::Serialization(e.to_string())),
            None => Ok(None),
        }
    }

    pub async fn delete(&self, player_id: &str) -> Result<(), StoreError> {
        self.store.delete(&session_key(player_id)).await
    }

    pub async fn count(&self) -> Result<usize, StoreError> {
        Ok(self.store.scan_keys("search_session:*").await?.len())
    }
}
