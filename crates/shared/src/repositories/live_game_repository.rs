use std::sync::Arc;

use crate::models::game::{LiveGame, LIVE_GAME_TTL_SECS};
use crate::models::matchmaking::live_game_key;
use crate::repositories::errors::StoreError;
use crate::repositories::live_store::LiveStore;

/// Authoritative live-game hash, keyed `game:<gameId>` with a 7200 s TTL.
#[derive(Clone)]
pub struct LiveGameRepository {
    store: Arc<dyn LiveStore>,
}

impl LiveGameRepository {
    pub fn new(store: Arc<dyn LiveStore>) -> LiveGameRepository {
        LiveGameRepository { store }
    }

    pub async fn save(&self, game: &LiveGame) -> Result<(), StoreError> {
        let key = live_game_key(&game.game_id);
        let fields = game
            .to_fields()
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        self.store.hash_set(&key, fields).await?;
        self.store.expire(&key, LIVE_GAME_TTL_SECS).await
    }

    pub async fn load(&self, game_id: &str) -> Result<Option<LiveGame>, StoreError> {
        let fields = self.store.hash_get_all(&live_game_key(game_id)).await?;
        if fields.is_empty() {
            return Ok(None);
        }
        LiveGame::from_fields(&fields)
            .map(Some)
            .map_err(StoreError::Serialization)
    }

    /// Atomic false-to-true flip of the `gameOver` field: the finalization
    /// guard. Only the caller that wins the flip runs rating updates.
    pub async fn claim_finalization(&self, game_id: &str) -> Result<bool, StoreError> {
        self.store
            .flip_flag(&live_game_key(game_id), "gameOver")
            .await
    }

    pub async fn delete(&self, game_id: &str) -> Result<(), StoreError> {
        self.store.delete(&live_game_key(game_id)).await
    }

    /// Game ids of every live game currently in the store. Restart/rescan
    /// path only.
    pub async fn active_game_ids(&self) -> Result<Vec<String>, StoreError> {
        let keys = self.store.scan_keys("game:*").await?;
        Ok(keys
            .into_iter()
            .filter_map(|k| k.strip_prefix("game:").map(|s| s.to_string()))
            .collect())
    }
}
