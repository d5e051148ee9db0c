use std::sync::Arc;

use crate::models::matchmaking::queue_key;
use crate::repositories::errors::StoreError;
use crate::repositories::live_store::LiveStore;

/// One sorted set per game type, keyed `match-making-queue:<gameType>`,
/// score = rating. Membership is the source of truth for "available to be
/// paired".
#[derive(Clone)]
pub struct MatchQueueRepository {
    store: Arc<dyn LiveStore>,
}

impl MatchQueueRepository {
    pub fn new(store: Arc<dyn LiveStore>) -> MatchQueueRepository {
        MatchQueueRepository { store }
    }

    pub async fn join(
        &self,
        game_type: &str,
        player_id: &str,
        rating: i32,
    ) -> Result<(), StoreError> {
        self.store
            .zadd(&queue_key(game_type), player_id, rating as f64)
            .await
    }

    pub async fn leave(&self, game_type: &str, player_id: &str) -> Result<(), StoreError> {
        self.store.zrem(&queue_key(game_type), player_id).await
    }

    /// Candidates within `[rating - range, rating + range]`, ascending by
    /// rating. Non-destructive.
    pub async fn candidates_in_range(
        &self,
        game_type: &str,
        rating: i32,
        range: i32,
    ) -> Result<Vec<(String, i32)>, StoreError> {
        let members = self
            .store
            .zrange_by_score(
                &queue_key(game_type),
                (rating - range) as f64,
                (rating + range) as f64,
            )
            .await?;
        Ok(members
            .into_iter()
            .map(|(member, score)| (member, score as i32))
            .collect())
    }

    /// Non-destructive membership check.
    pub async fn contains(&self, game_type: &str, player_id: &str) -> Result<bool, StoreError> {
        Ok(self
            .store
            .zscore(&queue_key(game_type), player_id)
            .await?
            .is_some())
    }

    /// Atomic check-and-remove; true iff this call dequeued the player.
    pub async fn take(&self, game_type: &str, player_id: &str) -> Result<bool, StoreError> {
        self.store
            .remove_if_member(&queue_key(game_type), player_id)
            .await
    }

    pub async fn depth(&self, game_type: &str) -> Result<u64, StoreError> {
        self.store.zcard(&queue_key(game_type)).await
    }
}
