use std::sync::Arc;

use crate::models::matchmaking::presence_key;
use crate::models::player::Presence;
use crate::repositories::errors::StoreError;
use crate::repositories::live_store::LiveStore;

/// Ephemeral presence hash, keyed `player:<playerId>`. Created on connect,
/// deleted on disconnect or on match.
#[derive(Clone)]
pub struct PresenceRepository {
    store: Arc<dyn LiveStore>,
}

impl PresenceRepository {
    pub fn new(store: Arc<dyn LiveStore>) -> PresenceRepository {
        PresenceRepository { store }
    }

    pub async fn put(&self, presence: &Presence) -> Result<(), StoreError> {
        let fields = vec![
            ("playerId".to_string(), presence.player_id.clone()),
            ("wsId".to_string(), presence.ws_id.clone()),
            ("rating".to_string(), presence.rating.to_string()),
            (
                "isPlayerConnected".to_string(),
                presence.is_player_connected.to_string(),
            ),
        ];
        self.store
            .hash_set(&presence_key(&presence.player_id), fields)
            .await
    }

    pub async fn get(&self, player_id: &str) -> Result<Option<Presence>, StoreError> {
        let fields = self.store.hash_get_all(&presence_key(player_id)).await?;
        if fields.is_empty() {
            return Ok(None);
        }
        let rating = fields
            .get("rating")
            .and_then(|v| v.parse::<i32>().ok())
            .ok_or_else(|| StoreError::Serialization("bad presence rating".to_string()))?;
        Ok(Some(Presence {
            player_id: fields
                .get("playerId")
                .cloned()
                .unwrap_or_else(|| player_id.to_string()),
            ws_id: fields.get("wsId").cloned().unwrap_or_default(),
            rating,
            is_player_connected: fields.get("isPlayerConnected").map(String::as_str)
                == Some("true"),
        }))
    }

    pub async fn delete(&self, player_id: &str) -> Result<(), StoreError> {
        self.store.delete(&presence_key(player_id)).await
    }

    pub async fn set_connected(&self, player_id: &str, connected: bool) -> Result<(), StoreError> {
        self.store
            .hash_set_field(
                &presence_key(player_id),
                "isPlayerConnected",
                if connected { "true" } else { "false" },
            )
            .await
    }
}
