use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::models::game::GameVariant;
use crate::models::player::PlayerProfile;
use crate::repositories::errors::ProfileStoreError;
use crate::repositories::profile_store::UserProfileStore;

/// In-process profile store for tests and local development.
#[derive(Default)]
pub struct InMemoryUserProfileStore {
    profiles: Mutex<HashMap<String, PlayerProfile>>,
}

impl InMemoryUserProfileStore {
    pub fn new() -> InMemoryUserProfileStore {
        InMemoryUserProfileStore::default()
    }

    pub fn seed(&self, profile: PlayerProfile) {
        self.profiles
            .lock()
            .unwrap()
            .insert(profile.player_id.clone(), profile);
    }
}

#[async_trait]
impl UserProfileStore for InMemoryUserProfileStore {
    async fn get_profile(&self, player_id: &str) -> Result<PlayerProfile, ProfileStoreError> {
        Ok(self
            .profiles
            .lock()
            .unwrap()
            .get(player_id)
            .cloned()
            .unwrap_or_else(|| PlayerProfile::new(player_id)))
    }

    async fn apply_game_result(
        &self,
        player_id: &str,
        variant: GameVariant,
        new_rating: i32,
        score: f64,
    ) -> Result<PlayerProfile, ProfileStoreError> {
        let mut profiles = self.profiles.lock().unwrap();
        let profile = profiles
            .entry(player_id.to_string())
            .or_insert_with(|| PlayerProfile::new(player_id));
        profile.ratings.set(variant, new_rating);
        profile.games_played += 1;
        if score > 0.75 {
            profile.wins += 1;
        } else if score < 0.25 {
            profile.losses += 1;
        } else {
            profile.draws += 1;
        }
        Ok(profile.clone())
    }
}
