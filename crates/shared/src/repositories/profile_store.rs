use async_trait::async_trait;
use aws_sdk_dynamodb::types::AttributeValue;
use aws_sdk_dynamodb::Client;
use serde_dynamo::aws_sdk_dynamodb_1::{from_item, to_item};

use crate::models::game::GameVariant;
use crate::models::player::PlayerProfile;
use crate::repositories::errors::ProfileStoreError;

#[async_trait]
pub trait UserProfileStore: Send + Sync {
    /// Fetch a profile, defaulting a fresh one for unseen players.
    async fn get_profile(&self, player_id: &str) -> Result<PlayerProfile, ProfileStoreError>;

    /// Apply a finalized game to the profile: new rating for the variant and
    /// the W/L/D counter bump. `score` is 1.0 win, 0.5 draw, 0.0 loss.
    async fn apply_game_result(
        &self,
        player_id: &str,
        variant: GameVariant,
        new_rating: i32,
        score: f64,
    ) -> Result<PlayerProfile, ProfileStoreError>;
}

pub struct DynamoDbUserProfileStore {
    client: Client,
    table_name: String,
}

impl DynamoDbUserProfileStore {
    pub fn new(client: Client) -> DynamoDbUserProfileStore {
        let table_name = std::env::var("PROFILES_TABLE")
            .expect("PROFILES_TABLE environment variable must be set");
        DynamoDbUserProfileStore { client, table_name }
    }

    async fn put_profile(&self, profile: &PlayerProfile) -> Result<(), ProfileStoreError> {
        let item =
            to_item(profile).map_err(|e| ProfileStoreError::Serialization(e.to_string()))?;
        self.client
            .put_item()
            .table_name(&self.table_name)
            .set_item(Some(item))
            .send()
            .await
            .map_err(|e| ProfileStoreError::DynamoDb(e.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl UserProfileStore for DynamoDbUserProfileStore {
    async fn get_profile(&self, player_id: &str) -> Result<PlayerProfile, ProfileStoreError> {
        let output = self
            .client
            .get_item()
            .table_name(&self.table_name)
            .key("playerId", AttributeValue::S(player_id.to_string()))
            .send()
            .await
            .map_err(|e| ProfileStoreError::DynamoDb(e.to_string()))?;

        match output.item {
            Some(item) => {
                from_item(item).map_err(|e| ProfileStoreError::Serialization(e.to_string()))
            }
            None => Ok(PlayerProfile::new(player_id)),
        }
    }

    async fn apply_game_result(
        &self,
        player_id: &str,
        variant: GameVariant,
        new_rating: i32,
        score: f64,
    ) -> Result<PlayerProfile, ProfileStoreError> {
        let mut profile = self.get_profile(player_id).await?;
        profile.ratings.set(variant, new_rating);
        profile.games_played += 1;
        if score > 0.75 {
            profile.wins += 1;
        } else if score < 0.25 {
            profile.losses += 1;
        } else {
            profile.draws += 1;
        }
        self.put_profile(&profile).await?;
        Ok(profile)
    }
}
