use async_trait::async_trait;
use aws_sdk_dynamodb::types::AttributeValue;
use aws_sdk_dynamodb::Client;
use serde::{Deserialize, Serialize};
use serde_dynamo::aws_sdk_dynamodb_1::{from_item, to_attribute_value, to_item};
use tracing::warn;

use crate::models::durable::{DurableGame, GameResultDoc};
use crate::models::game::{Color, MoveRecord};
use crate::repositories::errors::GameStoreError;

/// Per-player row in the games-by-player table, newest first on query.
/// Carries exactly what color assignment needs from a player's history.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameSummary {
    pub player_id: String,
    pub started_at: i64,
    pub game_id: String,
    pub color: Color,
}

#[async_trait]
pub trait GameStore: Send + Sync {
    /// Write the skeleton document if it does not exist yet.
    async fn upsert_skeleton(&self, game: &DurableGame) -> Result<(), GameStoreError>;

    async fn append_move(
        &self,
        game_id: &str,
        mv: &MoveRecord,
        pgn: &str,
        fen_snapshot: Option<&str>,
    ) -> Result<(), GameStoreError>;

    async fn complete_game(
        &self,
        game_id: &str,
        result: &GameResultDoc,
        ended_at: i64,
        final_pgn: &str,
    ) -> Result<(), GameStoreError>;

    async fn set_post_rating(
        &self,
        game_id: &str,
        player_id: &str,
        post_rating: i32,
    ) -> Result<(), GameStoreError>;

    async fn link_rematch(
        &self,
        game_id: &str,
        rematch_game_id: &str,
    ) -> Result<(), GameStoreError>;

    async fn get_game(&self, game_id: &str) -> Result<Option<DurableGame>, GameStoreError>;

    /// A player's most recent completed or ongoing games, newest first.
    async fn recent_games(
        &self,
        player_id: &str,
        limit: usize,
    ) -> Result<Vec<GameSummary>, GameStoreError>;
}

pub struct DynamoDbGameStore {
    client: Client,
    games_table: String,
    games_by_player_table: String,
}

impl DynamoDbGameStore {
    pub fn new(client: Client) -> DynamoDbGameStore {
        let games_table =
            std::env::var("GAMES_TABLE").expect("GAMES_TABLE environment variable must be set");
        let games_by_player_table = std::env::var("GAMES_BY_PLAYER_TABLE")
            .expect("GAMES_BY_PLAYER_TABLE environment variable must be set");
        DynamoDbGameStore {
            client,
            games_table,
            games_by_player_table,
        }
    }
}

#[async_trait]
impl GameStore for DynamoDbGameStore {
    async fn upsert_skeleton(&self, game: &DurableGame) -> Result<(), GameStoreError> {
        let item = to_item(game).map_err(|e| GameStoreError::Serialization(e.to_string()))?;

        let put = self
            .client
            .put_item()
            .table_name(&self.games_table)
            .set_item(Some(item))
            .condition_expression("attribute_not_exists(gameId)")
            .send()
            .await;

        match put {
            Ok(_) => {}
            Err(e) => {
                let already_exists = e
                    .as_service_error()
                    .map(|s| s.is_conditional_check_failed_exception())
                    .unwrap_or(false);
                if !already_exists {
                    return Err(GameStoreError::DynamoDb(e.to_string()));
                }
                // Another node already wrote the skeleton; nothing to do.
                return Ok(());
            }
        }

        for player in &game.players {
            let summary = GameSummary {
                player_id: player.player_id.clone(),
                started_at: game.started_at,
                game_id: game.game_id.clone(),
                color: player.color,
            };
            let item =
                to_item(&summary).map_err(|e| GameStoreError::Serialization(e.to_string()))?;
            self.client
                .put_item()
                .table_name(&self.games_by_player_table)
                .set_item(Some(item))
                .send()
                .await
                .map_err(|e| GameStoreError::DynamoDb(e.to_string()))?;
        }

        Ok(())
    }

    async fn append_move(
        &self,
        game_id: &str,
        mv: &MoveRecord,
        pgn: &str,
        fen_snapshot: Option<&str>,
    ) -> Result<(), GameStoreError> {
        let move_value =
            to_attribute_value(mv).map_err(|e| GameStoreError::Serialization(e.to_string()))?;

        let mut update = String::from(
            "SET moves = list_append(if_not_exists(moves, :empty), :mv), pgn = :pgn",
        );
        let mut request = self
            .client
            .update_item()
            .table_name(&self.games_table)
            .key("gameId", AttributeValue::S(game_id.to_string()))
            .expression_attribute_values(":mv", AttributeValue::L(vec![move_value]))
            .expression_attribute_values(":empty", AttributeValue::L(vec![]))
            .expression_attribute_values(":pgn", AttributeValue::S(pgn.to_string()));

        if let Some(fen) = fen_snapshot {
            update.push_str(", fenHistory = list_append(if_not_exists(fenHistory, :empty), :fen)");
            request = request.expression_attribute_values(
                ":fen",
                AttributeValue::L(vec![AttributeValue::S(fen.to_string())]),
            );
        }

        request
            .update_expression(update)
            .send()
            .await
            .map_err(|e| GameStoreError::DynamoDb(e.to_string()))?;
        Ok(())
    }

    async fn complete_game(
        &self,
        game_id: &str,
        result: &GameResultDoc,
        ended_at: i64,
        final_pgn: &str,
    ) -> Result<(), GameStoreError> {
        let result_value =
            to_attribute_value(result).map_err(|e| GameStoreError::Serialization(e.to_string()))?;

        self.client
            .update_item()
            .table_name(&self.games_table)
            .key("gameId", AttributeValue::S(game_id.to_string()))
            .update_expression(
                "SET #status = :completed, #result = :result, endedAt = :endedAt, pgn = :pgn",
            )
            .expression_attribute_names("#status", "status")
            .expression_attribute_names("#result", "result")
            .expression_attribute_values(":completed", AttributeValue::S("completed".to_string()))
            .expression_attribute_values(":result", result_value)
            .expression_attribute_values(":endedAt", AttributeValue::N(ended_at.to_string()))
            .expression_attribute_values(":pgn", AttributeValue::S(final_pgn.to_string()))
            .send()
            .await
            .map_err(|e| GameStoreError::DynamoDb(e.to_string()))?;
        Ok(())
    }

    async fn set_post_rating(
        &self,
        game_id: &str,
        player_id: &str,
        post_rating: i32,
    ) -> Result<(), GameStoreError> {
        let game = self
            .get_game(game_id)
            .await?
            .ok_or_else(|| GameStoreError::NotFound(game_id.to_string()))?;
        let index = match game.players.iter().position(|p| p.player_id == player_id) {
            Some(index) => index,
            None => {
                warn!(
                    "Player {} not found in game {} while patching post rating",
                    player_id, game_id
                );
                return Ok(());
            }
        };

        self.client
            .update_item()
            .table_name(&self.games_table)
            .key("gameId", AttributeValue::S(game_id.to_string()))
            .update_expression(format!("SET players[{}].postRating = :rating", index))
            .expression_attribute_values(":rating", AttributeValue::N(post_rating.to_string()))
            .send()
            .await
            .map_err(|e| GameStoreError::DynamoDb(e.to_string()))?;
        Ok(())
    }

    async fn link_rematch(
        &self,
        game_id: &str,
        rematch_game_id: &str,
    ) -> Result<(), GameStoreError> {
        self.client
            .update_item()
            .table_name(&self.games_table)
            .key("gameId", AttributeValue::S(game_id.to_string()))
            .update_expression("SET rematchGameId = :id")
            .expression_attribute_values(":id", AttributeValue::S(rematch_game_id.to_string()))
            .send()
            .await
            .map_err(|e| GameStoreError::DynamoDb(e.to_string()))?;
        Ok(())
    }

    async fn get_game(&self, game_id: &str) -> Result<Option<DurableGame>, GameStoreError> {
        let output = self
            .client
            .get_item()
            .table_name(&self.games_table)
            .key("gameId", AttributeValue::S(game_id.to_string()))
            .send()
            .await
            .map_err(|e| GameStoreError::DynamoDb(e.to_string()))?;

        match output.item {
            Some(item) => from_item(item)
                .map(Some)
                .map_err(|e| GameStoreError::Serialization(e.to_string())),
            None => Ok(None),
        }
    }

    async fn recent_games(
        &self,
        player_id: &str,
        limit: usize,
    ) -> Result<Vec<GameSummary>, GameStoreError> {
        let output = self
            .client
            .query()
            .table_name(&self.games_by_player_table)
            .key_condition_expression("playerId = :pid")
            .expression_attribute_values(":pid", AttributeValue::S(player_id.to_string()))
            .scan_index_forward(false)
            .limit(limit as i32)
            .send()
            .await
            .map_err(|e| GameStoreError::DynamoDb(e.to_string()))?;

        let mut summaries = Vec::new();
        for item in output.items.unwrap_or_default() {
            match from_item(item) {
                Ok(summary) => summaries.push(summary),
                Err(e) => warn!("Failed to parse game summary: {}", e),
            }
        }
        Ok(summaries)
    }
}
