use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::models::durable::{DurableGame, GameResultDoc, GameStatus};
use crate::models::game::MoveRecord;
use crate::repositories::errors::GameStoreError;
use crate::repositories::game_store::{GameStore, GameSummary};

/// In-process document store with the same write operations as the
/// DynamoDB-backed one. Backs tests and local development.
#[derive(Default)]
pub struct InMemoryGameStore {
    games: Mutex<HashMap<String, DurableGame>>,
    by_player: Mutex<Vec<GameSummary>>,
}

impl InMemoryGameStore {
    pub fn new() -> InMemoryGameStore {
        InMemoryGameStore::default()
    }

    pub fn game(&self, game_id: &str) -> Option<DurableGame> {
        self.games.lock().unwrap().get(game_id).cloned()
    }

    /// Seed history rows directly; color-assignment tests use this.
    pub fn seed_summary(&self, summary: GameSummary) {
        self.by_player.lock().unwrap().push(summary);
    }
}

#[async_trait]
impl GameStore for InMemoryGameStore {
    async fn upsert_skeleton(&self, game: &DurableGame) -> Result<(), GameStoreError> {
        let mut games = self.games.lock().unwrap();
        if games.contains_key(&game.game_id) {
            return Ok(());
        }
        games.insert(game.game_id.clone(), game.clone());
        let mut by_player = self.by_player.lock().unwrap();
        for player in &game.players {
            by_player.push(GameSummary {
                player_id: player.player_id.clone(),
                started_at: game.started_at,
                game_id: game.game_id.clone(),
                color: player.color,
            });
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
        let mut games = self.games.lock().unwrap();
        let game = games
            .get_mut(game_id)
            .ok_or_else(|| GameStoreError::NotFound(game_id.to_string()))?;
        game.moves.push(mv.clone());
        game.pgn = pgn.to_string();
        if let Some(fen) = fen_snapshot {
            game.fen_history.push(fen.to_string());
        }
        Ok(())
    }

    async fn complete_game(
        &self,
        game_id: &str,
        result: &GameResultDoc,
        ended_at: i64,
        final_pgn: &str,
    ) -> Result<(), GameStoreError> {
        let mut games = self.games.lock().unwrap();
        let game = games
            .get_mut(game_id)
            .ok_or_else(|| GameStoreError::NotFound(game_id.to_string()))?;
        game.status = GameStatus::Completed;
        game.result = Some(result.clone());
        game.ended_at = Some(ended_at);
        game.pgn = final_pgn.to_string();
        Ok(())
    }

    async fn set_post_rating(
        &self,
        game_id: &str,
        player_id: &str,
        post_rating: i32,
    ) -> Result<(), GameStoreError> {
        let mut games = self.games.lock().unwrap();
        let game = games
            .get_mut(game_id)
            .ok_or_else(|| GameStoreError::NotFound(game_id.to_string()))?;
        if let Some(player) = game.players.iter_mut().find(|p| p.player_id == player_id) {
            player.post_rating = Some(post_rating);
        }
        Ok(())
    }

    async fn link_rematch(
        &self,
        game_id: &str,
        rematch_game_id: &str,
    ) -> Result<(), GameStoreError> {
        let mut games = self.games.lock().unwrap();
        if let Some(game) = games.get_mut(game_id) {
            game.rematch_game_id = Some(rematch_game_id.to_string());
        }
        Ok(())
    }

    async fn get_game(&self, game_id: &str) -> Result<Option<DurableGame>, GameStoreError> {
        Ok(self.games.lock().unwrap().get(game_id).cloned())
    }

    async fn recent_games(
        &self,
        player_id: &str,
        limit: usize,
    ) -> Result<Vec<GameSummary>, GameStoreError> {
        let by_player = self.by_player.lock().unwrap();
        let mut rows: Vec<GameSummary> = by_player
            .iter()
            .filter(|s| s.player_id == player_id)
            .cloned()
            .collect();
        rows.sort_by_key(|s| std::cmp::Reverse(s.started_at));
        rows.truncate(limit);
        Ok(rows)
    }
}
