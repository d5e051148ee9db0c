use serde::{Deserialize, Serialize};

use crate::models::game::{
    Color, EndReason, GameScore, GameVariant, LiveGame, MoveRecord, TimeControl,
};
use crate::models::rating::RatingChanges;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameStatus {
    Ongoing,
    Completed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DurablePlayer {
    pub player_id: String,
    pub color: Color,
    pub pre_rating: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub post_rating: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameResultDoc {
    pub winner: Option<Color>,
    pub reason: EndReason,
    pub score: GameScore,
}

/// Finalized/historical record of a game in the document store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DurableGame {
    pub game_id: String,
    pub players: Vec<DurablePlayer>,
    pub variant: GameVariant,
    pub time_control: TimeControl,
    #[serde(rename = "initialFEN")]
    pub initial_fen: String,
    pub moves: Vec<MoveRecord>,
    pub pgn: String,
    /// Position snapshots appended every 10th move by the persistence
    /// pipeline, so replays can seek without starting from move one.
    pub fen_history: Vec<String>,
    pub status: GameStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<GameResultDoc>,
    pub started_at: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rating_changes: Option<RatingChanges>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rematch_of: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rematch_game_id: Option<String>,
}

impl DurableGame {
    /// Skeleton document written at game creation, before any move exists.
    pub fn skeleton(live: &LiveGame, rematch_of: Option<String>) -> DurableGame {
        DurableGame {
            game_id: live.game_id.clone(),
            players: live
                .players
                .iter()
                .map(|p| DurablePlayer {
                    player_id: p.player_id.clone(),
                    color: p.color,
                    pre_rating: p.rating,
                    post_rating: None,
                })
                .collect(),
            variant: live.game_info.variant,
            time_control: live.game_info.time_control,
            initial_fen: live.initial_fen.clone(),
            moves: Vec::new(),
            pgn: String::new(),
            fen_history: Vec::new(),
            status: GameStatus::Ongoing,
            result: None,
            started_at: live.started_at,
            ended_at: None,
            rating_changes: live.rating_changes,
            rematch_of,
            rematch_game_id: None,
        }
    }

    pub fn color_of(&self, player_id: &str) -> Option<Color> {
        self.players
            .iter()
            .find(|p| p.player_id == player_id)
            .map(|p| p.color)
    }
}
