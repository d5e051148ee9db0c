use serde::{Deserialize, Serialize};

use crate::models::game::GameVariant;

/// Games below this count use the provisional K-factor.
pub const PROVISIONAL_GAMES: u32 = 30;

pub const RATING_FLOOR: i32 = 100;
pub const DEFAULT_RATING: i32 = 1200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ratings {
    pub rapid: i32,
    pub blitz: i32,
    pub bullet: i32,
}

impl Default for Ratings {
    fn default() -> Self {
        Ratings {
            rapid: DEFAULT_RATING,
            blitz: DEFAULT_RATING,
            bullet: DEFAULT_RATING,
        }
    }
}

impl Ratings {
    pub fn get(&self, variant: GameVariant) -> i32 {
        match variant {
            GameVariant::Rapid => self.rapid,
            GameVariant::Blitz => self.blitz,
            GameVariant::Bullet => self.bullet,
        }
    }

    pub fn set(&mut self, variant: GameVariant, rating: i32) {
        match variant {
            GameVariant::Rapid => self.rapid = rating,
            GameVariant::Blitz => self.blitz = rating,
            GameVariant::Bullet => self.bullet = rating,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerProfile {
    pub player_id: String,
    pub ratings: Ratings,
    pub games_played: u32,
    pub wins: u32,
    pub losses: u32,
    pub draws: u32,
}

impl PlayerProfile {
    pub fn new(player_id: &str) -> PlayerProfile {
        PlayerProfile {
            player_id: player_id.to_string(),
            ratings: Ratings::default(),
            games_played: 0,
            wins: 0,
            losses: 0,
            draws: 0,
        }
    }

    pub fn is_provisional(&self) -> bool {
        self.games_played < PROVISIONAL_GAMES
    }
}

/// Ephemeral presence entry, keyed `player:<playerId>` in the live store.
/// Created on connect, refreshed on reconnect, removed on disconnect or match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Presence {
    pub player_id: String,
    pub ws_id: String,
    pub rating: i32,
    pub is_player_connected: bool,
}
