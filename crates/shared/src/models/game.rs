use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::models::rating::RatingChanges;

pub const STARTING_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

/// TTL of a live game hash in the live store, in seconds.
pub const LIVE_GAME_TTL_SECS: u64 = 7200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Color {
    White,
    Black,
}

impl Color {
    pub fn opposite(self) -> Color {
        match self {
            Color::White => Color::Black,
            Color::Black => Color::White,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Color::White => "white",
            Color::Black => "black",
        }
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Color {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "white" => Ok(Color::White),
            "black" => Ok(Color::Black),
            other => Err(format!("unknown color: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum GameVariant {
    Rapid,
    Blitz,
    Bullet,
}

impl GameVariant {
    pub fn as_str(self) -> &'static str {
        match self {
            GameVariant::Rapid => "RAPID",
            GameVariant::Blitz => "BLITZ",
            GameVariant::Bullet => "BULLET",
        }
    }
}

/// Base time and per-move increment, both in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeControl {
    pub time: u64,
    pub increment: u64,
}

impl TimeControl {
    pub fn base_ms(&self) -> u64 {
        self.time * 1000
    }

    pub fn increment_ms(&self) -> u64 {
        self.increment * 1000
    }

    /// Queue key segment, e.g. `RAPID_10_0` for 600+0 rapid.
    pub fn game_type(&self, variant: GameVariant) -> String {
        format!("{}_{}_{}", variant.as_str(), self.time / 60, self.increment)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameInfo {
    pub variant: GameVariant,
    pub game_type: String,
    pub time_control: TimeControl,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GamePlayer {
    pub player_id: String,
    pub color: Color,
    pub rating: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connection_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveRecord {
    pub san: String,
    pub from: String,
    pub to: String,
    pub piece: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub captured: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub promotion: Option<String>,
    pub timestamp: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    Checkmate,
    Resignation,
    Timeout,
    Stalemate,
    Agreement,
    Threefold,
    InsufficientMaterial,
    FiftyMove,
}

impl EndReason {
    pub fn as_str(self) -> &'static str {
        match self {
            EndReason::Checkmate => "checkmate",
            EndReason::Resignation => "resignation",
            EndReason::Timeout => "timeout",
            EndReason::Stalemate => "stalemate",
            EndReason::Agreement => "agreement",
            EndReason::Threefold => "threefold",
            EndReason::InsufficientMaterial => "insufficient_material",
            EndReason::FiftyMove => "fifty_move",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GameScore {
    #[serde(rename = "1-0")]
    WhiteWins,
    #[serde(rename = "0-1")]
    BlackWins,
    #[serde(rename = "1/2-1/2")]
    Draw,
}

impl GameScore {
    pub fn from_winner(winner: Option<Color>) -> GameScore {
        match winner {
            Some(Color::White) => GameScore::WhiteWins,
            Some(Color::Black) => GameScore::BlackWins,
            None => GameScore::Draw,
        }
    }

    pub fn winner(self) -> Option<Color> {
        match self {
            GameScore::WhiteWins => Some(Color::White),
            GameScore::BlackWins => Some(Color::Black),
            GameScore::Draw => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            GameScore::WhiteWins => "1-0",
            GameScore::BlackWins => "0-1",
            GameScore::Draw => "1/2-1/2",
        }
    }

    /// Score from the given color's perspective: 1.0 win, 0.5 draw, 0.0 loss.
    pub fn points_for(self, color: Color) -> f64 {
        match (self, color) {
            (GameScore::Draw, _) => 0.5,
            (GameScore::WhiteWins, Color::White) | (GameScore::BlackWins, Color::Black) => 1.0,
            _ => 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeLeft {
    pub white: u64,
    pub black: u64,
}

impl TimeLeft {
    pub fn get(&self, color: Color) -> u64 {
        match color {
            Color::White => self.white,
            Color::Black => self.black,
        }
    }

    pub fn set(&mut self, color: Color, ms: u64) {
        match color {
            Color::White => self.white = ms,
            Color::Black => self.black = ms,
        }
    }
}

/// Authoritative in-flight state of a game, stored as a hash in the live
/// store. Nested structures are JSON-encoded field values.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveGame {
    pub game_id: String,
    pub players: [GamePlayer; 2],
    pub time_left_ms: TimeLeft,
    pub game_info: GameInfo,
    #[serde(rename = "initialFEN")]
    pub initial_fen: String,
    pub moves: Vec<MoveRecord>,
    pub pgn: String,
    pub turn: Color,
    pub started_at: i64,
    pub last_move_at: i64,
    pub game_over: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub winner: Option<Color>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<GameScore>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_reason: Option<EndReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub draw_offer: Option<Color>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rematch_offer: Option<Color>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rematch_game_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rating_changes: Option<RatingChanges>,
}

impl LiveGame {
    pub fn new(
        game_id: String,
        white: GamePlayer,
        black: GamePlayer,
        game_info: GameInfo,
        now_ms: i64,
    ) -> LiveGame {
        debug_assert_eq!(white.color, Color::White);
        debug_assert_eq!(black.color, Color::Black);
        let base = game_info.time_control.base_ms();
        LiveGame {
            game_id,
            players: [white, black],
            time_left_ms: TimeLeft {
                white: base,
                black: base,
            },
            game_info,
            initial_fen: STARTING_FEN.to_string(),
            moves: Vec::new(),
            pgn: String::new(),
            turn: Color::White,
            started_at: now_ms,
            last_move_at: now_ms,
            game_over: false,
            winner: None,
            result: None,
            end_reason: None,
            draw_offer: None,
            rematch_offer: None,
            rematch_game_id: None,
            rating_changes: None,
        }
    }

    pub fn player(&self, player_id: &str) -> Option<&GamePlayer> {
        self.players.iter().find(|p| p.player_id == player_id)
    }

    pub fn color_of(&self, player_id: &str) -> Option<Color> {
        self.player(player_id).map(|p| p.color)
    }

    pub fn player_of(&self, color: Color) -> &GamePlayer {
        self.players
            .iter()
            .find(|p| p.color == color)
            .expect("live game always has both colors")
    }

    pub fn opponent_of(&self, player_id: &str) -> Option<&GamePlayer> {
        self.players.iter().find(|p| p.player_id != player_id)
    }

    /// Encode as live-store hash fields. Scalars go in as plain strings,
    /// nested structures as JSON values.
    pub fn to_fields(&self) -> Result<Vec<(String, String)>, serde_json::Error> {
        let mut fields = vec![
            ("gameId".to_string(), self.game_id.clone()),
            ("players".to_string(), serde_json::to_string(&self.players)?),
            (
                "timeLeftMs".to_string(),
                serde_json::to_string(&self.time_left_ms)?,
            ),
            (
                "gameInfo".to_string(),
                serde_json::to_string(&self.game_info)?,
            ),
            ("initialFEN".to_string(), self.initial_fen.clone()),
            ("moves".to_string(), serde_json::to_string(&self.moves)?),
            ("pgn".to_string(), self.pgn.clone()),
            ("turn".to_string(), self.turn.as_str().to_string()),
            ("startedAt".to_string(), self.started_at.to_string()),
            ("lastMoveAt".to_string(), self.last_move_at.to_string()),
            ("gameOver".to_string(), self.game_over.to_string()),
        ];
        if let Some(winner) = self.winner {
            fields.push(("winner".to_string(), winner.as_str().to_string()));
        }
        if let Some(result) = self.result {
            fields.push(("result".to_string(), result.as_str().to_string()));
        }
        if let Some(reason) = self.end_reason {
            fields.push(("endReason".to_string(), reason.as_str().to_string()));
        }
        if let Some(offer) = self.draw_offer {
            fields.push(("drawOffer".to_string(), offer.as_str().to_string()));
        }
        if let Some(offer) = self.rematch_offer {
            fields.push(("rematchOffer".to_string(), offer.as_str().to_string()));
        }
        if let Some(id) = &self.rematch_game_id {
            fields.push(("rematchGameId".to_string(), id.clone()));
        }
        if let Some(changes) = &self.rating_changes {
            fields.push((
                "ratingChanges".to_string(),
                serde_json::to_string(changes)?,
            ));
        }
        Ok(fields)
    }

    pub fn from_fields(fields: &HashMap<String, String>) -> Result<LiveGame, String> {
        fn required<'a>(
            fields: &'a HashMap<String, String>,
            name: &str,
        ) -> Result<&'a String, String> {
            fields
                .get(name)
                .ok_or_else(|| format!("missing live game field: {}", name))
        }

        let players: [GamePlayer; 2] = serde_json::from_str(required(fields, "players")?)
            .map_err(|e| format!("bad players field: {}", e))?;
        let time_left_ms: TimeLeft = serde_json::from_str(required(fields, "timeLeftMs")?)
            .map_err(|e| format!("bad timeLeftMs field: {}", e))?;
        let game_info: GameInfo = serde_json::from_str(required(fields, "gameInfo")?)
            .map_err(|e| format!("bad gameInfo field: {}", e))?;
        let moves: Vec<MoveRecord> = serde_json::from_str(required(fields, "moves")?)
            .map_err(|e| format!("bad moves field: {}", e))?;
        let turn: Color = required(fields, "turn")?.parse()?;
        let started_at = required(fields, "startedAt")?
            .parse::<i64>()
            .map_err(|e| format!("bad startedAt field: {}", e))?;
        let last_move_at = required(fields, "lastMoveAt")?
            .parse::<i64>()
            .map_err(|e| format!("bad lastMoveAt field: {}", e))?;
        let game_over = required(fields, "gameOver")? == "true";

        let winner = fields.get("winner").map(|v| v.parse()).transpose()?;
        let result = fields
            .get("result")
            .map(|v| match v.as_str() {
                "1-0" => Ok(GameScore::WhiteWins),
                "0-1" => Ok(GameScore::BlackWins),
                "1/2-1/2" => Ok(GameScore::Draw),
                other => Err(format!("unknown result: {}", other)),
            })
            .transpose()?;
        let end_reason = fields
            .get("endReason")
            .map(|v| {
                serde_json::from_value::<EndReason>(serde_json::Value::String(v.clone()))
                    .map_err(|e| format!("bad endReason field: {}", e))
            })
            .transpose()?;
        let draw_offer = fields.get("drawOffer").map(|v| v.parse()).transpose()?;
        let rematch_offer = fields.get("rematchOffer").map(|v| v.parse()).transpose()?;
        let rating_changes = fields
            .get("ratingChanges")
            .map(|v| {
                serde_json::from_str::<RatingChanges>(v)
                    .map_err(|e| format!("bad ratingChanges field: {}", e))
            })
            .transpose()?;

        Ok(LiveGame {
            game_id: required(fields, "gameId")?.clone(),
            players,
            time_left_ms,
            game_info,
            initial_fen: required(fields, "initialFEN")?.clone(),
            moves,
            pgn: required(fields, "pgn")?.clone(),
            turn,
            started_at,
            last_move_at,
            game_over,
            winner,
            result,
            end_reason,
            draw_offer,
            rematch_offer,
            rematch_game_id: fields.get("rematchGameId").cloned(),
            rating_changes,
        })
    }
}
