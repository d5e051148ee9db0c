use serde::{Deserialize, Serialize};

use crate::models::game::{Color, EndReason, GameInfo, GamePlayer, GameScore, MoveRecord, TimeLeft};
use crate::models::rating::{AppliedRating, RatingChanges};

/// Bus topic, one per event class. The publisher keys partitioning by
/// `game_id`, so per-game delivery order is preserved within a topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Topic {
    Moves,
    StateUpdates,
    Events,
    Time,
    Matchmaking,
    Players,
}

impl Topic {
    pub fn channel(self) -> &'static str {
        match self {
            Topic::Moves => "moves",
            Topic::StateUpdates => "state_updates",
            Topic::Events => "events",
            Topic::Time => "time",
            Topic::Matchmaking => "matchmaking",
            Topic::Players => "players",
        }
    }

    pub fn all() -> [Topic; 6] {
        [
            Topic::Moves,
            Topic::StateUpdates,
            Topic::Events,
            Topic::Time,
            Topic::Matchmaking,
            Topic::Players,
        ]
    }
}

/// Every cross-instance event, tagged by `eventType` with a fixed payload
/// shape per variant. Ad-hoc JSON never crosses the bus boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "eventType", content = "payload", rename_all = "snake_case")]
pub enum GameEvent {
    GameStarted {
        game_id: String,
        players: [GamePlayer; 2],
        game_info: GameInfo,
        initial_fen: String,
        time_left_ms: TimeLeft,
        rating_changes: Option<RatingChanges>,
    },
    MoveMade {
        game_id: String,
        player_id: String,
        #[serde(rename = "move")]
        played: MoveRecord,
        fen: String,
        pgn: String,
        move_number: u32,
        time_left_ms: TimeLeft,
        turn: Color,
    },
    GameEnded {
        game_id: String,
        winner: Option<Color>,
        reason: EndReason,
        score: GameScore,
        final_fen: String,
        final_pgn: String,
        rating_changes: Option<Vec<AppliedRating>>,
    },
    PlayerResigned {
        game_id: String,
        player_id: String,
        color: Color,
    },
    DrawOffered {
        game_id: String,
        by: Color,
    },
    DrawAccepted {
        game_id: String,
    },
    DrawDeclined {
        game_id: String,
        by: Color,
    },
    RematchOffered {
        game_id: String,
        by: Color,
    },
    RematchAccepted {
        game_id: String,
        new_game_id: String,
    },
    RematchDeclined {
        game_id: String,
        by: Color,
    },
    TimeUpdate {
        game_id: String,
        white_ms: u64,
        black_ms: u64,
        current_turn: Color,
    },
    TimeUp {
        game_id: String,
        color: Color,
    },
    PlayerConnected {
        player_id: String,
    },
    PlayerDisconnected {
        player_id: String,
    },
    PlayerReconnected {
        player_id: String,
        game_id: Option<String>,
    },
    MatchFound {
        game_id: String,
        player_ids: [String; 2],
        game_type: String,
    },
    RatingUpdated {
        game_id: String,
        player_id: String,
        old_rating: i32,
        new_rating: i32,
    },
}

impl GameEvent {
    pub fn topic(&self) -> Topic {
        match self {
            GameEvent::MoveMade { .. } => Topic::Moves,
            GameEvent::GameStarted { .. } | GameEvent::GameEnded { .. } => Topic::StateUpdates,
            GameEvent::PlayerResigned { .. }
            | GameEvent::DrawOffered { .. }
            | GameEvent::DrawAccepted { .. }
            | GameEvent::DrawDeclined { .. }
            | GameEvent::RematchOffered { .. }
            | GameEvent::RematchAccepted { .. }
            | GameEvent::RematchDeclined { .. }
            | GameEvent::RatingUpdated { .. } => Topic::Events,
            GameEvent::TimeUpdate { .. } | GameEvent::TimeUp { .. } => Topic::Time,
            GameEvent::MatchFound { .. } => Topic::Matchmaking,
            GameEvent::PlayerConnected { .. }
            | GameEvent::PlayerDisconnected { .. }
            | GameEvent::PlayerReconnected { .. } => Topic::Players,
        }
    }

    pub fn event_type(&self) -> &'static str {
        match self {
            GameEvent::GameStarted { .. } => "game_started",
            GameEvent::MoveMade { .. } => "move_made",
            GameEvent::GameEnded { .. } => "game_ended",
            GameEvent::PlayerResigned { .. } => "player_resigned",
            GameEvent::DrawOffered { .. } => "draw_offered",
            GameEvent::DrawAccepted { .. } => "draw_accepted",
            GameEvent::DrawDeclined { .. } => "draw_declined",
            GameEvent::RematchOffered { .. } => "rematch_offered",
            GameEvent::RematchAccepted { .. } => "rematch_accepted",
            GameEvent::RematchDeclined { .. } => "rematch_declined",
            GameEvent::TimeUpdate { .. } => "time_update",
            GameEvent::TimeUp { .. } => "time_up",
            GameEvent::PlayerConnected { .. } => "player_connected",
            GameEvent::PlayerDisconnected { .. } => "player_disconnected",
            GameEvent::PlayerReconnected { .. } => "player_reconnected",
            GameEvent::MatchFound { .. } => "match_found",
            GameEvent::RatingUpdated { .. } => "rating_updated",
        }
    }

    pub fn game_id(&self) -> Option<&str> {
        match self {
            GameEvent::GameStarted { game_id, .. }
            | GameEvent::MoveMade { game_id, .. }
            | GameEvent::GameEnded { game_id, .. }
            | GameEvent::PlayerResigned { game_id, .. }
            | GameEvent::DrawOffered { game_id, .. }
            | GameEvent::DrawAccepted { game_id }
            | GameEvent::DrawDeclined { game_id, .. }
            | GameEvent::RematchOffered { game_id, .. }
            | GameEvent::RematchAccepted { game_id, .. }
            | GameEvent::RematchDeclined { game_id, .. }
            | GameEvent::TimeUpdate { game_id, .. }
            | GameEvent::TimeUp { game_id, .. }
            | GameEvent::MatchFound { game_id, .. }
            | GameEvent::RatingUpdated { game_id, .. } => Some(game_id),
            GameEvent::PlayerReconnected { game_id, .. } => game_id.as_deref(),
            GameEvent::PlayerConnected { .. } | GameEvent::PlayerDisconnected { .. } => None,
        }
    }
}

/// Wire envelope for every bus message. The flattened event contributes the
/// `eventType` tag and `payload` body.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventEnvelope {
    pub origin_node_id: String,
    pub timestamp: i64,
    pub channel: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub game_id: Option<String>,
    #[serde(flatten)]
    pub event: GameEvent,
}

impl EventEnvelope {
    pub fn new(origin_node_id: &str, timestamp: i64, event: GameEvent) -> EventEnvelope {
        EventEnvelope {
            origin_node_id: origin_node_id.to_string(),
            timestamp,
            channel: event.topic().channel().to_string(),
            game_id: event.game_id().map(|s| s.to_string()),
            event,
        }
    }

    pub fn event_type(&self) -> &'static str {
        self.event.event_type()
    }

    /// Consumer-side dedup key for at-least-once delivery.
    pub fn dedup_key(&self) -> (Option<&str>, &'static str, i64) {
        (self.game_id.as_deref(), self.event.event_type(), self.timestamp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::game::Color;

    #[test]
    fn envelope_round_trips_through_json() {
        let event = GameEvent::TimeUp {
            game_id: "g-9".to_string(),
            color: Color::White,
        };
        let envelope = EventEnvelope::new("node-a", 1_700_000_000_000, event);
        let json = serde_json::to_string(&envelope).unwrap();
        let decoded: EventEnvelope = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded.origin_node_id, "node-a");
        assert_eq!(decoded.event_type(), "time_up");
        assert_eq!(decoded.channel, "time");
        assert_eq!(decoded.game_id.as_deref(), Some("g-9"));
        match decoded.event {
            GameEvent::TimeUp { ref game_id, color } => {
                assert_eq!(game_id, "g-9");
                assert_eq!(color, Color::White);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn events_route_to_their_topics() {
        let mv = GameEvent::MoveMade {
            game_id: "g".to_string(),
            player_id: "p".to_string(),
            played: MoveRecord {
                san: "e4".to_string(),
                from: "e2".to_string(),
                to: "e4".to_string(),
                piece: "p".to_string(),
                captured: None,
                promotion: None,
                timestamp: 0,
            },
            fen: String::new(),
            pgn: String::new(),
            move_number: 1,
            time_left_ms: TimeLeft {
                white: 1000,
                black: 1000,
            },
            turn: Color::Black,
        };
        assert_eq!(mv.topic(), Topic::Moves);
        assert_eq!(mv.event_type(), "move_made");

        let found = GameEvent::MatchFound {
            game_id: "g".to_string(),
            player_ids: ["a".to_string(), "b".to_string()],
            game_type: "RAPID_10_0".to_string(),
        };
        assert_eq!(found.topic(), Topic::Matchmaking);
    }
}
