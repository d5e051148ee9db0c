use serde::{Deserialize, Serialize};

use crate::models::game::{GameVariant, TimeControl};

pub const SEARCH_SESSION_TTL_SECS: u64 = 300;
pub const MATCH_LOCK_TTL_SECS: u64 = 5;

/// Initial half-width of the rating window.
pub const INITIAL_RANGE: i32 = 60;
/// Window growth per expansion step.
pub const RANGE_STEP: i32 = 60;
/// Hard cap on the window half-width.
pub const MAX_RANGE: i32 = 600;
/// One expansion step per this many milliseconds of searching.
pub const RANGE_EXPAND_INTERVAL_MS: i64 = 3000;

/// A player's active matchmaking search, stored as a JSON string keyed
/// `search_session:<playerId>` with a 300 s TTL. Mutated only by the
/// matchmaker; at most one session exists per player.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchSession {
    pub player_id: String,
    pub game_type: String,
    pub game_variant: GameVariant,
    pub time_control: TimeControl,
    pub initial_rating: i32,
    pub current_range: i32,
    pub search_start_time: i64,
    pub connection_id: String,
}

impl SearchSession {
    /// Window half-width after `elapsed_ms` of searching: grows by
    /// [`RANGE_STEP`] every [`RANGE_EXPAND_INTERVAL_MS`], saturating at
    /// [`MAX_RANGE`].
    pub fn range_for_elapsed(elapsed_ms: i64) -> i32 {
        let expansions = (elapsed_ms.max(0) / RANGE_EXPAND_INTERVAL_MS) as i32;
        (INITIAL_RANGE + RANGE_STEP * expansions).min(MAX_RANGE)
    }
}

/// Key of the cross-node claim lock for a candidate pair. Ids are ordered so
/// both nodes derive the same key regardless of who scans whom.
pub fn match_lock_key(a: &str, b: &str) -> String {
    let (low, high) = if a <= b { (a, b) } else { (b, a) };
    format!("match_lock:{}:{}", low, high)
}

pub fn queue_key(game_type: &str) -> String {
    format!("match-making-queue:{}", game_type)
}

pub fn presence_key(player_id: &str) -> String {
    format!("player:{}", player_id)
}

pub fn session_key(player_id: &str) -> String {
    format!("search_session:{}", player_id)
}

pub fn live_game_key(game_id: &str) -> String {
    format!("game:{}", game_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_expands_by_sixty_every_three_seconds() {
        assert_eq!(SearchSession::range_for_elapsed(0), 60);
        assert_eq!(SearchSession::range_for_elapsed(2999), 60);
        assert_eq!(SearchSession::range_for_elapsed(3000), 120);
        assert_eq!(SearchSession::range_for_elapsed(9000), 240);
    }

    #[test]
    fn range_saturates_at_six_hundred() {
        assert_eq!(SearchSession::range_for_elapsed(27_000), 600);
        assert_eq!(SearchSession::range_for_elapsed(3_000_000), 600);
    }

    #[test]
    fn lock_key_is_order_independent() {
        assert_eq!(match_lock_key("alice", "bob"), match_lock_key("bob", "alice"));
        assert_eq!(match_lock_key("alice", "bob"), "match_lock:alice:bob");
    }
}
