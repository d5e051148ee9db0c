use serde::{Deserialize, Serialize};

/// Pre-game rating deltas for one player, computed when the game is created
/// so clients can display stakes before the result is known.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RatingChange {
    pub on_win: i32,
    pub on_loss: i32,
    pub on_draw: i32,
    pub is_provisional: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RatingChanges {
    pub white: RatingChange,
    pub black: RatingChange,
}

/// A rating delta actually applied at finalization, published with
/// `rating_updated` events.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppliedRating {
    pub player_id: String,
    pub old_rating: i32,
    pub new_rating: i32,
}
