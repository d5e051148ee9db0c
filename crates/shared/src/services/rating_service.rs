use crate::models::game::GameVariant;
use crate::models::player::{PlayerProfile, PROVISIONAL_GAMES, RATING_FLOOR};
use crate::models::rating::{RatingChange, RatingChanges};

/// Elo-style rating arithmetic. Pure; the game core decides when to apply it.
#[derive(Clone, Default)]
pub struct RatingService;

impl RatingService {
    pub fn new() -> RatingService {
        RatingService
    }

    /// Expected score of `rating` against `opponent`.
    pub fn expected_score(&self, rating: i32, opponent: i32) -> f64 {
        1.0 / (1.0 + 10f64.powf((opponent - rating) as f64 / 400.0))
    }

    pub fn k_factor(&self, games_played: u32, rating: i32) -> i32 {
        if games_played < PROVISIONAL_GAMES {
            40
        } else if rating >= 2400 {
            10
        } else if rating >= 2100 {
            16
        } else {
            32
        }
    }

    /// Rating delta for an actual score `s` (1.0 win, 0.5 draw, 0.0 loss),
    /// rounded and clamped to the K-factor.
    pub fn delta(&self, rating: i32, opponent: i32, games_played: u32, s: f64) -> i32 {
        let k = self.k_factor(games_played, rating);
        let raw = (k as f64 * (s - self.expected_score(rating, opponent))).round() as i32;
        raw.clamp(-k, k)
    }

    /// New rating after applying a delta, floored.
    pub fn apply(&self, rating: i32, delta: i32) -> i32 {
        (rating + delta).max(RATING_FLOOR)
    }

    /// Pre-game stakes snapshot for one player of the pair.
    pub fn change_for(
        &self,
        player: &PlayerProfile,
        opponent: &PlayerProfile,
        variant: GameVariant,
    ) -> RatingChange {
        let rating = player.ratings.get(variant);
        let opponent_rating = opponent.ratings.get(variant);
        RatingChange {
            on_win: self.delta(rating, opponent_rating, player.games_played, 1.0),
            on_loss: self.delta(rating, opponent_rating, player.games_played, 0.0),
            on_draw: self.delta(rating, opponent_rating, player.games_played, 0.5),
            is_provisional: player.is_provisional(),
        }
    }

    pub fn changes(
        &self,
        white: &PlayerProfile,
        black: &PlayerProfile,
        variant: GameVariant,
    ) -> RatingChanges {
        RatingChanges {
            white: self.change_for(white, black, variant),
            black: self.change_for(black, white, variant),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(rating: i32, games_played: u32) -> PlayerProfile {
        let mut profile = PlayerProfile::new("p");
        profile.ratings = crate::models::player::Ratings {
            rapid: rating,
            blitz: rating,
            bullet: rating,
        };
        profile.games_played = games_played;
        profile
    }

    #[test]
    fn expected_score_is_half_for_equal_ratings() {
        let service = RatingService::new();
        assert!((service.expected_score(1500, 1500) - 0.5).abs() < 1e-9);
        assert!(service.expected_score(1700, 1300) > 0.9);
    }

    #[test]
    fn k_factor_tiers() {
        let service = RatingService::new();
        assert_eq!(service.k_factor(10, 1500), 40);
        assert_eq!(service.k_factor(29, 2500), 40);
        assert_eq!(service.k_factor(30, 2400), 10);
        assert_eq!(service.k_factor(30, 2399), 16);
        assert_eq!(service.k_factor(30, 2100), 16);
        assert_eq!(service.k_factor(30, 2099), 32);
    }

    #[test]
    fn deltas_are_clamped_to_k() {
        let service = RatingService::new();
        // Massive favorite losing: raw delta cannot exceed K in magnitude.
        let delta = service.delta(2600, 800, 100, 0.0);
        assert!(delta >= -10 && delta < 0);
        let delta = service.delta(800, 2600, 100, 1.0);
        assert!(delta <= 32 && delta > 0);
    }

    #[test]
    fn equal_players_gain_and_lose_symmetrically() {
        let service = RatingService::new();
        let win = service.delta(1500, 1500, 50, 1.0);
        let loss = service.delta(1500, 1500, 50, 0.0);
        assert_eq!(win, 16);
        assert_eq!(loss, -16);
        assert_eq!(service.delta(1500, 1500, 50, 0.5), 0);
    }

    #[test]
    fn rating_never_drops_below_the_floor() {
        let service = RatingService::new();
        assert_eq!(service.apply(110, -40), 100);
        assert_eq!(service.apply(1500, -16), 1484);
    }

    #[test]
    fn provisional_players_swing_harder() {
        let service = RatingService::new();
        let fresh = profile(1200, 5);
        let seasoned = profile(1200, 200);
        let changes = service.changes(&fresh, &seasoned, GameVariant::Rapid);
        assert!(changes.white.is_provisional);
        assert!(!changes.black.is_provisional);
        assert!(changes.white.on_win > changes.black.on_win.abs());
    }

    #[test]
    fn paired_deltas_roughly_cancel() {
        let service = RatingService::new();
        let a = profile(1450, 80);
        let b = profile(1390, 64);
        let changes = service.changes(&a, &b, GameVariant::Blitz);
        // Same K tier: a win for one mirrors a loss for the other within
        // rounding.
        assert!((changes.white.on_win + changes.black.on_loss).abs() <= 1);
        assert!((changes.white.on_loss + changes.black.on_win).abs() <= 1);
    }
}
