use shared::models::game::Color;

/// Probability that the first player of a pair gets white, from ratings and
/// each player's recent color history (newest game first, at most 10).
///
/// The base coin is nudged three ways: the lower-rated player leans white,
/// a same-color streak leans the other way, and a lopsided white share over
/// the window gets corrected.
pub fn white_probability(
    rating1: i32,
    rating2: i32,
    history1: &[Color],
    history2: &[Color],
) -> f64 {
    let mut p: f64 = 0.5;

    let diff = (rating1 - rating2).abs();
    if diff > 100 {
        let shift = (diff as f64 / 2000.0).min(0.1);
        if rating1 < rating2 {
            p += shift;
        } else {
            p -= shift;
        }
    }

    let (white_streak, black_streak) = head_streaks(history1);
    if white_streak >= 2 {
        p -= 0.3;
    }
    if black_streak >= 2 {
        p += 0.3;
    }

    let (white_streak, black_streak) = head_streaks(history2);
    if white_streak >= 2 {
        p += 0.2;
    }
    if black_streak >= 2 {
        p -= 0.2;
    }

    if !history1.is_empty() {
        let white_ratio = history1.iter().filter(|c| **c == Color::White).count() as f64
            / history1.len() as f64;
        if white_ratio > 0.7 {
            p -= 0.2;
        }
        if white_ratio < 0.3 {
            p += 0.2;
        }
    }

    p.clamp(0.1, 0.9)
}

/// Consecutive same-color run at the head of the history. Exactly one of the
/// two counts is non-zero for a non-empty history.
fn head_streaks(history: &[Color]) -> (u32, u32) {
    let mut white = 0;
    let mut black = 0;
    match history.first() {
        Some(Color::White) => {
            white = history.iter().take_while(|c| **c == Color::White).count() as u32;
        }
        Some(Color::Black) => {
            black = history.iter().take_while(|c| **c == Color::Black).count() as u32;
        }
        None => {}
    }
    (white, black)
}

/// The first player takes white iff the uniform sample lands under `p`.
pub fn first_gets_white(p: f64, sample: f64) -> bool {
    sample < p
}

#[cfg(test)]
mod tests {
    use super::*;

    const W: Color = Color::White;
    const B: Color = Color::Black;

    #[test]
    fn even_pair_with_no_history_is_a_coin_flip() {
        assert_eq!(white_probability(1200, 1200, &[], &[]), 0.5);
    }

    #[test]
    fn small_rating_gaps_do_not_bias() {
        assert_eq!(white_probability(1200, 1300, &[], &[]), 0.5);
    }

    #[test]
    fn lower_rated_player_leans_white() {
        // 300-point underdog: shift = 300/2000 = 0.15, capped at 0.1.
        assert!((white_probability(1200, 1500, &[], &[]) - 0.6).abs() < 1e-9);
        assert!((white_probability(1500, 1200, &[], &[]) - 0.4).abs() < 1e-9);
        // 150-point gap stays under the cap.
        assert!((white_probability(1200, 1350, &[], &[]) - 0.575).abs() < 1e-9);
    }

    #[test]
    fn own_white_streak_pushes_toward_black() {
        let p = white_probability(1200, 1200, &[W, W, B], &[]);
        assert!((p - 0.2).abs() < 1e-9);
        let p = white_probability(1200, 1200, &[B, B, W], &[]);
        assert!((p - 0.8).abs() < 1e-9);
    }

    #[test]
    fn opponent_streaks_push_the_other_way() {
        let p = white_probability(1200, 1200, &[], &[W, W]);
        assert!((p - 0.7).abs() < 1e-9);
        let p = white_probability(1200, 1200, &[], &[B, B]);
        assert!((p - 0.3).abs() < 1e-9);
    }

    #[test]
    fn lopsided_white_share_is_corrected() {
        // 8 of 9 white, but broken streak: ratio correction only.
        let history = [W, B, W, W, W, W, W, W, W];
        let p = white_probability(1200, 1200, &history, &[]);
        assert!((p - 0.3).abs() < 1e-9);

        let history = [W, B, B, B, B, B, B, B, B];
        // Head is a single white; ratio 1/9 < 0.3 adds 0.2.
        let p = white_probability(1200, 1200, &history, &[]);
        assert!((p - 0.7).abs() < 1e-9);
    }

    #[test]
    fn probability_is_clamped() {
        // Streak and ratio corrections stack past the floor.
        let history = [W, W, W, W, W, W, W, W, W, W];
        let p = white_probability(1500, 1200, &history, &[B, B]);
        assert_eq!(p, 0.1);

        let history = [B, B, B, B, B, B, B, B, B, B];
        let p = white_probability(1200, 1500, &history, &[W, W]);
        assert_eq!(p, 0.9);
    }

    #[test]
    fn sample_decides_the_coin() {
        assert!(first_gets_white(0.6, 0.59));
        assert!(!first_gets_white(0.6, 0.6));
    }
}
