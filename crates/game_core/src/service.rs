use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use shared::bus::EventBus;
use shared::models::durable::DurableGame;
use shared::models::events::{EventEnvelope, GameEvent};
use shared::models::game::{
    Color, EndReason, GameInfo, GamePlayer, GameScore, GameVariant, LiveGame, MoveRecord,
    TimeControl,
};
use shared::models::player::PlayerProfile;
use shared::models::rating::AppliedRating;
use shared::repositories::errors::StoreError;
use shared::repositories::{GameStore, LiveGameRepository, UserProfileStore};
use shared::services::{ChessService, RatingService};
use time_manager::{TimeManager, TimeoutHandler};

use crate::errors::GameSessionServiceError;

/// Backoff before the single retry of a live-store read during a move.
const STORE_RETRY_BACKOFF: Duration = Duration::from_millis(50);

#[derive(Debug, Clone)]
pub struct PlayerDto {
    pub player_id: String,
    pub rating: i32,
    pub connection_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct GameEndSummary {
    pub winner: Option<Color>,
    pub reason: EndReason,
    pub score: GameScore,
    pub rating_changes: Vec<AppliedRating>,
}

#[derive(Debug, Clone)]
pub struct MoveOutcome {
    pub game: LiveGame,
    pub san: String,
    pub fen: String,
    pub move_number: u32,
    pub game_end: Option<GameEndSummary>,
}

/// Authoritative game state machine. Every mutation of a live game passes
/// through here; concurrency losers observe `NotYourTurn` or `Finalized`.
pub struct GameSessionService {
    live_games: LiveGameRepository,
    game_store: Arc<dyn GameStore>,
    profiles: Arc<dyn UserProfileStore>,
    chess: ChessService,
    ratings: RatingService,
    time_manager: Arc<TimeManager>,
    bus: Arc<dyn EventBus>,
    node_id: String,
}

impl GameSessionService {
    pub fn new(
        live_games: LiveGameRepository,
        game_store: Arc<dyn GameStore>,
        profiles: Arc<dyn UserProfileStore>,
        time_manager: Arc<TimeManager>,
        bus: Arc<dyn EventBus>,
        node_id: &str,
    ) -> GameSessionService {
        GameSessionService {
            live_games,
            game_store,
            profiles,
            chess: ChessService::new(),
            ratings: RatingService::new(),
            time_manager,
            bus,
            node_id: node_id.to_string(),
        }
    }

    async fn publish(&self, event: GameEvent) {
        let envelope = EventEnvelope::new(&self.node_id, Utc::now().timestamp_millis(), event);
        if let Err(e) = self.bus.publish(envelope).await {
            // Local fan-out already happened synchronously; remote delivery
            // degrades until the bus recovers.
            warn!("Failed to publish event: {}", e);
        }
    }

    async fn profile_or_default(&self, dto: &PlayerDto, variant: GameVariant) -> PlayerProfile {
        match self.profiles.get_profile(&dto.player_id).await {
            Ok(profile) => profile,
            Err(e) => {
                warn!("Profile fetch failed for {}: {}", dto.player_id, e);
                let mut profile = PlayerProfile::new(&dto.player_id);
                profile.ratings.set(variant, dto.rating);
                profile
            }
        }
    }

    /// One retry with small backoff on an unavailable store, then surface.
    async fn load_game(&self, game_id: &str) -> Result<LiveGame, GameSessionServiceError> {
        let loaded = match self.live_games.load(game_id).await {
            Err(StoreError::Unavailable(_)) => {
                tokio::time::sleep(STORE_RETRY_BACKOFF).await;
                self.live_games.load(game_id).await
            }
            other => other,
        };
        loaded?.ok_or(GameSessionServiceError::NotFound)
    }

    /// Create a live game plus its durable skeleton, register the clock, and
    /// announce it. Players arrive already ordered white-first.
    pub async fn create_game(
        &self,
        white: PlayerDto,
        black: PlayerDto,
        variant: GameVariant,
        time_control: TimeControl,
        rematch_of: Option<String>,
    ) -> Result<LiveGame, GameSessionServiceError> {
        let game_id = Uuid::new_v4().to_string();
        let now = Utc::now().timestamp_millis();

        let white_profile = self.profile_or_default(&white, variant).await;
        let black_profile = self.profile_or_default(&black, variant).await;

        let game_info = GameInfo {
            variant,
            game_type: time_control.game_type(variant),
            time_control,
        };
        let mut game = LiveGame::new(
            game_id.clone(),
            GamePlayer {
                player_id: white.player_id.clone(),
                color: Color::White,
                rating: white_profile.ratings.get(variant),
                connection_id: white.connection_id.clone(),
            },
            GamePlayer {
                player_id: black.player_id.clone(),
                color: Color::Black,
                rating: black_profile.ratings.get(variant),
                connection_id: black.connection_id.clone(),
            },
            game_info,
            now,
        );
        game.rating_changes = Some(self.ratings.changes(&white_profile, &black_profile, variant));

        if let Err(e) = self
            .game_store
            .upsert_skeleton(&DurableGame::skeleton(&game, rematch_of))
            .await
        {
            // The pipeline re-upserts the skeleton from the game_started
            // event, so a failed synchronous write is not fatal.
            warn!("Skeleton write failed for game {}: {}", game_id, e);
        }

        self.live_games.save(&game).await?;
        self.time_manager.register_game(&game);

        info!(
            "Created game {} ({} vs {}, {})",
            game_id, white.player_id, black.player_id, game.game_info.game_type
        );
        self.publish(GameEvent::GameStarted {
            game_id,
            players: game.players.clone(),
            game_info: game.game_info.clone(),
            initial_fen: game.initial_fen.clone(),
            time_left_ms: game.time_left_ms,
            rating_changes: game.rating_changes,
        })
        .await;

        Ok(game)
    }

    /// Validate and apply one move: turn check, legality via replay, clock
    /// deduction with increment, terminal classification.
    pub async fn make_move(
        &self,
        game_id: &str,
        player_id: &str,
        san: &str,
        from: Option<&str>,
        to: Option<&str>,
    ) -> Result<MoveOutcome, GameSessionServiceError> {
        let mut game = self.load_game(game_id).await?;
        if game.game_over {
            return Err(GameSessionServiceError::Finalized);
        }
        let color = game
            .color_of(player_id)
            .ok_or(GameSessionServiceError::NotAPlayer)?;
        if color != game.turn {
            return Err(GameSessionServiceError::NotYourTurn);
        }

        let sans: Vec<String> = game.moves.iter().map(|m| m.san.clone()).collect();
        let mut position = self.chess.replay(&game.initial_fen, &sans)?;
        let applied = self.chess.apply_move(&mut position, san, from, to)?;

        let now = Utc::now().timestamp_millis();
        let elapsed = (now - game.last_move_at).max(0);
        let increment = game.game_info.time_control.increment_ms() as i64;
        let left = game.time_left_ms.get(color) as i64;
        game.time_left_ms
            .set(color, (left - elapsed + increment).max(0) as u64);

        let record = MoveRecord {
            san: applied.san.clone(),
            from: applied.from.clone(),
            to: applied.to.clone(),
            piece: applied.piece.clone(),
            captured: applied.captured.clone(),
            promotion: applied.promotion.clone(),
            timestamp: now,
        };
        game.moves.push(record.clone());
        let move_number = game.moves.len() as u32;
        append_to_pgn(&mut game.pgn, move_number, &applied.san);
        game.turn = applied.turn;
        game.last_move_at = now;
        // An accepted move invalidates any standing draw offer.
        game.draw_offer = None;

        let terminal = self.chess.terminal(&position);
        if terminal.over {
            let reason = terminal
                .reason
                .ok_or_else(|| GameSessionServiceError::Internal("terminal without reason".into()))?;
            let winner = match reason {
                EndReason::Checkmate => Some(color),
                _ => None,
            };
            let summary = self.finalize(&mut game, winner, reason).await?;
            return Ok(MoveOutcome {
                san: applied.san,
                fen: applied.new_fen,
                move_number,
                game_end: Some(summary),
                game,
            });
        }

        self.live_games.save(&game).await?;
        self.time_manager
            .on_move(game_id, now, game.turn, game.time_left_ms);

        self.publish(GameEvent::MoveMade {
            game_id: game_id.to_string(),
            player_id: player_id.to_string(),
            played: record,
            fen: applied.new_fen.clone(),
            pgn: game.pgn.clone(),
            move_number,
            time_left_ms: game.time_left_ms,
            turn: game.turn,
        })
        .await;

        Ok(MoveOutcome {
            san: applied.san,
            fen: applied.new_fen,
            move_number,
            game_end: None,
            game,
        })
    }

    pub async fn resign(
        &self,
        game_id: &str,
        player_id: &str,
    ) -> Result<GameEndSummary, GameSessionServiceError> {
        let mut game = self.load_game(game_id).await?;
        if game.game_over {
            return Err(GameSessionServiceError::Finalized);
        }
        let color = game
            .color_of(player_id)
            .ok_or(GameSessionServiceError::NotAPlayer)?;

        self.publish(GameEvent::PlayerResigned {
            game_id: game_id.to_string(),
            player_id: player_id.to_string(),
            color,
        })
        .await;

        self.finalize(&mut game, Some(color.opposite()), EndReason::Resignation)
            .await
    }

    pub async fn offer_draw(
        &self,
        game_id: &str,
        player_id: &str,
    ) -> Result<(), GameSessionServiceError> {
        let mut game = self.load_game(game_id).await?;
        if game.game_over {
            return Err(GameSessionServiceError::Finalized);
        }
        let color = game
            .color_of(player_id)
            .ok_or(GameSessionServiceError::NotAPlayer)?;
        if game.draw_offer == Some(color) {
            // Re-offering is a no-op, not an error.
            return Ok(());
        }
        game.draw_offer = Some(color);
        self.live_games.save(&game).await?;
        self.publish(GameEvent::DrawOffered {
            game_id: game_id.to_string(),
            by: color,
        })
        .await;
        Ok(())
    }

    pub async fn accept_draw(
        &self,
        game_id: &str,
        player_id: &str,
    ) -> Result<GameEndSummary, GameSessionServiceError> {
        let mut game = self.load_game(game_id).await?;
        if game.game_over {
            return Err(GameSessionServiceError::Finalized);
        }
        let color = game
            .color_of(player_id)
            .ok_or(GameSessionServiceError::NotAPlayer)?;
        match game.draw_offer {
            Some(by) if by == color.opposite() => {}
            _ => {
                return Err(GameSessionServiceError::BadRequest(
                    "no draw offer from opponent".to_string(),
                ))
            }
        }

        self.publish(GameEvent::DrawAccepted {
            game_id: game_id.to_string(),
        })
        .await;

        self.finalize(&mut game, None, EndReason::Agreement).await
    }

    pub async fn decline_draw(
        &self,
        game_id: &str,
        player_id: &str,
    ) -> Result<(), GameSessionServiceError> {
        let mut game = self.load_game(game_id).await?;
        let color = game
            .color_of(player_id)
            .ok_or(GameSessionServiceError::NotAPlayer)?;
        if game.draw_offer.is_none() {
            return Ok(());
        }
        game.draw_offer = None;
        self.live_games.save(&game).await?;
        self.publish(GameEvent::DrawDeclined {
            game_id: game_id.to_string(),
            by: color,
        })
        .await;
        Ok(())
    }

    pub async fn offer_rematch(
        &self,
        game_id: &str,
        player_id: &str,
    ) -> Result<(), GameSessionServiceError> {
        let mut game = self.load_game(game_id).await?;
        if !game.game_over {
            return Err(GameSessionServiceError::BadRequest(
                "game is still in progress".to_string(),
            ));
        }
        let color = game
            .color_of(player_id)
            .ok_or(GameSessionServiceError::NotAPlayer)?;
        if game.rematch_offer == Some(color) {
            return Ok(());
        }
        game.rematch_offer = Some(color);
        self.live_games.save(&game).await?;
        self.publish(GameEvent::RematchOffered {
            game_id: game_id.to_string(),
            by: color,
        })
        .await;
        Ok(())
    }

    /// Accepting a rematch spins up a fresh game with swapped colors and a
    /// fresh clock, linked to the finished one.
    pub async fn accept_rematch(
        &self,
        game_id: &str,
        player_id: &str,
    ) -> Result<LiveGame, GameSessionServiceError> {
        let mut game = self.load_game(game_id).await?;
        if !game.game_over {
            return Err(GameSessionServiceError::BadRequest(
                "game is still in progress".to_string(),
            ));
        }
        let color = game
            .color_of(player_id)
            .ok_or(GameSessionServiceError::NotAPlayer)?;
        match game.rematch_offer {
            Some(by) if by == color.opposite() => {}
            _ => {
                return Err(GameSessionServiceError::BadRequest(
                    "no rematch offer from opponent".to_string(),
                ))
            }
        }

        let old_white = game.player_of(Color::White).clone();
        let old_black = game.player_of(Color::Black).clone();
        let new_game = self
            .create_game(
                PlayerDto {
                    player_id: old_black.player_id.clone(),
                    rating: old_black.rating,
                    connection_id: old_black.connection_id.clone(),
                },
                PlayerDto {
                    player_id: old_white.player_id.clone(),
                    rating: old_white.rating,
                    connection_id: old_white.connection_id.clone(),
                },
                game.game_info.variant,
                game.game_info.time_control,
                Some(game_id.to_string()),
            )
            .await?;

        game.rematch_offer = None;
        game.rematch_game_id = Some(new_game.game_id.clone());
        self.live_games.save(&game).await?;

        self.publish(GameEvent::RematchAccepted {
            game_id: game_id.to_string(),
            new_game_id: new_game.game_id.clone(),
        })
        .await;

        Ok(new_game)
    }

    /// Invoked by the clock scanner; the flag fell for `color`.
    pub async fn timeout_forfeit_game(
        &self,
        game_id: &str,
        color: Color,
    ) -> Result<GameEndSummary, GameSessionServiceError> {
        let mut game = self.load_game(game_id).await?;
        if game.game_over {
            return Err(GameSessionServiceError::Finalized);
        }
        game.time_left_ms.set(color, 0);
        self.finalize(&mut game, Some(color.opposite()), EndReason::Timeout)
            .await
    }

    /// A reconnecting player rejoins its game: resume the clock and hand back
    /// the authoritative view.
    pub async fn rejoin(
        &self,
        game_id: &str,
        player_id: &str,
    ) -> Result<LiveGame, GameSessionServiceError> {
        let game = self.load_game(game_id).await?;
        if game.player(player_id).is_none() {
            return Err(GameSessionServiceError::NotAPlayer);
        }
        if !game.game_over {
            self.time_manager.resume(game_id);
            self.publish(GameEvent::PlayerReconnected {
                player_id: player_id.to_string(),
                game_id: Some(game_id.to_string()),
            })
            .await;
        }
        Ok(game)
    }

    /// Terminate a game exactly once. The atomic `gameOver` flip in the live
    /// store serializes finalization across nodes; only the winner of the
    /// flip updates ratings and publishes `game_ended`.
    async fn finalize(
        &self,
        game: &mut LiveGame,
        winner: Option<Color>,
        reason: EndReason,
    ) -> Result<GameEndSummary, GameSessionServiceError> {
        if !self.live_games.claim_finalization(&game.game_id).await? {
            return Err(GameSessionServiceError::Finalized);
        }

        let score = GameScore::from_winner(winner);
        game.game_over = true;
        game.winner = winner;
        game.result = Some(score);
        game.end_reason = Some(reason);
        self.live_games.save(game).await?;
        self.time_manager.remove_game(&game.game_id);

        let rating_changes = self.apply_ratings(game, score).await;

        info!(
            "Game {} ended: {} ({})",
            game.game_id,
            score.as_str(),
            reason.as_str()
        );

        let sans: Vec<String> = game.moves.iter().map(|m| m.san.clone()).collect();
        let final_fen = match self.chess.replay(&game.initial_fen, &sans) {
            Ok(position) => self.chess.current_fen(&position),
            Err(e) => {
                warn!("Replay failed for finished game {}: {}", game.game_id, e);
                game.initial_fen.clone()
            }
        };

        self.publish(GameEvent::GameEnded {
            game_id: game.game_id.clone(),
            winner,
            reason,
            score,
            final_fen,
            final_pgn: game.pgn.clone(),
            rating_changes: Some(rating_changes.clone()),
        })
        .await;

        Ok(GameEndSummary {
            winner,
            reason,
            score,
            rating_changes,
        })
    }

    /// Elo updates for both players. Runs only on the finalization winner, so
    /// deltas apply exactly once per game.
    async fn apply_ratings(&self, game: &LiveGame, score: GameScore) -> Vec<AppliedRating> {
        let variant = game.game_info.variant;
        let white = game.player_of(Color::White).clone();
        let black = game.player_of(Color::Black).clone();

        let white_profile = match self.profiles.get_profile(&white.player_id).await {
            Ok(profile) => profile,
            Err(e) => {
                warn!("Rating update skipped, profile fetch failed: {}", e);
                return Vec::new();
            }
        };
        let black_profile = match self.profiles.get_profile(&black.player_id).await {
            Ok(profile) => profile,
            Err(e) => {
                warn!("Rating update skipped, profile fetch failed: {}", e);
                return Vec::new();
            }
        };

        let mut applied = Vec::new();
        for (player, profile, opponent_profile, color) in [
            (&white, &white_profile, &black_profile, Color::White),
            (&black, &black_profile, &white_profile, Color::Black),
        ] {
            let rating = profile.ratings.get(variant);
            let opponent_rating = opponent_profile.ratings.get(variant);
            let s = score.points_for(color);
            let delta = self
                .ratings
                .delta(rating, opponent_rating, profile.games_played, s);
            let new_rating = self.ratings.apply(rating, delta);

            match self
                .profiles
                .apply_game_result(&player.player_id, variant, new_rating, s)
                .await
            {
                Ok(_) => {
                    applied.push(AppliedRating {
                        player_id: player.player_id.clone(),
                        old_rating: rating,
                        new_rating,
                    });
                    self.publish(GameEvent::RatingUpdated {
                        game_id: game.game_id.clone(),
                        player_id: player.player_id.clone(),
                        old_rating: rating,
                        new_rating,
                    })
                    .await;
                }
                Err(e) => warn!(
                    "Rating write failed for {} in game {}: {}",
                    player.player_id, game.game_id, e
                ),
            }
        }
        applied
    }
}

/// The timeout seam used by the clock scanner. Finalization races are
/// expected here and swallowed: the game is already over.
#[async_trait]
impl TimeoutHandler for GameSessionService {
    async fn timeout_forfeit(&self, game_id: &str, color: Color) {
        match self.timeout_forfeit_game(game_id, color).await {
            Ok(_) | Err(GameSessionServiceError::Finalized) => {}
            Err(e) => warn!("Timeout forfeit failed for game {}: {}", game_id, e),
        }
    }
}

fn append_to_pgn(pgn: &mut String, move_number: u32, san: &str) {
    if move_number % 2 == 1 {
        if !pgn.is_empty() {
            pgn.push(' ');
        }
        pgn.push_str(&format!("{}. {}", (move_number + 1) / 2, san));
    } else {
        pgn.push(' ');
        pgn.push_str(san);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use tokio::sync::mpsc;

    use shared::bus::BusError;
    use shared::models::events::Topic;
    use shared::models::player::Ratings;
    use shared::repositories::{
        InMemoryGameStore, InMemoryLiveStore, InMemoryUserProfileStore, LiveStore,
    };

    struct NullBus;

    #[async_trait]
    impl EventBus for NullBus {
        async fn publish(&self, _envelope: EventEnvelope) -> Result<(), BusError> {
            Ok(())
        }

        async fn subscribe(
            &self,
            _topics: &[Topic],
        ) -> Result<mpsc::Receiver<EventEnvelope>, BusError> {
            let (_tx, rx) = mpsc::channel(1);
            Ok(rx)
        }
    }

    struct Fixture {
        service: GameSessionService,
        live_store: Arc<InMemoryLiveStore>,
        game_store: Arc<InMemoryGameStore>,
        profiles: Arc<InMemoryUserProfileStore>,
        time_manager: Arc<TimeManager>,
    }

    fn fixture() -> Fixture {
        let live_store: Arc<InMemoryLiveStore> = Arc::new(InMemoryLiveStore::new());
        let game_store = Arc::new(InMemoryGameStore::new());
        let profiles = Arc::new(InMemoryUserProfileStore::new());
        let bus: Arc<dyn EventBus> = Arc::new(NullBus);
        let time_manager = TimeManager::new("node-test", bus.clone());
        let service = GameSessionService::new(
            LiveGameRepository::new(live_store.clone() as Arc<dyn LiveStore>),
            game_store.clone(),
            profiles.clone(),
            time_manager.clone(),
            bus,
            "node-test",
        );
        Fixture {
            service,
            live_store,
            game_store,
            profiles,
            time_manager,
        }
    }

    fn dto(player_id: &str, rating: i32) -> PlayerDto {
        PlayerDto {
            player_id: player_id.to_string(),
            rating,
            connection_id: None,
        }
    }

    fn seeded_profile(player_id: &str, rating: i32, games_played: u32) -> PlayerProfile {
        let mut profile = PlayerProfile::new(player_id);
        profile.ratings = Ratings {
            rapid: rating,
            blitz: rating,
            bullet: rating,
        };
        profile.games_played = games_played;
        profile
    }

    async fn rewind_last_move(fixture: &Fixture, game_id: &str, by_ms: i64) {
        let repo = LiveGameRepository::new(fixture.live_store.clone() as Arc<dyn LiveStore>);
        let mut game = repo.load(game_id).await.unwrap().unwrap();
        game.last_move_at -= by_ms;
        repo.save(&game).await.unwrap();
    }

    #[tokio::test]
    async fn create_game_sets_clocks_and_skeleton() {
        let fixture = fixture();
        let game = fixture
            .service
            .create_game(
                dto("alice", 1200),
                dto("bob", 1240),
                GameVariant::Rapid,
                TimeControl {
                    time: 600,
                    increment: 0,
                },
                None,
            )
            .await
            .unwrap();

        assert_eq!(game.time_left_ms.white, 600_000);
        assert_eq!(game.time_left_ms.black, 600_000);
        assert_eq!(game.turn, Color::White);
        assert!(game.rating_changes.is_some());
        assert_eq!(fixture.time_manager.tracked_games(), 1);

        let durable = fixture.game_store.game(&game.game_id).unwrap();
        assert_eq!(durable.players.len(), 2);
        assert!(durable.result.is_none());
    }

    #[tokio::test]
    async fn move_updates_clock_turn_and_pgn() {
        let fixture = fixture();
        let game = fixture
            .service
            .create_game(
                dto("alice", 1200),
                dto("bob", 1200),
                GameVariant::Blitz,
                TimeControl {
                    time: 300,
                    increment: 2,
                },
                None,
            )
            .await
            .unwrap();

        // White thinks for 4 s before e4.
        rewind_last_move(&fixture, &game.game_id, 4000).await;

        let outcome = fixture
            .service
            .make_move(&game.game_id, "alice", "e4", None, None)
            .await
            .unwrap();

        let white_ms = outcome.game.time_left_ms.white;
        assert!(white_ms <= 298_000, "got {}", white_ms);
        assert!(white_ms >= 297_500, "got {}", white_ms);
        assert_eq!(outcome.game.turn, Color::Black);
        assert_eq!(outcome.game.moves.len(), 1);
        assert_eq!(outcome.game.pgn, "1. e4");
        assert_eq!(outcome.move_number, 1);
        assert!(outcome.game_end.is_none());
    }

    #[tokio::test]
    async fn moving_out_of_turn_is_rejected() {
        let fixture = fixture();
        let game = fixture
            .service
            .create_game(
                dto("alice", 1200),
                dto("bob", 1200),
                GameVariant::Rapid,
                TimeControl {
                    time: 600,
                    increment: 0,
                },
                None,
            )
            .await
            .unwrap();

        assert!(matches!(
            fixture
                .service
                .make_move(&game.game_id, "bob", "e5", None, None)
                .await,
            Err(GameSessionServiceError::NotYourTurn)
        ));
        assert!(matches!(
            fixture
                .service
                .make_move(&game.game_id, "mallory", "e4", None, None)
                .await,
            Err(GameSessionServiceError::NotAPlayer)
        ));
        assert!(matches!(
            fixture
                .service
                .make_move("missing", "alice", "e4", None, None)
                .await,
            Err(GameSessionServiceError::NotFound)
        ));
    }

    #[tokio::test]
    async fn checkmate_finalizes_and_applies_ratings_once() {
        let fixture = fixture();
        fixture.profiles.seed(seeded_profile("alice", 1500, 100));
        fixture.profiles.seed(seeded_profile("bob", 1500, 100));

        let game = fixture
            .service
            .create_game(
                dto("alice", 1500),
                dto("bob", 1500),
                GameVariant::Rapid,
                TimeControl {
                    time: 600,
                    increment: 0,
                },
                None,
            )
            .await
            .unwrap();

        let script = [
            ("alice", "e4"),
            ("bob", "e5"),
            ("alice", "Bc4"),
            ("bob", "Nc6"),
            ("alice", "Qh5"),
            ("bob", "Nf6"),
        ];
        for (player, san) in script {
            fixture
                .service
                .make_move(&game.game_id, player, san, None, None)
                .await
                .unwrap();
        }
        let outcome = fixture
            .service
            .make_move(&game.game_id, "alice", "Qxf7", None, None)
            .await
            .unwrap();

        let end = outcome.game_end.expect("scholar's mate ends the game");
        assert_eq!(end.winner, Some(Color::White));
        assert_eq!(end.reason, EndReason::Checkmate);
        assert_eq!(end.score, GameScore::WhiteWins);
        assert_eq!(end.rating_changes.len(), 2);

        let alice = fixture.profiles.get_profile("alice").await.unwrap();
        let bob = fixture.profiles.get_profile("bob").await.unwrap();
        assert_eq!(alice.ratings.rapid, 1516);
        assert_eq!(bob.ratings.rapid, 1484);
        assert_eq!(alice.wins, 1);
        assert_eq!(bob.losses, 1);

        // The game rejects anything further.
        assert!(matches!(
            fixture
                .service
                .make_move(&game.game_id, "bob", "Kxf7", None, None)
                .await,
            Err(GameSessionServiceError::Finalized)
        ));
    }

    #[tokio::test]
    async fn resignation_finalizes_and_a_second_resign_is_a_race_loser() {
        let fixture = fixture();
        fixture.profiles.seed(seeded_profile("alice", 1400, 50));
        fixture.profiles.seed(seeded_profile("bob", 1400, 50));

        let game = fixture
            .service
            .create_game(
                dto("alice", 1400),
                dto("bob", 1400),
                GameVariant::Rapid,
                TimeControl {
                    time: 600,
                    increment: 0,
                },
                None,
            )
            .await
            .unwrap();

        let end = fixture.service.resign(&game.game_id, "bob").await.unwrap();
        assert_eq!(end.winner, Some(Color::White));
        assert_eq!(end.reason, EndReason::Resignation);
        assert_eq!(end.score, GameScore::WhiteWins);

        assert!(matches!(
            fixture.service.resign(&game.game_id, "alice").await,
            Err(GameSessionServiceError::Finalized)
        ));

        // Ratings moved exactly once.
        let alice = fixture.profiles.get_profile("alice").await.unwrap();
        assert_eq!(alice.games_played, 51);
    }

    #[tokio::test]
    async fn draw_agreement_needs_an_opposing_offer() {
        let fixture = fixture();
        let game = fixture
            .service
            .create_game(
                dto("alice", 1300),
                dto("bob", 1300),
                GameVariant::Rapid,
                TimeControl {
                    time: 600,
                    increment: 0,
                },
                None,
            )
            .await
            .unwrap();

        // Accepting with no offer on the table is a bad request.
        assert!(matches!(
            fixture.service.accept_draw(&game.game_id, "bob").await,
            Err(GameSessionServiceError::BadRequest(_))
        ));
        // The offerer cannot accept its own offer.
        fixture.service.offer_draw(&game.game_id, "alice").await.unwrap();
        assert!(matches!(
            fixture.service.accept_draw(&game.game_id, "alice").await,
            Err(GameSessionServiceError::BadRequest(_))
        ));

        let end = fixture.service.accept_draw(&game.game_id, "bob").await.unwrap();
        assert_eq!(end.winner, None);
        assert_eq!(end.reason, EndReason::Agreement);
        assert_eq!(end.score, GameScore::Draw);
    }

    #[tokio::test]
    async fn a_move_clears_a_standing_draw_offer() {
        let fixture = fixture();
        let game = fixture
            .service
            .create_game(
                dto("alice", 1300),
                dto("bob", 1300),
                GameVariant::Rapid,
                TimeControl {
                    time: 600,
                    increment: 0,
                },
                None,
            )
            .await
            .unwrap();

        fixture.service.offer_draw(&game.game_id, "alice").await.unwrap();
        fixture
            .service
            .make_move(&game.game_id, "alice", "e4", None, None)
            .await
            .unwrap();

        assert!(matches!(
            fixture.service.accept_draw(&game.game_id, "bob").await,
            Err(GameSessionServiceError::BadRequest(_))
        ));
    }

    #[tokio::test]
    async fn timeout_forfeit_awards_the_opponent() {
        let fixture = fixture();
        let game = fixture
            .service
            .create_game(
                dto("alice", 1200),
                dto("bob", 1200),
                GameVariant::Bullet,
                TimeControl {
                    time: 60,
                    increment: 0,
                },
                None,
            )
            .await
            .unwrap();

        let end = fixture
            .service
            .timeout_forfeit_game(&game.game_id, Color::White)
            .await
            .unwrap();
        assert_eq!(end.winner, Some(Color::Black));
        assert_eq!(end.reason, EndReason::Timeout);
        assert_eq!(end.score, GameScore::BlackWins);

        let repo = LiveGameRepository::new(fixture.live_store.clone() as Arc<dyn LiveStore>);
        let stored = repo.load(&game.game_id).await.unwrap().unwrap();
        assert!(stored.game_over);
        assert_eq!(stored.time_left_ms.white, 0);
    }

    #[tokio::test]
    async fn rematch_swaps_colors_and_links_games() {
        let fixture = fixture();
        let game = fixture
            .service
            .create_game(
                dto("alice", 1200),
                dto("bob", 1200),
                GameVariant::Rapid,
                TimeControl {
                    time: 600,
                    increment: 0,
                },
                None,
            )
            .await
            .unwrap();

        // Rematch offers only exist on finished games.
        assert!(matches!(
            fixture.service.offer_rematch(&game.game_id, "bob").await,
            Err(GameSessionServiceError::BadRequest(_))
        ));

        fixture.service.resign(&game.game_id, "bob").await.unwrap();
        fixture.service.offer_rematch(&game.game_id, "bob").await.unwrap();
        let new_game = fixture
            .service
            .accept_rematch(&game.game_id, "alice")
            .await
            .unwrap();

        assert_eq!(new_game.player_of(Color::White).player_id, "bob");
        assert_eq!(new_game.player_of(Color::Black).player_id, "alice");
        assert_eq!(new_game.time_left_ms.white, 600_000);

        let repo = LiveGameRepository::new(fixture.live_store.clone() as Arc<dyn LiveStore>);
        let old = repo.load(&game.game_id).await.unwrap().unwrap();
        assert_eq!(old.rematch_game_id.as_deref(), Some(new_game.game_id.as_str()));
    }
}
