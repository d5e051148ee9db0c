use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{interval, Instant};
use tracing::{debug, error, info, warn};

use shared::models::durable::{DurableGame, DurablePlayer, GameResultDoc, GameStatus};
use shared::models::events::{EventEnvelope, GameEvent};
use shared::models::game::GameScore;
use shared::repositories::errors::GameStoreError;
use shared::repositories::GameStore;

const HIGH_BATCH_MAX: usize = 10;
const HIGH_FLUSH_AFTER: Duration = Duration::from_secs(1);
const MEDIUM_BATCH_MAX: usize = 100;
const MEDIUM_FLUSH_AFTER: Duration = Duration::from_secs(5);
const LOW_FLUSH_AFTER: Duration = Duration::from_secs(10);
/// Backpressure bound: beyond this, new LOW events are dropped.
const LOW_PENDING_MAX: usize = 512;

const MAX_WRITE_ATTEMPTS: u32 = 3;
const RETRY_BASE_BACKOFF: Duration = Duration::from_millis(100);

/// Every 10th move also snapshots the position into `fenHistory`.
const FEN_SNAPSHOT_EVERY: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Priority {
    High,
    Medium,
    Low,
}

/// Priority of a bus event for durable persistence. Game-ending and
/// low-clock events go out first; time updates are droppable noise.
pub fn priority_of(envelope: &EventEnvelope) -> Priority {
    match &envelope.event {
        GameEvent::GameEnded { .. }
        | GameEvent::PlayerResigned { .. }
        | GameEvent::DrawAccepted { .. }
        | GameEvent::RatingUpdated { .. } => Priority::High,
        GameEvent::MoveMade { time_left_ms, .. } => {
            if time_left_ms.white < 30_000 || time_left_ms.black < 30_000 {
                Priority::High
            } else {
                Priority::Medium
            }
        }
        GameEvent::TimeUpdate {
            white_ms, black_ms, ..
        } => {
            let min = (*white_ms).min(*black_ms);
            if min < 10_000 {
                Priority::High
            } else if min < 60_000 {
                Priority::Medium
            } else {
                Priority::Low
            }
        }
        GameEvent::GameStarted { .. } => Priority::Medium,
        _ => Priority::Low,
    }
}

struct Bucket {
    items: Vec<EventEnvelope>,
    oldest: Option<Instant>,
}

impl Bucket {
    fn new() -> Bucket {
        Bucket {
            items: Vec::new(),
            oldest: None,
        }
    }

    fn push(&mut self, envelope: EventEnvelope) {
        if self.items.is_empty() {
            self.oldest = Some(Instant::now());
        }
        self.items.push(envelope);
    }

    fn due(&self, after: Duration) -> bool {
        matches!(self.oldest, Some(oldest) if oldest.elapsed() >= after)
    }

    fn take(&mut self) -> Vec<EventEnvelope> {
        self.oldest = None;
        std::mem::take(&mut self.items)
    }
}

/// At-least-once consumer that turns bus events into document-store writes.
/// Batches by priority; failed batches retry with exponential backoff and
/// finally land in the dead-letter log. Game-ending state survives a lost
/// write regardless: the finalization guard keeps it recomputable from the
/// live store on restart.
pub struct PersistencePipeline {
    store: Arc<dyn GameStore>,
    high: Bucket,
    medium: Bucket,
    /// LOW events coalesce by (game id, event type): only the newest one of
    /// a kind matters.
    low: HashMap<(Option<String>, &'static str), EventEnvelope>,
    low_oldest: Option<Instant>,
    low_dropped: u64,
}

impl PersistencePipeline {
    pub fn new(store: Arc<dyn GameStore>) -> PersistencePipeline {
        PersistencePipeline {
            store,
            high: Bucket::new(),
            medium: Bucket::new(),
            low: HashMap::new(),
            low_oldest: None,
            low_dropped: 0,
        }
    }

    /// Consume the bus feed until the sender side closes, then drain.
    pub async fn run(mut self, mut rx: mpsc::Receiver<EventEnvelope>) {
        let mut ticker = interval(Duration::from_millis(250));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                received = rx.recv() => match received {
                    Some(envelope) => self.ingest(envelope).await,
                    None => break,
                },
                _ = ticker.tick() => self.flush_due().await,
            }
        }
        info!(
            "Persistence pipeline draining ({} dropped LOW events this run)",
            self.low_dropped
        );
        self.flush_all().await;
    }

    async fn ingest(&mut self, envelope: EventEnvelope) {
        match priority_of(&envelope) {
            Priority::High => {
                self.high.push(envelope);
                if self.high.items.len() >= HIGH_BATCH_MAX {
                    let batch = self.high.take();
                    self.write_batch(batch).await;
                }
            }
            Priority::Medium => {
                self.medium.push(envelope);
                if self.medium.items.len() >= MEDIUM_BATCH_MAX {
                    let batch = self.medium.take();
                    self.write_batch(batch).await;
                }
            }
            Priority::Low => {
                if self.low.len() >= LOW_PENDING_MAX {
                    self.low_dropped += 1;
                    debug!("Dropping LOW event under backpressure");
                    return;
                }
                if self.low.is_empty() {
                    self.low_oldest = Some(Instant::now());
                }
                let key = (envelope.game_id.clone(), envelope.event.event_type());
                self.low.insert(key, envelope);
            }
        }
    }

    async fn flush_due(&mut self) {
        if self.high.due(HIGH_FLUSH_AFTER) {
            let batch = self.high.take();
            self.write_batch(batch).await;
        }
        if self.medium.due(MEDIUM_FLUSH_AFTER) {
            let batch = self.medium.take();
            self.write_batch(batch).await;
        }
        let low_due =
            matches!(self.low_oldest, Some(oldest) if oldest.elapsed() >= LOW_FLUSH_AFTER);
        if low_due {
            let batch = self.take_low();
            self.write_batch(batch).await;
        }
    }

    fn take_low(&mut self) -> Vec<EventEnvelope> {
        self.low_oldest = None;
        self.low.drain().map(|(_, v)| v).collect()
    }

    /// Drain order is causal, not priority: pending skeletons and moves land
    /// before the completion writes that reference them.
    async fn flush_all(&mut self) {
        let batch = self.medium.take();
        self.write_batch(batch).await;
        let batch = self.high.take();
        self.write_batch(batch).await;
        let batch = self.take_low();
        self.write_batch(batch).await;
    }

    async fn write_batch(&self, batch: Vec<EventEnvelope>) {
        if batch.is_empty() {
            return;
        }
        let mut pending = batch;
        for attempt in 0..MAX_WRITE_ATTEMPTS {
            if attempt > 0 {
                tokio::time::sleep(RETRY_BASE_BACKOFF * 2u32.pow(attempt - 1)).await;
            }
            let mut failed = Vec::new();
            for envelope in pending {
                if let Err(e) = self.apply(&envelope).await {
                    warn!(
                        "Durable write failed for {} (attempt {}): {}",
                        envelope.event_type(),
                        attempt + 1,
                        e
                    );
                    failed.push(envelope);
                }
            }
            if failed.is_empty() {
                return;
            }
            pending = failed;
        }
        for envelope in pending {
            self.dead_letter(&envelope);
        }
    }

    fn dead_letter(&self, envelope: &EventEnvelope) {
        match serde_json::to_string(envelope) {
            Ok(body) => error!("DEAD-LETTER {}: {}", envelope.event_type(), body),
            Err(_) => error!("DEAD-LETTER {}: <unencodable>", envelope.event_type()),
        }
    }

    /// One durable write per event kind.
    async fn apply(&self, envelope: &EventEnvelope) -> Result<(), GameStoreError> {
        match &envelope.event {
            GameEvent::GameStarted {
                game_id,
                players,
                game_info,
                initial_fen,
                rating_changes,
                ..
            } => {
                // The creating node normally wrote the skeleton already; the
                // conditional upsert makes this the recovery path when that
                // write was lost.
                let skeleton = DurableGame {
                    game_id: game_id.clone(),
                    players: players
                        .iter()
                        .map(|p| DurablePlayer {
                            player_id: p.player_id.clone(),
                            color: p.color,
                            pre_rating: p.rating,
                            post_rating: None,
                        })
                        .collect(),
                    variant: game_info.variant,
                    time_control: game_info.time_control,
                    initial_fen: initial_fen.clone(),
                    moves: Vec::new(),
                    pgn: String::new(),
                    fen_history: Vec::new(),
                    status: GameStatus::Ongoing,
                    result: None,
                    started_at: envelope.timestamp,
                    ended_at: None,
                    rating_changes: *rating_changes,
                    rematch_of: None,
                    rematch_game_id: None,
                };
                self.store.upsert_skeleton(&skeleton).await
            }
            GameEvent::MoveMade {
                game_id,
                played,
                fen,
                pgn,
                move_number,
                ..
            } => {
                let snapshot = if move_number % FEN_SNAPSHOT_EVERY == 0 {
                    Some(fen.as_str())
                } else {
                    None
                };
                self.store.append_move(game_id, played, pgn, snapshot).await
            }
            GameEvent::GameEnded {
                game_id,
                winner,
                reason,
                score,
                final_pgn,
                rating_changes,
                ..
            } => {
                let result = GameResultDoc {
                    winner: *winner,
                    reason: *reason,
                    score: *score,
                };
                self.store
                    .complete_game(game_id, &result, envelope.timestamp, final_pgn)
                    .await?;
                if let Some(changes) = rating_changes {
                    for change in changes {
                        self.store
                            .set_post_rating(game_id, &change.player_id, change.new_rating)
                            .await?;
                    }
                }
                Ok(())
            }
            GameEvent::PlayerResigned { game_id, color, .. } => {
                // Synthetic completion; the authoritative game_ended write
                // follows and is idempotent over this one.
                let winner = Some(color.opposite());
                let result = GameResultDoc {
                    winner,
                    reason: shared::models::game::EndReason::Resignation,
                    score: GameScore::from_winner(winner),
                };
                let pgn = self
                    .store
                    .get_game(game_id)
                    .await?
                    .map(|g| g.pgn)
                    .unwrap_or_default();
                self.store
                    .complete_game(game_id, &result, envelope.timestamp, &pgn)
                    .await
            }
            GameEvent::DrawAccepted { game_id } => {
                let result = GameResultDoc {
                    winner: None,
                    reason: shared::models::game::EndReason::Agreement,
                    score: GameScore::Draw,
                };
                let pgn = self
                    .store
                    .get_game(game_id)
                    .await?
                    .map(|g| g.pgn)
                    .unwrap_or_default();
                self.store
                    .complete_game(game_id, &result, envelope.timestamp, &pgn)
                    .await
            }
            GameEvent::RatingUpdated {
                game_id,
                player_id,
                new_rating,
                ..
            } => self.store.set_post_rating(game_id, player_id, *new_rating).await,
            GameEvent::RematchAccepted {
                game_id,
                new_game_id,
            } => self.store.link_rematch(game_id, new_game_id).await,
            // Presence, offers, matchmaking, and time updates carry no
            // durable state.
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use shared::models::events::EventEnvelope;
    use shared::models::game::{
        Color, EndReason, GameInfo, GamePlayer, GameVariant, MoveRecord, TimeControl, TimeLeft,
        STARTING_FEN,
    };
    use shared::models::rating::AppliedRating;
    use shared::repositories::InMemoryGameStore;

    fn players() -> [GamePlayer; 2] {
        [
            GamePlayer {
                player_id: "alice".to_string(),
                color: Color::White,
                rating: 1200,
                connection_id: None,
            },
            GamePlayer {
                player_id: "bob".to_string(),
                color: Color::Black,
                rating: 1250,
                connection_id: None,
            },
        ]
    }

    fn game_info() -> GameInfo {
        let time_control = TimeControl {
            time: 600,
            increment: 0,
        };
        GameInfo {
            variant: GameVariant::Rapid,
            game_type: time_control.game_type(GameVariant::Rapid),
            time_control,
        }
    }

    fn started(game_id: &str, ts: i64) -> EventEnvelope {
        EventEnvelope::new(
            "node-a",
            ts,
            GameEvent::GameStarted {
                game_id: game_id.to_string(),
                players: players(),
                game_info: game_info(),
                initial_fen: STARTING_FEN.to_string(),
                time_left_ms: TimeLeft {
                    white: 600_000,
                    black: 600_000,
                },
                rating_changes: None,
            },
        )
    }

    fn move_made(game_id: &str, number: u32, clock_ms: u64) -> EventEnvelope {
        EventEnvelope::new(
            "node-a",
            number as i64,
            GameEvent::MoveMade {
                game_id: game_id.to_string(),
                player_id: "alice".to_string(),
                played: MoveRecord {
                    san: format!("m{}", number),
                    from: "e2".to_string(),
                    to: "e4".to_string(),
                    piece: "p".to_string(),
                    captured: None,
                    promotion: None,
                    timestamp: number as i64,
                },
                fen: format!("fen-{}", number),
                pgn: format!("pgn-{}", number),
                move_number: number,
                time_left_ms: TimeLeft {
                    white: clock_ms,
                    black: clock_ms,
                },
                turn: Color::Black,
            },
        )
    }

    #[test]
    fn priorities_follow_the_clock_and_event_kind() {
        let ended = EventEnvelope::new(
            "n",
            9,
            GameEvent::GameEnded {
                game_id: "g".to_string(),
                winner: Some(Color::White),
                reason: EndReason::Checkmate,
                score: GameScore::WhiteWins,
                final_fen: String::new(),
                final_pgn: String::new(),
                rating_changes: None,
            },
        );
        assert_eq!(priority_of(&ended), Priority::High);

        assert_eq!(priority_of(&move_made("g", 1, 300_000)), Priority::Medium);
        assert_eq!(priority_of(&move_made("g", 1, 20_000)), Priority::High);

        let time_update = |ms: u64| {
            EventEnvelope::new(
                "n",
                1,
                GameEvent::TimeUpdate {
                    game_id: "g".to_string(),
                    white_ms: ms,
                    black_ms: 600_000,
                    current_turn: Color::White,
                },
            )
        };
        assert_eq!(priority_of(&time_update(5_000)), Priority::High);
        assert_eq!(priority_of(&time_update(45_000)), Priority::Medium);
        assert_eq!(priority_of(&time_update(300_000)), Priority::Low);

        let offer = EventEnvelope::new(
            "n",
            1,
            GameEvent::DrawOffered {
                game_id: "g".to_string(),
                by: Color::White,
            },
        );
        assert_eq!(priority_of(&offer), Priority::Low);
    }

    #[tokio::test]
    async fn pipeline_writes_moves_endings_and_ratings() {
        let store = Arc::new(InMemoryGameStore::new());
        let pipeline = PersistencePipeline::new(store.clone());
        let (tx, rx) = mpsc::channel(64);
        let handle = tokio::spawn(pipeline.run(rx));

        tx.send(started("g-1", 100)).await.unwrap();
        for number in 1..=12 {
            tx.send(move_made("g-1", number, 500_000)).await.unwrap();
        }
        tx.send(EventEnvelope::new(
            "node-a",
            9_000,
            GameEvent::GameEnded {
                game_id: "g-1".to_string(),
                winner: Some(Color::Black),
                reason: EndReason::Resignation,
                score: GameScore::BlackWins,
                final_fen: "fen-final".to_string(),
                final_pgn: "pgn-final".to_string(),
                rating_changes: Some(vec![
                    AppliedRating {
                        player_id: "alice".to_string(),
                        old_rating: 1200,
                        new_rating: 1184,
                    },
                    AppliedRating {
                        player_id: "bob".to_string(),
                        old_rating: 1250,
                        new_rating: 1266,
                    },
                ]),
            },
        ))
        .await
        .unwrap();

        // Closing the channel drains every bucket.
        drop(tx);
        handle.await.unwrap();

        let game = store.game("g-1").expect("skeleton written");
        assert_eq!(game.moves.len(), 12);
        assert_eq!(game.pgn, "pgn-final");
        // Snapshot exactly at the 10th move.
        assert_eq!(game.fen_history, vec!["fen-10".to_string()]);
        assert_eq!(game.status, GameStatus::Completed);
        let result = game.result.expect("completed");
        assert_eq!(result.reason, EndReason::Resignation);
        assert_eq!(result.score, GameScore::BlackWins);
        assert_eq!(game.ended_at, Some(9_000));
        assert_eq!(game.players[0].post_rating, Some(1184));
        assert_eq!(game.players[1].post_rating, Some(1266));
    }

    #[tokio::test]
    async fn low_events_coalesce_by_game_and_kind() {
        let store = Arc::new(InMemoryGameStore::new());
        let mut pipeline = PersistencePipeline::new(store);
        for ms in [600_000u64, 500_000, 400_000] {
            pipeline
                .ingest(EventEnvelope::new(
                    "n",
                    1,
                    GameEvent::TimeUpdate {
                        game_id: "g".to_string(),
                        white_ms: ms,
                        black_ms: ms,
                        current_turn: Color::White,
                    },
                ))
                .await;
        }
        assert_eq!(pipeline.low.len(), 1);
        match &pipeline.low.values().next().unwrap().event {
            GameEvent::TimeUpdate { white_ms, .. } => assert_eq!(*white_ms, 400_000),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn high_batches_flush_at_capacity() {
        let store = Arc::new(InMemoryGameStore::new());
        let mut pipeline = PersistencePipeline::new(store.clone());
        pipeline.ingest(started("g-2", 1)).await;
        // Flush MEDIUM so the skeleton exists before the HIGH moves land.
        pipeline.flush_all().await;

        for number in 1..=HIGH_BATCH_MAX as u32 {
            pipeline.ingest(move_made("g-2", number, 10_000)).await;
        }
        // Capacity reached: the batch is already written, no tick needed.
        assert!(pipeline.high.items.is_empty());
        assert_eq!(store.game("g-2").unwrap().moves.len(), HIGH_BATCH_MAX);
    }
}
