use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use tracing::{error, info, warn};

use shared::bus::EventBus;
use shared::models::events::{EventEnvelope, GameEvent};
use shared::models::game::{Color, GameVariant, LiveGame, TimeLeft};

/// Tolerance granted to client `time_up` reports, in milliseconds.
const REPORT_TOLERANCE_MS: i64 = 100;

/// Seam back into the game core; breaks the crate cycle between the scanner
/// and finalization.
#[async_trait]
pub trait TimeoutHandler: Send + Sync {
    async fn timeout_forfeit(&self, game_id: &str, color: Color);
}

#[derive(Debug, Clone, Copy)]
struct ClockEntry {
    last_move_time: i64,
    current_turn: Color,
    active: bool,
    /// Mirror of the live game's banked clocks; kept coherent because every
    /// clock mutation flows through the game core, which notifies us.
    time_left: TimeLeft,
    bullet: bool,
}

fn remaining(entry: &ClockEntry, color: Color, now_ms: i64) -> u64 {
    let banked = entry.time_left.get(color);
    let burning = if color == entry.current_turn && entry.active {
        (now_ms - entry.last_move_time).max(0) as u64
    } else {
        0
    };
    banked.saturating_sub(burning)
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeSync {
    pub white_ms: u64,
    pub black_ms: u64,
    pub current_turn: Color,
    pub now: i64,
}

#[derive(Debug)]
pub enum TimeUpVerdict {
    /// The report checked out; the game was forfeited.
    Forfeited,
    /// The clock still has time; push this correction to the reporter only.
    Corrected(TimeSync),
    UnknownGame,
}

/// Process-wide clock bookkeeping: one scan ticker per node, no per-game
/// timers. Entries exist only for games this node hosts.
pub struct TimeManager {
    node_id: String,
    clocks: Mutex<HashMap<String, ClockEntry>>,
    handler: Mutex<Option<Arc<dyn TimeoutHandler>>>,
    bus: Arc<dyn EventBus>,
}

impl TimeManager {
    pub fn new(node_id: &str, bus: Arc<dyn EventBus>) -> Arc<TimeManager> {
        Arc::new(TimeManager {
            node_id: node_id.to_string(),
            clocks: Mutex::new(HashMap::new()),
            handler: Mutex::new(None),
            bus,
        })
    }

    /// Wire the forfeit path. Called once at node startup, after the game
    /// core exists.
    pub fn set_timeout_handler(&self, handler: Arc<dyn TimeoutHandler>) {
        *self.handler.lock().unwrap() = Some(handler);
    }

    pub fn register_game(&self, game: &LiveGame) {
        let entry = ClockEntry {
            last_move_time: game.last_move_at,
            current_turn: game.turn,
            active: true,
            time_left: game.time_left_ms,
            bullet: game.game_info.variant == GameVariant::Bullet,
        };
        self.clocks
            .lock()
            .unwrap()
            .insert(game.game_id.clone(), entry);
    }

    pub fn remove_game(&self, game_id: &str) {
        self.clocks.lock().unwrap().remove(game_id);
    }

    /// Clock reset after an accepted move; the banked clocks were already
    /// updated by the game core.
    pub fn on_move(
        &self,
        game_id: &str,
        move_timestamp: i64,
        next_turn: Color,
        time_left: TimeLeft,
    ) {
        if let Some(entry) = self.clocks.lock().unwrap().get_mut(game_id) {
            entry.last_move_time = move_timestamp;
            entry.current_turn = next_turn;
            entry.time_left = time_left;
            entry.active = true;
        }
    }

    /// Freeze deductions while a player is disconnected. Time is never added
    /// back, only frozen.
    pub fn pause(&self, game_id: &str) {
        let mut clocks = self.clocks.lock().unwrap();
        if let Some(entry) = clocks.get_mut(game_id) {
            let now = Utc::now().timestamp_millis();
            // Bank the burn so far, then stop the clock.
            let left = remaining(entry, entry.current_turn, now);
            entry.time_left.set(entry.current_turn, left);
            entry.active = false;
            info!("Paused clock for game {}", game_id);
        }
    }

    pub fn resume(&self, game_id: &str) {
        let mut clocks = self.clocks.lock().unwrap();
        if let Some(entry) = clocks.get_mut(game_id) {
            // Fresh reference point: nothing accrues for the paused span.
            entry.last_move_time = Utc::now().timestamp_millis();
            entry.active = true;
            info!("Resumed clock for game {}", game_id);
        }
    }

    pub fn time_sync(&self, game_id: &str) -> Option<TimeSync> {
        let clocks = self.clocks.lock().unwrap();
        let entry = clocks.get(game_id)?;
        let now = Utc::now().timestamp_millis();
        Some(TimeSync {
            white_ms: remaining(entry, Color::White, now),
            black_ms: remaining(entry, Color::Black, now),
            current_turn: entry.current_turn,
            now,
        })
    }

    /// A client claims the opponent's flag fell. Recompute authoritatively;
    /// forfeit within tolerance, otherwise hand back a correction for the
    /// reporter only.
    pub async fn report_time_up(&self, game_id: &str, color: Color) -> TimeUpVerdict {
        let verdict = {
            let clocks = self.clocks.lock().unwrap();
            match clocks.get(game_id) {
                None => return TimeUpVerdict::UnknownGame,
                Some(entry) => {
                    let now = Utc::now().timestamp_millis();
                    let left = remaining(entry, color, now) as i64;
                    if left <= REPORT_TOLERANCE_MS {
                        None
                    } else {
                        Some(TimeSync {
                            white_ms: remaining(entry, Color::White, now),
                            black_ms: remaining(entry, Color::Black, now),
                            current_turn: entry.current_turn,
                            now,
                        })
                    }
                }
            }
        };

        match verdict {
            None => {
                self.forfeit(game_id, color).await;
                TimeUpVerdict::Forfeited
            }
            Some(sync) => TimeUpVerdict::Corrected(sync),
        }
    }

    /// Spawn the 1 Hz scanner. Runs until the returned handle is aborted at
    /// node shutdown.
    pub fn start(self: &Arc<TimeManager>) -> tokio::task::JoinHandle<()> {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(1));
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                manager.scan().await;
            }
        })
    }

    /// One scanner pass: flag any side to move that has burned its clock,
    /// and push time updates for bullet games, where the margin is thinnest.
    pub async fn scan(&self) {
        let now = Utc::now().timestamp_millis();
        let mut due = Vec::new();
        let mut broadcasts = Vec::new();
        {
            let clocks = self.clocks.lock().unwrap();
            for (game_id, entry) in clocks.iter() {
                if !entry.active {
                    continue;
                }
                if remaining(entry, entry.current_turn, now) == 0 {
                    due.push((game_id.clone(), entry.current_turn));
                } else if entry.bullet {
                    broadcasts.push((
                        game_id.clone(),
                        remaining(entry, Color::White, now),
                        remaining(entry, Color::Black, now),
                        entry.current_turn,
                    ));
                }
            }
        }

        for (game_id, color) in due {
            warn!("Game {} flag fell for {}", game_id, color);
            self.forfeit(&game_id, color).await;
        }

        for (game_id, white_ms, black_ms, current_turn) in broadcasts {
            let envelope = EventEnvelope::new(
                &self.node_id,
                now,
                GameEvent::TimeUpdate {
                    game_id,
                    white_ms,
                    black_ms,
                    current_turn,
                },
            );
            if let Err(e) = self.bus.publish(envelope).await {
                warn!("Failed to publish time update: {}", e);
            }
        }
    }

    async fn forfeit(&self, game_id: &str, color: Color) {
        self.remove_game(game_id);

        let envelope = EventEnvelope::new(
            &self.node_id,
            Utc::now().timestamp_millis(),
            GameEvent::TimeUp {
                game_id: game_id.to_string(),
                color,
            },
        );
        if let Err(e) = self.bus.publish(envelope).await {
            warn!("Failed to publish time_up for game {}: {}", game_id, e);
        }

        let handler = self.handler.lock().unwrap().clone();
        match handler {
            Some(handler) => handler.timeout_forfeit(game_id, color).await,
            None => error!("No timeout handler wired; game {} left unforfeited", game_id),
        }
    }

    pub fn tracked_games(&self) -> usize {
        self.clocks.lock().unwrap().len()
    }
}
