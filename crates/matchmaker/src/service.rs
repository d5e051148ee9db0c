use std::sync::Arc;

use chrono::Utc;
use rand::Rng;
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use game_core::{GameSessionService, PlayerDto};
use shared::bus::EventBus;
use shared::models::events::{EventEnvelope, GameEvent};
use shared::models::game::{Color, GameVariant, LiveGame, TimeControl};
use shared::models::matchmaking::{match_lock_key, SearchSession, MATCH_LOCK_TTL_SECS};
use shared::models::player::Presence;
use shared::repositories::{
    GameStore, LiveStore, MatchQueueRepository, PresenceRepository, SearchSessionRepository,
};

use crate::colors;
use crate::errors::MatchmakingServiceError;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchStatus {
    pub is_searching: bool,
    pub current_range: i32,
    pub search_duration_ms: i64,
}

#[derive(Debug, Clone)]
pub enum TickResult {
    Found {
        game_id: String,
        opponent: String,
        current_range: i32,
        search_duration_ms: i64,
    },
    Searching {
        current_range: i32,
        search_duration_ms: i64,
    },
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchmakingStats {
    pub active_sessions: usize,
    pub queues: Vec<(String, u64)>,
}

/// Expanding-window pairing over the shared ranked queues. Any node may run
/// a tick for any searching player; the pair claim lock keeps two nodes from
/// pairing the same two players twice.
pub struct MatchmakingService {
    store: Arc<dyn LiveStore>,
    queues: MatchQueueRepository,
    presence: PresenceRepository,
    sessions: SearchSessionRepository,
    game_store: Arc<dyn GameStore>,
    games: Arc<GameSessionService>,
    bus: Arc<dyn EventBus>,
    node_id: String,
}

impl MatchmakingService {
    pub fn new(
        store: Arc<dyn LiveStore>,
        game_store: Arc<dyn GameStore>,
        games: Arc<GameSessionService>,
        bus: Arc<dyn EventBus>,
        node_id: &str,
    ) -> MatchmakingService {
        MatchmakingService {
            queues: MatchQueueRepository::new(store.clone()),
            presence: PresenceRepository::new(store.clone()),
            sessions: SearchSessionRepository::new(store.clone()),
            store,
            game_store,
            games,
            bus,
            node_id: node_id.to_string(),
        }
    }

    /// Opt a player into matchmaking. Idempotent: re-invocation refreshes the
    /// session TTL without resetting the search clock.
    pub async fn start_search(
        &self,
        player_id: &str,
        game_type: &str,
        game_variant: GameVariant,
        time_control: TimeControl,
        rating: i32,
        connection_id: &str,
    ) -> Result<SearchStatus, MatchmakingServiceError> {
        let now = Utc::now().timestamp_millis();
        let session = match self.sessions.get(player_id).await? {
            Some(mut existing) => {
                existing.connection_id = connection_id.to_string();
                existing
            }
            None => {
                info!(
                    "Player {} starts searching {} at rating {}",
                    player_id, game_type, rating
                );
                SearchSession {
                    player_id: player_id.to_string(),
                    game_type: game_type.to_string(),
                    game_variant,
                    time_control,
                    initial_rating: rating,
                    current_range: SearchSession::range_for_elapsed(0),
                    search_start_time: now,
                    connection_id: connection_id.to_string(),
                }
            }
        };
        self.sessions.put(&session).await?;
        self.presence
            .put(&Presence {
                player_id: player_id.to_string(),
                ws_id: connection_id.to_string(),
                rating,
                is_player_connected: true,
            })
            .await?;
        self.queues
            .join(game_type, player_id, session.initial_rating)
            .await?;

        Ok(SearchStatus {
            is_searching: true,
            current_range: session.current_range,
            search_duration_ms: now - session.search_start_time,
        })
    }

    /// One matchmaking pass for a player: widen the window if it grew, scan
    /// candidates by rating distance, claim the pair, create the game.
    pub async fn tick(&self, player_id: &str) -> Result<TickResult, MatchmakingServiceError> {
        let mut session = self
            .sessions
            .get(player_id)
            .await?
            .ok_or(MatchmakingServiceError::NotSearching)?;
        let now = Utc::now().timestamp_millis();
        let elapsed = now - session.search_start_time;
        let range = SearchSession::range_for_elapsed(elapsed);
        if range > session.current_range {
            session.current_range = range;
        }
        // Re-put every tick: the session TTL slides while the client keeps
        // asking.
        self.sessions.put(&session).await?;

        let candidates = self
            .queues
            .candidates_in_range(&session.game_type, session.initial_rating, session.current_range)
            .await?;

        for (candidate_id, candidate_rating) in candidates {
            if candidate_id == player_id {
                continue;
            }
            let candidate_presence = match self.presence.get(&candidate_id).await? {
                Some(presence) => presence,
                None => {
                    // Ghost entry: the player vanished without leaving the
                    // queue.
                    self.queues.leave(&session.game_type, &candidate_id).await?;
                    info!("Evicted queue entry {} without presence", candidate_id);
                    continue;
                }
            };
            if !self.queues.contains(&session.game_type, &candidate_id).await? {
                continue;
            }

            let lock_key = match_lock_key(player_id, &candidate_id);
            let token = format!("{}:{}", self.node_id, Uuid::new_v4());
            if !self
                .store
                .acquire_lock(&lock_key, &token, MATCH_LOCK_TTL_SECS)
                .await?
            {
                // Another node is pairing these two right now.
                continue;
            }

            // The claim is ours; re-check both sides made it this far still
            // queued.
            let still_queued = self.queues.contains(&session.game_type, player_id).await?
                && self.queues.contains(&session.game_type, &candidate_id).await?;
            if !still_queued {
                self.store.release_lock(&lock_key, &token).await?;
                continue;
            }

            if !self.queues.take(&session.game_type, player_id).await? {
                // We were dequeued by a competing pairing; its match_found
                // will reach this player.
                self.store.release_lock(&lock_key, &token).await?;
                return Ok(TickResult::Searching {
                    current_range: session.current_range,
                    search_duration_ms: elapsed,
                });
            }
            if !self.queues.take(&session.game_type, &candidate_id).await? {
                self.queues
                    .join(&session.game_type, player_id, session.initial_rating)
                    .await?;
                self.store.release_lock(&lock_key, &token).await?;
                continue;
            }

            let paired = self
                .pair(&session, &candidate_id, candidate_rating, &candidate_presence)
                .await;
            self.store.release_lock(&lock_key, &token).await?;
            let game = paired?;

            info!(
                "Matched {} with {} in game {} after {} ms (range {})",
                player_id, candidate_id, game.game_id, elapsed, session.current_range
            );
            let envelope = EventEnvelope::new(
                &self.node_id,
                now,
                GameEvent::MatchFound {
                    game_id: game.game_id.clone(),
                    player_ids: [player_id.to_string(), candidate_id.clone()],
                    game_type: session.game_type.clone(),
                },
            );
            if let Err(e) = self.bus.publish(envelope).await {
                warn!("Failed to publish match_found: {}", e);
            }

            return Ok(TickResult::Found {
                game_id: game.game_id,
                opponent: candidate_id,
                current_range: session.current_range,
                search_duration_ms: elapsed,
            });
        }

        Ok(TickResult::Searching {
            current_range: session.current_range,
            search_duration_ms: elapsed,
        })
    }

    /// Both players are dequeued and claimed; assign colors and spin up the
    /// game, then drop their sessions and presence.
    async fn pair(
        &self,
        session: &SearchSession,
        opponent_id: &str,
        opponent_rating: i32,
        opponent_presence: &Presence,
    ) -> Result<LiveGame, MatchmakingServiceError> {
        let opponent_session = self.sessions.get(opponent_id).await?;
        let opponent_conn = opponent_session
            .map(|s| s.connection_id)
            .unwrap_or_else(|| opponent_presence.ws_id.clone());

        let own_history = self.color_history(&session.player_id).await;
        let opponent_history = self.color_history(opponent_id).await;
        let p = colors::white_probability(
            session.initial_rating,
            opponent_rating,
            &own_history,
            &opponent_history,
        );
        let sample: f64 = rand::thread_rng().gen();

        let own_dto = PlayerDto {
            player_id: session.player_id.clone(),
            rating: session.initial_rating,
            connection_id: Some(session.connection_id.clone()),
        };
        let opponent_dto = PlayerDto {
            player_id: opponent_id.to_string(),
            rating: opponent_rating,
            connection_id: Some(opponent_conn),
        };
        let (white, black) = if colors::first_gets_white(p, sample) {
            (own_dto, opponent_dto)
        } else {
            (opponent_dto, own_dto)
        };

        let game = self
            .games
            .create_game(white, black, session.game_variant, session.time_control, None)
            .await?;

        self.sessions.delete(&session.player_id).await?;
        self.sessions.delete(opponent_id).await?;
        self.presence.delete(&session.player_id).await?;
        self.presence.delete(opponent_id).await?;

        Ok(game)
    }

    async fn color_history(&self, player_id: &str) -> Vec<Color> {
        match self.game_store.recent_games(player_id, 10).await {
            Ok(summaries) => summaries.into_iter().map(|s| s.color).collect(),
            Err(e) => {
                warn!("Color history unavailable for {}: {}", player_id, e);
                Vec::new()
            }
        }
    }

    /// Stop searching. Idempotent; a player with no session is a no-op.
    pub async fn cancel(&self, player_id: &str) -> Result<(), MatchmakingServiceError> {
        if let Some(session) = self.sessions.get(player_id).await? {
            self.queues.leave(&session.game_type, player_id).await?;
            self.sessions.delete(player_id).await?;
            info!("Player {} cancelled search", player_id);
        }
        self.presence.delete(player_id).await?;
        Ok(())
    }

    pub async fn status(&self, player_id: &str) -> Result<SearchStatus, MatchmakingServiceError> {
        match self.sessions.get(player_id).await? {
            Some(session) => Ok(SearchStatus {
                is_searching: true,
                current_range: session.current_range,
                search_duration_ms: Utc::now().timestamp_millis() - session.search_start_time,
            }),
            None => Ok(SearchStatus {
                is_searching: false,
                current_range: 0,
                search_duration_ms: 0,
            }),
        }
    }

    /// Read-only diagnostics: queue depths and live session count.
    pub async fn stats(&self) -> Result<MatchmakingStats, MatchmakingServiceError> {
        let keys = self.store.scan_keys("match-making-queue:*").await?;
        let mut queues = Vec::new();
        for key in keys {
            let depth = self.store.zcard(&key).await?;
            let game_type = key
                .strip_prefix("match-making-queue:")
                .unwrap_or(&key)
                .to_string();
            queues.push((game_type, depth));
        }
        queues.sort();
        Ok(MatchmakingStats {
            active_sessions: self.sessions.count().await?,
            queues,
        })
    }
}
