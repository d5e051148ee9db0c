use std::sync::Arc;

use game_core::GameSessionService;
use matchmaker::MatchmakingService;
use shared::bus::EventBus;
use shared::repositories::{GameStore, LiveGameRepository, LiveStore, UserProfileStore};
use time_manager::TimeManager;

/// Node-scope service graph. Built once at startup and injected into every
/// message handler; there are no process-wide globals.
#[derive(Clone)]
pub struct AppState {
    pub matchmaking: Arc<MatchmakingService>,
    pub games: Arc<GameSessionService>,
    pub time_manager: Arc<TimeManager>,
    pub profiles: Arc<dyn UserProfileStore>,
    pub node_id: String,
}

impl AppState {
    pub fn build(
        live_store: Arc<dyn LiveStore>,
        game_store: Arc<dyn GameStore>,
        profiles: Arc<dyn UserProfileStore>,
        bus: Arc<dyn EventBus>,
        node_id: &str,
    ) -> AppState {
        let time_manager = TimeManager::new(node_id, bus.clone());
        let games = Arc::new(GameSessionService::new(
            LiveGameRepository::new(live_store.clone()),
            game_store.clone(),
            profiles.clone(),
            time_manager.clone(),
            bus.clone(),
            node_id,
        ));
        time_manager.set_timeout_handler(games.clone());
        let matchmaking = Arc::new(MatchmakingService::new(
            live_store,
            game_store,
            games.clone(),
            bus,
            node_id,
        ));
        AppState {
            matchmaking,
            games,
            time_manager,
            profiles,
            node_id: node_id.to_string(),
        }
    }
}
