pub mod errors;
pub mod game_store;
pub mod live_game_repository;
pub mod live_store;
pub mod match_queue_repository;
pub mod memory_game_store;
pub mod memory_live_store;
pub mod memory_profile_store;
pub mod presence_repository;
pub mod profile_store;
pub mod redis_live_store;
pub mod search_session_repository;

pub use game_store::{DynamoDbGameStore, GameStore};
pub use live_game_repository::LiveGameRepository;
pub use live_store::LiveStore;
pub use match_queue_repository::MatchQueueRepository;
pub use memory_game_store::InMemoryGameStore;
pub use memory_live_store::InMemoryLiveStore;
pub use memory_profile_store::InMemoryUserProfileStore;
pub use presence_repository::PresenceRepository;
pub use profile_store::{DynamoDbUserProfileStore, UserProfileStore};
pub use redis_live_store::RedisLiveStore;
pub use search_session_repository::SearchSessionRepository;
