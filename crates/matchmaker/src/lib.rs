pub mod colors;
pub mod errors;
pub mod service;

pub use errors::MatchmakingServiceError;
pub use service::{MatchmakingService, MatchmakingStats, SearchStatus, TickResult};
