use std::fmt;

use game_core::GameSessionServiceError;
use shared::repositories::errors::StoreError;

#[derive(Debug)]
pub enum MatchmakingServiceError {
    /// The player has no active search session.
    NotSearching,
    StoreUnavailable(String),
    GameCreation(String),
    Internal(String),
}

impl fmt::Display for MatchmakingServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchmakingServiceError::NotSearching => write!(f, "No active search"),
            MatchmakingServiceError::StoreUnavailable(msg) => {
                write!(f, "Live store unavailable: {}", msg)
            }
            MatchmakingServiceError::GameCreation(msg) => {
                write!(f, "Game creation failed: {}", msg)
            }
            MatchmakingServiceError::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for MatchmakingServiceError {}

impl From<StoreError> for MatchmakingServiceError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::Unavailable(msg) => MatchmakingServiceError::StoreUnavailable(msg),
            StoreError::Serialization(msg) => MatchmakingServiceError::Internal(msg),
        }
    }
}

impl From<GameSessionServiceError> for MatchmakingServiceError {
    fn from(error: GameSessionServiceError) -> Self {
        MatchmakingServiceError::GameCreation(error.to_string())
    }
}
