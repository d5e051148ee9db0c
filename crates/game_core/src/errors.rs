use std::fmt;

use shared::repositories::errors::StoreError;
use shared::services::errors::ChessServiceError;

#[derive(Debug)]
pub enum GameSessionServiceError {
    NotFound,
    /// The caller is not a player of this game.
    NotAPlayer,
    NotYourTurn,
    IllegalMove(String),
    /// The game is already over. Expected under finalization races and
    /// swallowed by callers.
    Finalized,
    BadRequest(String),
    StoreUnavailable(String),
    Internal(String),
}

impl fmt::Display for GameSessionServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GameSessionServiceError::NotFound => write!(f, "Game not found"),
            GameSessionServiceError::NotAPlayer => write!(f, "Not a player of this game"),
            GameSessionServiceError::NotYourTurn => write!(f, "Not your turn"),
            GameSessionServiceError::IllegalMove(msg) => write!(f, "Illegal move: {}", msg),
            GameSessionServiceError::Finalized => write!(f, "Game is already over"),
            GameSessionServiceError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            GameSessionServiceError::StoreUnavailable(msg) => {
                write!(f, "Live store unavailable: {}", msg)
            }
            GameSessionServiceError::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for GameSessionServiceError {}

impl From<StoreError> for GameSessionServiceError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::Unavailable(msg) => GameSessionServiceError::StoreUnavailable(msg),
            StoreError::Serialization(msg) => GameSessionServiceError::Internal(msg),
        }
    }
}

impl From<ChessServiceError> for GameSessionServiceError {
    fn from(error: ChessServiceError) -> Self {
        match error {
            ChessServiceError::IllegalMove(msg) => GameSessionServiceError::IllegalMove(msg),
            ChessServiceError::MalformedFen(msg) => GameSessionServiceError::Internal(msg),
        }
    }
}
