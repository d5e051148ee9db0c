use std::fmt;

#[derive(Debug)]
pub enum ChessServiceError {
    IllegalMove(String),
    MalformedFen(String),
}

impl fmt::Display for ChessServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChessServiceError::IllegalMove(msg) => write!(f, "Illegal move: {}", msg),
            ChessServiceError::MalformedFen(msg) => write!(f, "Malformed FEN: {}", msg),
        }
    }
}

impl std::error::Error for ChessServiceError {}
