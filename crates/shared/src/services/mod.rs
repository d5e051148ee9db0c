pub mod chess_service;
pub mod errors;
pub mod rating_service;

pub use chess_service::{AppliedMove, ChessService, Position, TerminalState};
pub use rating_service::RatingService;
