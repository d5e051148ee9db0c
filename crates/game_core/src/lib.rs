pub mod errors;
pub mod service;

pub use errors::GameSessionServiceError;
pub use service::{GameEndSummary, GameSessionService, MoveOutcome, PlayerDto};
