pub mod bus;
pub mod models;
pub mod repositories;
pub mod services;

pub use models::game::{Color, EndReason, GameScore, GameVariant, LiveGame, TimeControl};
pub use models::player::PlayerProfile;
