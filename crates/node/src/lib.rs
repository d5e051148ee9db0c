pub mod dispatch;
pub mod runtime;
pub mod state;

pub use state::AppState;
