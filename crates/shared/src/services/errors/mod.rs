pub mod chess_service_errors;

pub use chess_service_errors::ChessServiceError;
