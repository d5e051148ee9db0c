pub mod game_store_errors;
pub mod profile_store_errors;
pub mod store_errors;

pub use game_store_errors::GameStoreError;
pub use profile_store_errors::ProfileStoreError;
pub use store_errors::StoreError;
