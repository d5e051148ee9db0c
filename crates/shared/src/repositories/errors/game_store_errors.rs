use std::fmt;

#[derive(Debug)]
pub enum GameStoreError {
    Serialization(String),
    DynamoDb(String),
    NotFound(String),
}

impl fmt::Display for GameStoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GameStoreError::Serialization(msg) => write!(f, "Serialization error: {}", msg),
            GameStoreError::DynamoDb(msg) => write!(f, "DynamoDB error: {}", msg),
            GameStoreError::NotFound(id) => write!(f, "Game not found: {}", id),
        }
    }
}

impl std::error::Error for GameStoreError {}
