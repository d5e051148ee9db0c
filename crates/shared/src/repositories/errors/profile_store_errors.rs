use std::fmt;

#[derive(Debug)]
pub enum ProfileStoreError {
    Serialization(String),
    DynamoDb(String),
}

impl fmt::Display for ProfileStoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProfileStoreError::Serialization(msg) => write!(f, "Serialization error: {}", msg),
            ProfileStoreError::DynamoDb(msg) => write!(f, "DynamoDB error: {}", msg),
        }
    }
}

impl std::error::Error for ProfileStoreError {}
