use std::fmt;

#[derive(Debug)]
pub enum StoreError {
    /// The live store did not answer within the operation deadline, or the
    /// connection failed. Callers may retry once with small backoff.
    Unavailable(String),
    Serialization(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Unavailable(msg) => write!(f, "Live store unavailable: {}", msg),
            StoreError::Serialization(msg) => write!(f, "Serialization error: {}", msg),
        }
    }
}

impl std::error::Error for StoreError {}
