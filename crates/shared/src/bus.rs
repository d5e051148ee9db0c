use std::fmt;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::models::events::{EventEnvelope, Topic};

#[derive(Debug)]
pub enum BusError {
    /// Transport failure; callers degrade to local-only fan-out.
    Unavailable(String),
    Serialization(String),
}

impl fmt::Display for BusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BusError::Unavailable(msg) => write!(f, "Event bus unavailable: {}", msg),
            BusError::Serialization(msg) => write!(f, "Serialization error: {}", msg),
        }
    }
}

impl std::error::Error for BusError {}

/// Cross-instance pub/sub. Delivery is at-least-once and best-effort ordered
/// per game id; consumers deduplicate via [`EventEnvelope::dedup_key`] and
/// drop envelopes whose origin node is their own (the originating node has
/// already fanned out locally).
#[async_trait]
pub trait EventBus: Send + Sync {
    async fn publish(&self, envelope: EventEnvelope) -> Result<(), BusError>;

    /// Subscribe to a set of topics. Messages arrive on the returned channel
    /// already decoded; the subscription lives as long as the receiver.
    async fn subscribe(&self, topics: &[Topic]) -> Result<mpsc::Receiver<EventEnvelope>, BusError>;
}
