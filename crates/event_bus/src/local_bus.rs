use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc};
use tracing::warn;

use shared::bus::{BusError, EventBus};
use shared::models::events::{EventEnvelope, Topic};

/// In-process bus: a single broadcast channel with per-subscription topic
/// filtering. Serves tests, local development, and the degraded mode when
/// the real bus is unreachable.
pub struct LocalEventBus {
    sender: broadcast::Sender<EventEnvelope>,
}

impl Default for LocalEventBus {
    fn default() -> Self {
        LocalEventBus::new()
    }
}

impl LocalEventBus {
    pub fn new() -> LocalEventBus {
        let (sender, _) = broadcast::channel(1024);
        LocalEventBus { sender }
    }
}

#[async_trait]
impl EventBus for LocalEventBus {
    async fn publish(&self, envelope: EventEnvelope) -> Result<(), BusError> {
        // A send error only means nobody is subscribed, which is fine.
        let _ = self.sender.send(envelope);
        Ok(())
    }

    async fn subscribe(&self, topics: &[Topic]) -> Result<mpsc::Receiver<EventEnvelope>, BusError> {
        let mut source = self.sender.subscribe();
        let wanted: Vec<Topic> = topics.to_vec();
        let (tx, rx) = mpsc::channel(1024);
        tokio::spawn(async move {
            loop {
                match source.recv().await {
                    Ok(envelope) => {
                        if !wanted.iter().any(|t| t.channel() == envelope.channel) {
                            continue;
                        }
                        if tx.send(envelope).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("Local bus subscriber lagged, skipped {} events", skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
        Ok(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::models::events::GameEvent;
    use shared::models::game::Color;

    #[tokio::test]
    async fn subscribers_only_see_their_topics() {
        let bus = LocalEventBus::new();
        let mut time_rx = bus.subscribe(&[Topic::Time]).await.unwrap();
        let mut all_rx = bus.subscribe(&Topic::all()).await.unwrap();

        bus.publish(EventEnvelope::new(
            "node-a",
            1,
            GameEvent::TimeUp {
                game_id: "g".to_string(),
                color: Color::White,
            },
        ))
        .await
        .unwrap();
        bus.publish(EventEnvelope::new(
            "node-a",
            2,
            GameEvent::DrawOffered {
                game_id: "g".to_string(),
                by: Color::Black,
            },
        ))
        .await
        .unwrap();

        let first = time_rx.recv().await.unwrap();
        assert_eq!(first.event_type(), "time_up");

        let first = all_rx.recv().await.unwrap();
        assert_eq!(first.event_type(), "time_up");
        let second = all_rx.recv().await.unwrap();
        assert_eq!(second.event_type(), "draw_offered");
    }
}
