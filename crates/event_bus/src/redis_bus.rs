use async_trait::async_trait;
use futures::StreamExt;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use tokio::sync::mpsc;
use tracing::{info, warn};

use shared::bus::{BusError, EventBus};
use shared::models::events::{EventEnvelope, Topic};

/// Redis pub/sub transport. One channel per topic; envelopes are JSON.
/// Redis preserves publish order per channel and every game's events flow
/// through one channel, so per-game order holds at subscribers.
pub struct RedisEventBus {
    client: redis::Client,
    conn: MultiplexedConnection,
}

impl RedisEventBus {
    pub async fn connect(url: &str) -> Result<RedisEventBus, BusError> {
        let client = redis::Client::open(url).map_err(|e| BusError::Unavailable(e.to_string()))?;
        let conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| BusError::Unavailable(e.to_string()))?;
        Ok(RedisEventBus { client, conn })
    }
}

#[async_trait]
impl EventBus for RedisEventBus {
    async fn publish(&self, envelope: EventEnvelope) -> Result<(), BusError> {
        let body =
            serde_json::to_string(&envelope).map_err(|e| BusError::Serialization(e.to_string()))?;
        let mut conn = self.conn.clone();
        conn.publish::<_, _, ()>(envelope.channel.as_str(), body)
            .await
            .map_err(|e| BusError::Unavailable(e.to_string()))
    }

    async fn subscribe(&self, topics: &[Topic]) -> Result<mpsc::Receiver<EventEnvelope>, BusError> {
        let mut pubsub = self
            .client
            .get_async_pubsub()
            .await
            .map_err(|e| BusError::Unavailable(e.to_string()))?;
        for topic in topics {
            pubsub
                .subscribe(topic.channel())
                .await
                .map_err(|e| BusError::Unavailable(e.to_string()))?;
        }
        info!("Subscribed to {} bus topics", topics.len());

        let (tx, rx) = mpsc::channel(1024);
        tokio::spawn(async move {
            let mut stream = pubsub.into_on_message();
            while let Some(message) = stream.next().await {
                let payload: String = match message.get_payload() {
                    Ok(payload) => payload,
                    Err(e) => {
                        warn!("Unreadable bus message: {}", e);
                        continue;
                    }
                };
                match serde_json::from_str::<EventEnvelope>(&payload) {
                    Ok(envelope) => {
                        if tx.send(envelope).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => warn!("Malformed bus envelope dropped: {}", e),
                }
            }
        });
        Ok(rx)
    }
}
