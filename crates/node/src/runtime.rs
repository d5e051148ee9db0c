use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use event_bus::PersistencePipeline;
use shared::bus::EventBus;
use shared::models::events::Topic;
use shared::repositories::GameStore;

use crate::state::AppState;

/// Long-lived node services: the clock scanner, the bus consumer, and the
/// persistence pipeline. Owned by main; stopped in order at shutdown.
pub struct Background {
    scanner: JoinHandle<()>,
    forwarder: JoinHandle<()>,
    pipeline: JoinHandle<()>,
}

/// Start the background services. The pipeline persists only the events this
/// node originated: every event has exactly one origin, so the fleet writes
/// each event exactly once even though pub/sub fans it out everywhere.
pub async fn start_background(
    state: &AppState,
    bus: Arc<dyn EventBus>,
    game_store: Arc<dyn GameStore>,
) -> Result<Background, shared::bus::BusError> {
    let scanner = state.time_manager.start();

    let mut feed = bus.subscribe(&Topic::all()).await?;
    let (tx, rx) = mpsc::channel(1024);
    let node_id = state.node_id.clone();
    let forwarder = tokio::spawn(async move {
        while let Some(envelope) = feed.recv().await {
            if envelope.origin_node_id != node_id {
                continue;
            }
            if tx.send(envelope).await.is_err() {
                break;
            }
        }
    });

    let pipeline = PersistencePipeline::new(game_store);
    let pipeline = tokio::spawn(pipeline.run(rx));

    Ok(Background {
        scanner,
        forwarder,
        pipeline,
    })
}

impl Background {
    /// Graceful stop: scanner first, then close the feed so the pipeline
    /// drains its pending batches before the process exits.
    pub async fn shutdown(self) {
        info!("Stopping background services");
        self.scanner.abort();
        self.forwarder.abort();
        if let Err(e) = self.pipeline.await {
            if !e.is_cancelled() {
                warn!("Pipeline task failed at shutdown: {}", e);
            }
        }
    }
}
