use std::sync::Arc;

use tracing::info;
use uuid::Uuid;

use event_bus::RedisEventBus;
use node::runtime;
use node::state::AppState;
use shared::bus::EventBus;
use shared::repositories::{
    DynamoDbGameStore, DynamoDbUserProfileStore, GameStore, LiveStore, RedisLiveStore,
    UserProfileStore,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let redis_url = std::env::var("REDIS_URL").expect("REDIS_URL must be set");
    let node_id = std::env::var("NODE_ID").unwrap_or_else(|_| Uuid::new_v4().to_string());
    info!("Starting chess node {}", node_id);

    let config = aws_config::load_from_env().await;
    let dynamo = aws_sdk_dynamodb::Client::new(&config);

    let live_store: Arc<dyn LiveStore> = Arc::new(RedisLiveStore::connect(&redis_url).await?);
    let game_store: Arc<dyn GameStore> = Arc::new(DynamoDbGameStore::new(dynamo.clone()));
    let profiles: Arc<dyn UserProfileStore> = Arc::new(DynamoDbUserProfileStore::new(dynamo));
    let bus: Arc<dyn EventBus> = Arc::new(RedisEventBus::connect(&redis_url).await?);

    let state = AppState::build(
        live_store,
        game_store.clone(),
        profiles,
        bus.clone(),
        &node_id,
    );
    let background = runtime::start_background(&state, bus, game_store).await?;
    info!("Node {} ready", node_id);

    // The socket layer owns client I/O and calls into dispatch; the core
    // runs until the process is told to stop.
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");
    background.shutdown().await;
    Ok(())
}
