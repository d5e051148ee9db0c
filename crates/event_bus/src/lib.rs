pub mod local_bus;
pub mod pipeline;
pub mod redis_bus;

pub use local_bus::LocalEventBus;
pub use pipeline::{PersistencePipeline, Priority};
pub use redis_bus::RedisEventBus;
