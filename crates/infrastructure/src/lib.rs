//! Infrastructure adapters for application ports.

#![forbid(unsafe_code)]

mod in_memory_event_bus;
mod in_memory_keyed_store;
mod in_memory_product_repository;
mod postgres_product_repository;
mod redis_keyed_store;
mod redis_stream_event_bus;
mod tracing_realtime_notifier;

pub use in_memory_event_bus::InMemoryEventBus;
pub use in_memory_keyed_store::InMemoryKeyedStore;
pub use in_memory_product_repository::InMemoryProductRepository;
pub use postgres_product_repository::PostgresProductRepository;
pub use redis_keyed_store::RedisKeyedStore;
pub use redis_stream_event_bus::{RedisStreamEventBus, StreamConsumerSettings, partition_for};
pub use tracing_realtime_notifier::TracingRealtimeNotifier;
