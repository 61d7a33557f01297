use std::sync::Arc;

use catalog_application::{
    EventDispatcher, KeyedStore, ProductRepository, ProductService, RateLimitService,
    ReadThroughCache,
};
use catalog_core::AppError;
use catalog_infrastructure::{
    InMemoryProductRepository, PostgresProductRepository, RedisKeyedStore, RedisStreamEventBus,
};
use sqlx::PgPool;
use tracing::{info, warn};

use crate::api_config::{ApiConfig, ProductStoreConfig};
use crate::state::AppState;

use super::redis_client::build_redis_client;

/// Everything the HTTP server needs, plus the dispatcher to start in the background.
pub struct ApiServices {
    pub state: AppState,
    pub dispatcher: EventDispatcher,
}

pub async fn build_api_services(
    config: &ApiConfig,
    pool: Option<PgPool>,
) -> Result<ApiServices, AppError> {
    let repository: Arc<dyn ProductRepository> = match (config.product_store, pool) {
        (ProductStoreConfig::Postgres, Some(pool)) => {
            Arc::new(PostgresProductRepository::new(pool))
        }
        (ProductStoreConfig::Postgres, None) => {
            return Err(AppError::Validation(
                "DATABASE_URL is required when PRODUCT_STORE=postgres".to_owned(),
            ));
        }
        (ProductStoreConfig::InMemory, _) => {
            warn!("PRODUCT_STORE=in_memory, products are lost on restart");
            Arc::new(InMemoryProductRepository::new())
        }
    };

    let redis_store = RedisKeyedStore::new(
        build_redis_client(&config.redis)?,
        config.redis.key_prefix.clone(),
        config.redis.operation_timeout,
    );
    if !redis_store.connect().await {
        warn!("redis is unreachable at startup, caching and rate limiting are degraded");
    }
    let keyed_store: Arc<dyn KeyedStore> = Arc::new(redis_store);

    let event_bus = Arc::new(RedisStreamEventBus::new(
        config.event_bus.brokers.clone(),
        config.event_bus.partitions,
    ));
    let dispatcher = EventDispatcher::new(event_bus, config.event_bus.connect_retry);

    let product_service = ProductService::new(
        repository,
        ReadThroughCache::new(keyed_store.clone(), config.cache_policy),
        config.cache_ttls,
        dispatcher.clone(),
    );

    info!(
        product_store = ?config.product_store,
        partitions = config.event_bus.partitions,
        "api services built"
    );

    Ok(ApiServices {
        state: AppState {
            product_service,
            rate_limit_service: RateLimitService::new(keyed_store.clone()),
            keyed_store,
        },
        dispatcher,
    })
}
