use catalog_core::AppError;

use crate::api_config::RedisConfig;

pub fn build_redis_client(config: &RedisConfig) -> Result<redis::Client, AppError> {
    redis::Client::open(config.url())
        .map_err(|error| AppError::Validation(format!("invalid redis configuration: {error}")))
}
