//! Category count reconciliation worker.

#![forbid(unsafe_code)]

use std::env;
use std::sync::Arc;
use std::time::Duration;

use catalog_application::{
    CategoryCountSaga, ConnectRetryPolicy, EventConsumer, EventDispatcher, StartPosition,
    Subscription,
};
use catalog_core::{AppError, AppResult};
use catalog_domain::topics::PRODUCT_TOPICS;
use catalog_infrastructure::{
    RedisStreamEventBus, StreamConsumerSettings, TracingRealtimeNotifier,
};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone)]
struct WorkerConfig {
    brokers: Vec<String>,
    partitions: u32,
    connect_retry: ConnectRetryPolicy,
    group_id: String,
    consumer: StreamConsumerSettings,
    error_backoff: Duration,
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = WorkerConfig::load()?;
    let bus = Arc::new(
        RedisStreamEventBus::new(config.brokers.clone(), config.partitions)
            .with_consumer_settings(config.consumer.clone()),
    );

    let dispatcher = EventDispatcher::new(bus.clone(), config.connect_retry);
    if !dispatcher.start().await {
        return Err(AppError::Unavailable(
            "event bus is unreachable, worker cannot consume product events".to_owned(),
        ));
    }

    bus.subscribe(&Subscription {
        topics: PRODUCT_TOPICS.iter().map(|topic| (*topic).to_owned()).collect(),
        group_id: config.group_id.clone(),
        start: StartPosition::Earliest,
    })
    .await?;

    let saga = CategoryCountSaga::new(dispatcher, Arc::new(TracingRealtimeNotifier::new()));

    info!(
        consumer_name = %config.consumer.consumer_name,
        group_id = %config.group_id,
        partitions = config.partitions,
        batch_size = config.consumer.batch_size,
        "catalog-worker started"
    );

    tokio::select! {
        () = consume(&saga, bus.as_ref(), config.error_backoff) => {}
        result = tokio::signal::ctrl_c() => {
            result.map_err(|error| {
                AppError::Internal(format!("failed to listen for shutdown signal: {error}"))
            })?;
            info!("shutdown signal received, stopping catalog-worker");
        }
    }

    Ok(())
}

async fn consume(saga: &CategoryCountSaga, consumer: &dyn EventConsumer, error_backoff: Duration) {
    loop {
        match saga.process_batch(consumer).await {
            Ok(0) => {}
            Ok(handled) => debug!(handled, "processed product event batch"),
            Err(error) => {
                warn!(error = %error, "failed to process product event batch");
                tokio::time::sleep(error_backoff).await;
            }
        }
    }
}

impl WorkerConfig {
    fn load() -> AppResult<Self> {
        let brokers = env::var("EVENT_BUS_BROKERS")
            .unwrap_or_else(|_| "redis://127.0.0.1:6379".to_owned())
            .split(',')
            .map(str::trim)
            .filter(|broker| !broker.is_empty())
            .map(str::to_owned)
            .collect::<Vec<_>>();
        let partitions = parse_env_u32("EVENT_BUS_PARTITIONS", 8)?;
        let connect_retry = ConnectRetryPolicy {
            attempts: parse_env_u32("EVENT_BUS_CONNECT_ATTEMPTS", 5)?,
            backoff: Duration::from_millis(parse_env_u64("EVENT_BUS_CONNECT_BACKOFF_MS", 2_000)?),
        };
        let group_id = env::var("CONSUMER_GROUP_ID")
            .ok()
            .map(|value| value.trim().to_owned())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| "catalog-category-counter".to_owned());
        let consumer_name = env::var("CONSUMER_NAME")
            .ok()
            .map(|value| value.trim().to_owned())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| format!("worker-{}", std::process::id()));
        let owned_partitions = parse_partitions("CONSUMER_PARTITIONS")?;
        let batch_size = parse_env_usize("CONSUMER_BATCH_SIZE", 50)?;
        let idle_wait_ms = parse_env_u64("CONSUMER_IDLE_WAIT_MS", 2_000)?;
        let error_backoff_ms = parse_env_u64("CONSUMER_ERROR_BACKOFF_MS", 1_000)?;

        if brokers.is_empty() {
            return Err(AppError::Validation(
                "EVENT_BUS_BROKERS must list at least one broker".to_owned(),
            ));
        }

        if partitions == 0 {
            return Err(AppError::Validation(
                "EVENT_BUS_PARTITIONS must be greater than zero".to_owned(),
            ));
        }

        if batch_size == 0 {
            return Err(AppError::Validation(
                "CONSUMER_BATCH_SIZE must be greater than zero".to_owned(),
            ));
        }

        if let Some(partition) = owned_partitions
            .iter()
            .flatten()
            .find(|partition| **partition >= partitions)
        {
            return Err(AppError::Validation(format!(
                "CONSUMER_PARTITIONS entry {partition} is outside 0..{partitions}"
            )));
        }

        Ok(Self {
            brokers,
            partitions,
            connect_retry,
            group_id,
            consumer: StreamConsumerSettings {
                consumer_name,
                owned_partitions,
                batch_size,
                idle_wait: Duration::from_millis(idle_wait_ms),
            },
            error_backoff: Duration::from_millis(error_backoff_ms),
        })
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}

fn parse_partitions(name: &str) -> AppResult<Option<Vec<u32>>> {
    let Some(value) = env::var(name).ok().filter(|value| !value.trim().is_empty()) else {
        return Ok(None);
    };

    value
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            entry.parse::<u32>().map_err(|error| {
                AppError::Validation(format!("invalid {name} entry '{entry}': {error}"))
            })
        })
        .collect::<AppResult<Vec<_>>>()
        .map(Some)
}

fn parse_env_usize(name: &str, default: usize) -> AppResult<usize> {
    match env::var(name) {
        Ok(value) => value.parse::<usize>().map_err(|error| {
            AppError::Validation(format!("invalid {name} value '{value}': {error}"))
        }),
        Err(_) => Ok(default),
    }
}

fn parse_env_u32(name: &str, default: u32) -> AppResult<u32> {
    match env::var(name) {
        Ok(value) => value.parse::<u32>().map_err(|error| {
            AppError::Validation(format!("invalid {name} value '{value}': {error}"))
        }),
        Err(_) => Ok(default),
    }
}

fn parse_env_u64(name: &str, default: u64) -> AppResult<u64> {
    match env::var(name) {
        Ok(value) => value.parse::<u64>().map_err(|error| {
            AppError::Validation(format!("invalid {name} value '{value}': {error}"))
        }),
        Err(_) => Ok(default),
    }
}
