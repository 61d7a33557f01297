use std::env;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

use catalog_application::{CachePolicy, CacheTtls, ConnectRetryPolicy, RateLimitRule};
use catalog_core::AppError;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProductStoreConfig {
    Postgres,
    InMemory,
}

#[derive(Debug, Clone)]
pub struct RedisConfig {
    pub host: String,
    pub port: u16,
    pub password: Option<String>,
    pub db: u32,
    pub key_prefix: String,
    pub operation_timeout: Duration,
}

impl RedisConfig {
    pub fn url(&self) -> String {
        match &self.password {
            Some(password) => format!(
                "redis://:{password}@{}:{}/{}",
                self.host, self.port, self.db
            ),
            None => format!("redis://{}:{}/{}", self.host, self.port, self.db),
        }
    }
}

#[derive(Debug, Clone)]
pub struct EventBusConfig {
    pub brokers: Vec<String>,
    pub partitions: u32,
    pub connect_retry: ConnectRetryPolicy,
}

#[derive(Debug, Clone)]
pub struct RateLimitRules {
    pub read: RateLimitRule,
    pub write: RateLimitRule,
    pub search: RateLimitRule,
}

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub migrate_only: bool,
    pub api_host: String,
    pub api_port: u16,
    pub product_store: ProductStoreConfig,
    pub database_url: Option<String>,
    pub redis: RedisConfig,
    pub event_bus: EventBusConfig,
    pub cache_policy: CachePolicy,
    pub cache_ttls: CacheTtls,
    pub rate_limits: RateLimitRules,
}

impl ApiConfig {
    pub fn load() -> Result<Self, AppError> {
        let migrate_only = env::args().nth(1).as_deref() == Some("migrate");

        let api_host = env::var("API_HOST").unwrap_or_else(|_| "127.0.0.1".to_owned());
        let api_port = parse_env::<u16>("API_PORT", 3001)?;

        let product_store = match env::var("PRODUCT_STORE")
            .unwrap_or_else(|_| "postgres".to_owned())
            .as_str()
        {
            "postgres" => ProductStoreConfig::Postgres,
            "in_memory" => ProductStoreConfig::InMemory,
            other => {
                return Err(AppError::Validation(format!(
                    "PRODUCT_STORE must be either 'postgres' or 'in_memory', got '{other}'"
                )));
            }
        };

        let database_url = match product_store {
            ProductStoreConfig::Postgres => Some(required_non_empty_env("DATABASE_URL")?),
            ProductStoreConfig::InMemory => optional_non_empty_env("DATABASE_URL"),
        };
        if migrate_only && database_url.is_none() {
            return Err(AppError::Validation(
                "DATABASE_URL is required to run migrations".to_owned(),
            ));
        }

        let redis = RedisConfig {
            host: env::var("REDIS_HOST").unwrap_or_else(|_| "127.0.0.1".to_owned()),
            port: parse_env::<u16>("REDIS_PORT", 6379)?,
            password: optional_non_empty_env("REDIS_PASSWORD"),
            db: parse_env::<u32>("REDIS_DB", 0)?,
            key_prefix: env::var("REDIS_KEY_PREFIX").unwrap_or_else(|_| "catalog:".to_owned()),
            operation_timeout: Duration::from_millis(parse_env_u64(
                "REDIS_OPERATION_TIMEOUT_MS",
                500,
            )?),
        };

        let event_bus = load_event_bus_config()?;

        let cache_policy = CachePolicy {
            lock_lease: Duration::from_millis(parse_env_u64("CACHE_LOCK_LEASE_MS", 10_000)?),
            retry_backoff: Duration::from_millis(parse_env_u64("CACHE_LOCK_RETRY_MS", 200)?),
        };
        let cache_ttls = CacheTtls {
            entity: Duration::from_secs(parse_env_u64("CACHE_TTL_PRODUCT_SECONDS", 300)?),
            list: Duration::from_secs(parse_env_u64("CACHE_TTL_LIST_SECONDS", 60)?),
            category_listing: Duration::from_secs(parse_env_u64(
                "CACHE_TTL_CATEGORY_SECONDS",
                120,
            )?),
            search: Duration::from_secs(parse_env_u64("CACHE_TTL_SEARCH_SECONDS", 30)?),
        };

        let rate_limits = RateLimitRules {
            read: load_rate_limit_rule("READ", "rl:products:read:", 100, 60_000)?,
            write: load_rate_limit_rule("WRITE", "rl:products:write:", 20, 60_000)?,
            search: load_rate_limit_rule("SEARCH", "rl:products:search:", 30, 60_000)?,
        };

        Ok(Self {
            migrate_only,
            api_host,
            api_port,
            product_store,
            database_url,
            redis,
            event_bus,
            cache_policy,
            cache_ttls,
            rate_limits,
        })
    }

    pub fn socket_address(&self) -> Result<SocketAddr, AppError> {
        let host = IpAddr::from_str(&self.api_host).map_err(|error| {
            AppError::Internal(format!("invalid API_HOST '{}': {error}", self.api_host))
        })?;
        Ok(SocketAddr::from((host, self.api_port)))
    }
}

fn load_event_bus_config() -> Result<EventBusConfig, AppError> {
    let brokers = env::var("EVENT_BUS_BROKERS")
        .unwrap_or_else(|_| "redis://127.0.0.1:6379".to_owned())
        .split(',')
        .map(str::trim)
        .filter(|broker| !broker.is_empty())
        .map(str::to_owned)
        .collect::<Vec<_>>();
    if brokers.is_empty() {
        return Err(AppError::Validation(
            "EVENT_BUS_BROKERS must list at least one broker".to_owned(),
        ));
    }

    let partitions = parse_env::<u32>("EVENT_BUS_PARTITIONS", 8)?;
    if partitions == 0 {
        return Err(AppError::Validation(
            "EVENT_BUS_PARTITIONS must be greater than zero".to_owned(),
        ));
    }

    Ok(EventBusConfig {
        brokers,
        partitions,
        connect_retry: ConnectRetryPolicy {
            attempts: parse_env::<u32>("EVENT_BUS_CONNECT_ATTEMPTS", 5)?,
            backoff: Duration::from_millis(parse_env_u64("EVENT_BUS_CONNECT_BACKOFF_MS", 2_000)?),
        },
    })
}

fn load_rate_limit_rule(
    name: &str,
    key_prefix: &str,
    default_max: u32,
    default_window_ms: u64,
) -> Result<RateLimitRule, AppError> {
    let max_requests = parse_env::<u32>(&format!("RATE_LIMIT_{name}_MAX"), default_max)?;
    let window_ms = parse_env_u64(&format!("RATE_LIMIT_{name}_WINDOW_MS"), default_window_ms)?;

    RateLimitRule::new(key_prefix, max_requests, Duration::from_millis(window_ms))
}

pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}

fn required_env(name: &str) -> Result<String, AppError> {
    env::var(name).map_err(|_| AppError::Validation(format!("{name} is required")))
}

fn required_non_empty_env(name: &str) -> Result<String, AppError> {
    let value = required_env(name)?;
    if value.trim().is_empty() {
        return Err(AppError::Validation(format!("{name} must not be empty")));
    }

    Ok(value)
}

fn optional_non_empty_env(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.trim().is_empty())
}

fn parse_env_u64(name: &str, default: u64) -> Result<u64, AppError> {
    parse_env(name, default)
}

fn parse_env<T>(name: &str, default: T) -> Result<T, AppError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match optional_non_empty_env(name) {
        Some(value) => value
            .trim()
            .parse::<T>()
            .map_err(|error| AppError::Validation(format!("invalid {name}: {error}"))),
        None => Ok(default),
    }
}
