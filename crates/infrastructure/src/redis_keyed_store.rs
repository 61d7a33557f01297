//! Redis-backed keyed store.
//!
//! One multiplexed connection is opened lazily and shared by every caller.
//! Each operation runs under a timeout; a failure drops the connection,
//! marks the store unavailable and yields the sentinel value. After a
//! short cooldown the next call tries the server again.

use std::future::Future;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use catalog_application::{KeyedStore, StoreCommand, StoreReply};
use redis::aio::MultiplexedConnection;
use redis::{RedisResult, Script, Value};
use tokio::sync::RwLock;
use tracing::{info, warn};

const COMPONENT: &str = "keyed_store";
const RECONNECT_COOLDOWN: Duration = Duration::from_secs(1);
const SCAN_BATCH_SIZE: usize = 100;

const RELEASE_IF_HELD_SCRIPT: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
  return redis.call('DEL', KEYS[1])
else
  return 0
end
"#;

/// Redis implementation of the keyed store port.
pub struct RedisKeyedStore {
    client: redis::Client,
    key_prefix: String,
    operation_timeout: Duration,
    connection: RwLock<Option<MultiplexedConnection>>,
    unavailable_since: Mutex<Option<Instant>>,
}

impl RedisKeyedStore {
    /// Creates a store namespacing every key with `key_prefix`.
    #[must_use]
    pub fn new(
        client: redis::Client,
        key_prefix: impl Into<String>,
        operation_timeout: Duration,
    ) -> Self {
        Self {
            client,
            key_prefix: key_prefix.into(),
            operation_timeout,
            connection: RwLock::new(None),
            unavailable_since: Mutex::new(None),
        }
    }

    /// Opens the connection eagerly and reports whether the server answered.
    pub async fn connect(&self) -> bool {
        let connected = self
            .run("PING", |mut connection| async move {
                redis::cmd("PING").query_async::<String>(&mut connection).await
            })
            .await
            .is_some();

        if connected {
            info!(component = COMPONENT, "keyed store connection ready");
        }
        connected
    }

    fn key(&self, key: &str) -> String {
        format!("{}{key}", self.key_prefix)
    }

    fn mark_available(&self) {
        if let Ok(mut since) = self.unavailable_since.lock() {
            if since.take().is_some() {
                info!(component = COMPONENT, "keyed store is reachable again");
            }
        }
    }

    fn mark_unavailable(&self) {
        if let Ok(mut since) = self.unavailable_since.lock() {
            *since = Some(Instant::now());
        }
    }

    async fn current_connection(&self) -> Option<MultiplexedConnection> {
        if let Some(connection) = self.connection.read().await.as_ref() {
            return Some(connection.clone());
        }

        let mut slot = self.connection.write().await;
        if let Some(connection) = slot.as_ref() {
            return Some(connection.clone());
        }

        let connecting = self.client.get_multiplexed_async_connection();
        match tokio::time::timeout(self.operation_timeout, connecting).await {
            Ok(Ok(connection)) => {
                *slot = Some(connection.clone());
                Some(connection)
            }
            Ok(Err(error)) => {
                warn!(component = COMPONENT, error = %error, "failed to connect to redis");
                self.mark_unavailable();
                None
            }
            Err(_) => {
                warn!(
                    component = COMPONENT,
                    timeout_ms = self.operation_timeout.as_millis() as u64,
                    "timed out connecting to redis"
                );
                self.mark_unavailable();
                None
            }
        }
    }

    async fn run<T, F, Fut>(&self, operation: &'static str, call: F) -> Option<T>
    where
        F: FnOnce(MultiplexedConnection) -> Fut,
        Fut: Future<Output = RedisResult<T>>,
    {
        let connection = self.current_connection().await?;

        let failure = match tokio::time::timeout(self.operation_timeout, call(connection)).await {
            Ok(Ok(value)) => {
                self.mark_available();
                return Some(value);
            }
            Ok(Err(error)) => error.to_string(),
            Err(_) => format!(
                "timed out after {}ms",
                self.operation_timeout.as_millis()
            ),
        };

        warn!(
            component = COMPONENT,
            operation,
            error = %failure,
            "keyed store operation failed, marking store unavailable"
        );
        self.mark_unavailable();
        self.connection.write().await.take();
        None
    }

    fn append_command(&self, pipeline: &mut redis::Pipeline, command: &StoreCommand) {
        match command {
            StoreCommand::Get { key } => {
                pipeline.cmd("GET").arg(self.key(key));
            }
            StoreCommand::Set { key, value, ttl } => {
                let set = pipeline.cmd("SET").arg(self.key(key)).arg(value);
                if let Some(ttl) = ttl {
                    set.arg("PX").arg(ttl_millis(*ttl));
                }
            }
            StoreCommand::Del { key } => {
                pipeline.cmd("DEL").arg(self.key(key));
            }
            StoreCommand::Exists { key } => {
                pipeline.cmd("EXISTS").arg(self.key(key));
            }
            StoreCommand::Incr { key } => {
                pipeline.cmd("INCR").arg(self.key(key));
            }
            StoreCommand::PExpire { key, ttl } => {
                pipeline
                    .cmd("PEXPIRE")
                    .arg(self.key(key))
                    .arg(ttl_millis(*ttl));
            }
            StoreCommand::ZRemRangeByScore { key, min, max } => {
                pipeline
                    .cmd("ZREMRANGEBYSCORE")
                    .arg(self.key(key))
                    .arg(score_bound(*min))
                    .arg(score_bound(*max));
            }
            StoreCommand::ZCard { key } => {
                pipeline.cmd("ZCARD").arg(self.key(key));
            }
            StoreCommand::ZAdd { key, score, member } => {
                pipeline
                    .cmd("ZADD")
                    .arg(self.key(key))
                    .arg(score_bound(*score))
                    .arg(member);
            }
            StoreCommand::ZOldestScore { key } => {
                pipeline
                    .cmd("ZRANGE")
                    .arg(self.key(key))
                    .arg(0)
                    .arg(0)
                    .arg("WITHSCORES");
            }
        }
    }
}

#[async_trait]
impl KeyedStore for RedisKeyedStore {
    fn is_available(&self) -> bool {
        self.unavailable_since
            .lock()
            .map(|since| since.is_none_or(|since| since.elapsed() >= RECONNECT_COOLDOWN))
            .unwrap_or(false)
    }

    async fn get(&self, key: &str) -> Option<String> {
        let key = self.key(key);
        self.run("GET", |mut connection| async move {
            redis::cmd("GET")
                .arg(key)
                .query_async::<Option<String>>(&mut connection)
                .await
        })
        .await
        .flatten()
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> bool {
        let mut command = redis::cmd("SET");
        command.arg(self.key(key)).arg(value);
        if let Some(ttl) = ttl {
            command.arg("PX").arg(ttl_millis(ttl));
        }

        self.run("SET", |mut connection| async move {
            command.query_async::<()>(&mut connection).await
        })
        .await
        .is_some()
    }

    async fn del(&self, key: &str) -> u64 {
        let key = self.key(key);
        self.run("DEL", |mut connection| async move {
            redis::cmd("DEL")
                .arg(key)
                .query_async::<u64>(&mut connection)
                .await
        })
        .await
        .unwrap_or(0)
    }

    async fn exists(&self, key: &str) -> bool {
        let key = self.key(key);
        self.run("EXISTS", |mut connection| async move {
            redis::cmd("EXISTS")
                .arg(key)
                .query_async::<bool>(&mut connection)
                .await
        })
        .await
        .unwrap_or(false)
    }

    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> bool {
        let mut command = redis::cmd("SET");
        command
            .arg(self.key(key))
            .arg(value)
            .arg("NX")
            .arg("PX")
            .arg(ttl_millis(ttl));

        self.run("SET NX", |mut connection| async move {
            command.query_async::<Value>(&mut connection).await
        })
        .await
        .is_some_and(|reply| !matches!(reply, Value::Nil))
    }

    async fn release_if_held(&self, key: &str, token: &str) -> bool {
        let key = self.key(key);
        let token = token.to_owned();
        self.run("RELEASE", |mut connection| async move {
            Script::new(RELEASE_IF_HELD_SCRIPT)
                .key(key)
                .arg(token)
                .invoke_async::<i64>(&mut connection)
                .await
        })
        .await
        .is_some_and(|deleted| deleted == 1)
    }

    async fn increment_counter(&self, key: &str) -> i64 {
        let key = self.key(key);
        self.run("INCR", |mut connection| async move {
            redis::cmd("INCR")
                .arg(key)
                .query_async::<i64>(&mut connection)
                .await
        })
        .await
        .unwrap_or(0)
    }

    async fn keys_matching(&self, pattern: &str) -> Vec<String> {
        let pattern = self.key(pattern);
        let matched = self
            .run("SCAN", |mut connection| async move {
                let mut cursor: u64 = 0;
                let mut keys = Vec::new();
                loop {
                    let (next_cursor, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                        .arg(cursor)
                        .arg("MATCH")
                        .arg(&pattern)
                        .arg("COUNT")
                        .arg(SCAN_BATCH_SIZE)
                        .query_async(&mut connection)
                        .await?;
                    keys.extend(batch);
                    if next_cursor == 0 {
                        break;
                    }
                    cursor = next_cursor;
                }
                Ok::<_, redis::RedisError>(keys)
            })
            .await
            .unwrap_or_default();

        matched
            .into_iter()
            .filter_map(|key| key.strip_prefix(self.key_prefix.as_str()).map(str::to_owned))
            .collect()
    }

    async fn pipeline(&self, commands: Vec<StoreCommand>) -> Option<Vec<StoreReply>> {
        if commands.is_empty() {
            return Some(Vec::new());
        }

        let mut pipeline = redis::pipe();
        for command in &commands {
            self.append_command(&mut pipeline, command);
        }

        let values = self
            .run("PIPELINE", |mut connection| async move {
                pipeline.query_async::<Vec<Value>>(&mut connection).await
            })
            .await?;

        if values.len() != commands.len() {
            warn!(
                component = COMPONENT,
                expected = commands.len(),
                received = values.len(),
                "pipeline reply count mismatch"
            );
            return None;
        }

        Some(
            commands
                .iter()
                .zip(values)
                .map(|(command, value)| match command {
                    StoreCommand::ZOldestScore { .. } => oldest_score(value),
                    _ => reply_from_value(value),
                })
                .collect(),
        )
    }
}

fn ttl_millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1)
}

fn score_bound(score: f64) -> String {
    if score == f64::NEG_INFINITY {
        "-inf".to_owned()
    } else if score == f64::INFINITY {
        "+inf".to_owned()
    } else {
        score.to_string()
    }
}

fn reply_from_value(value: Value) -> StoreReply {
    match value {
        Value::Nil => StoreReply::Nil,
        Value::Int(value) => StoreReply::Integer(value),
        Value::Double(value) => StoreReply::Float(value),
        Value::Boolean(value) => StoreReply::Integer(i64::from(value)),
        Value::Okay => StoreReply::Status,
        Value::SimpleString(text) if text == "OK" => StoreReply::Status,
        Value::SimpleString(text) => StoreReply::Text(text),
        Value::BulkString(bytes) => StoreReply::Text(String::from_utf8_lossy(&bytes).into_owned()),
        _ => StoreReply::Nil,
    }
}

/// Reads the score out of `ZRANGE key 0 0 WITHSCORES`, which is a flat
/// `[member, score]` pair on RESP2 and a nested pair on RESP3.
fn oldest_score(value: Value) -> StoreReply {
    let Value::Array(mut items) = value else {
        return StoreReply::Nil;
    };

    if let [Value::Array(_)] = items.as_slice() {
        let Some(Value::Array(pair)) = items.pop() else {
            return StoreReply::Nil;
        };
        items = pair;
    }

    match items.into_iter().nth(1).map(reply_from_value) {
        Some(StoreReply::Float(score)) => StoreReply::Float(score),
        Some(StoreReply::Integer(score)) => StoreReply::Float(score as f64),
        Some(StoreReply::Text(score)) => score
            .parse::<f64>()
            .map_or(StoreReply::Nil, StoreReply::Float),
        _ => StoreReply::Nil,
    }
}

#[cfg(test)]
mod tests {
    use catalog_application::StoreReply;
    use redis::Value;

    use super::{oldest_score, reply_from_value, score_bound};

    #[test]
    fn infinite_bounds_use_redis_notation() {
        assert_eq!(score_bound(f64::NEG_INFINITY), "-inf");
        assert_eq!(score_bound(f64::INFINITY), "+inf");
        assert_eq!(score_bound(1_700_000_000_000.0), "1700000000000");
    }

    #[test]
    fn oldest_score_reads_flat_and_nested_pairs() {
        let flat = Value::Array(vec![
            Value::BulkString(b"1700000000000-a".to_vec()),
            Value::BulkString(b"1700000000000".to_vec()),
        ]);
        let nested = Value::Array(vec![Value::Array(vec![
            Value::BulkString(b"m".to_vec()),
            Value::Double(42.0),
        ])]);

        assert_eq!(oldest_score(flat), StoreReply::Float(1_700_000_000_000.0));
        assert_eq!(oldest_score(nested), StoreReply::Float(42.0));
        assert_eq!(oldest_score(Value::Array(Vec::new())), StoreReply::Nil);
    }

    #[test]
    fn status_and_bulk_replies_are_distinguished() {
        assert_eq!(reply_from_value(Value::Okay), StoreReply::Status);
        assert_eq!(
            reply_from_value(Value::BulkString(b"7".to_vec())),
            StoreReply::Text("7".to_owned())
        );
        assert_eq!(reply_from_value(Value::Int(3)), StoreReply::Integer(3));
    }
}
