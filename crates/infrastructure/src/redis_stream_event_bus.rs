//! Event bus over Redis Streams.
//!
//! A topic is split into a fixed number of partition streams named
//! `events:{topic}:{partition}`. The partition is derived from the message
//! key, so every event about one entity lands on the same stream in publish
//! order. Consumers join a consumer group per stream and acknowledge each
//! entry once handled.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use catalog_application::{
    EventConsumer, EventPublisher, InboundMessage, OutboundMessage, StartPosition, Subscription,
};
use catalog_core::{AppError, AppResult};
use redis::aio::ConnectionManager;
use redis::streams::StreamReadReply;
use sha2::{Digest, Sha256};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

const COMPONENT: &str = "event_bus";
const STREAM_MAX_LENGTH: u64 = 100_000;
const PENDING_ENTRIES: &str = "0";
const NEW_ENTRIES: &str = ">";

/// Returns the partition a message key is routed to.
#[must_use]
pub fn partition_for(key: &str, partitions: u32) -> u32 {
    let digest = Sha256::digest(key.as_bytes());
    let mut prefix = [0_u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    let partitions = u64::from(partitions.max(1));
    u32::try_from(u64::from_be_bytes(prefix) % partitions).unwrap_or(0)
}

fn stream_name(topic: &str, partition: u32) -> String {
    format!("events:{topic}:{partition}")
}

/// Consumer-side settings of one bus instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamConsumerSettings {
    /// Name of this consumer within its group.
    pub consumer_name: String,
    /// Partitions this instance reads; `None` reads all of them.
    pub owned_partitions: Option<Vec<u32>>,
    /// Largest number of entries read per stream and poll.
    pub batch_size: usize,
    /// Pause after a poll that found nothing.
    pub idle_wait: Duration,
}

impl Default for StreamConsumerSettings {
    fn default() -> Self {
        Self {
            consumer_name: format!("worker-{}", std::process::id()),
            owned_partitions: None,
            batch_size: 50,
            idle_wait: Duration::from_secs(2),
        }
    }
}

#[derive(Debug, Clone)]
struct PartitionStream {
    topic: String,
    partition: u32,
}

#[derive(Debug, Clone)]
struct ActiveSubscription {
    group_id: String,
    streams: HashMap<String, PartitionStream>,
    stream_order: Vec<String>,
    draining_pending: bool,
}

/// Redis Streams implementation of the event publisher and consumer ports.
pub struct RedisStreamEventBus {
    brokers: Vec<String>,
    partitions: u32,
    consumer: StreamConsumerSettings,
    connection: RwLock<Option<ConnectionManager>>,
    subscription: RwLock<Option<ActiveSubscription>>,
}

impl RedisStreamEventBus {
    /// Creates a bus over the given broker URLs, tried in order on connect.
    #[must_use]
    pub fn new(brokers: Vec<String>, partitions: u32) -> Self {
        Self {
            brokers,
            partitions: partitions.max(1),
            consumer: StreamConsumerSettings::default(),
            connection: RwLock::new(None),
            subscription: RwLock::new(None),
        }
    }

    /// Replaces the consumer-side settings.
    #[must_use]
    pub fn with_consumer_settings(mut self, consumer: StreamConsumerSettings) -> Self {
        self.consumer = consumer;
        self
    }

    async fn connection(&self) -> AppResult<ConnectionManager> {
        self.connection
            .read()
            .await
            .clone()
            .ok_or_else(|| AppError::Unavailable("event bus is not connected".to_owned()))
    }

    fn owned_partitions(&self) -> Vec<u32> {
        match &self.consumer.owned_partitions {
            Some(owned) => owned
                .iter()
                .copied()
                .filter(|partition| *partition < self.partitions)
                .collect(),
            None => (0..self.partitions).collect(),
        }
    }

    /// Switches the next poll back to this consumer's pending entries.
    ///
    /// Entries whose read reply or acknowledgement was lost stay pending in
    /// the group and are only handed out again by an explicit `0` read.
    async fn redeliver_pending(&self) {
        if let Some(active) = self.subscription.write().await.as_mut() {
            if !active.draining_pending {
                debug!(component = COMPONENT, "re-reading pending entries on next poll");
            }
            active.draining_pending = true;
        }
    }

    async fn acknowledge(&self, group_id: &str, message: &InboundMessage) -> AppResult<()> {
        let mut connection = self.connection().await?;
        let stream = stream_name(&message.topic, message.partition);
        redis::cmd("XACK")
            .arg(&stream)
            .arg(group_id)
            .arg(&message.offset)
            .query_async::<u64>(&mut connection)
            .await
            .map_err(|error| {
                AppError::Unavailable(format!(
                    "failed to acknowledge '{}' on '{stream}': {error}",
                    message.offset
                ))
            })?;

        Ok(())
    }

    async fn read_group(
        &self,
        subscription: &ActiveSubscription,
        start_id: &str,
    ) -> AppResult<Vec<InboundMessage>> {
        let mut connection = self.connection().await?;
        let mut command = redis::cmd("XREADGROUP");
        command
            .arg("GROUP")
            .arg(&subscription.group_id)
            .arg(&self.consumer.consumer_name)
            .arg("COUNT")
            .arg(self.consumer.batch_size.max(1))
            .arg("STREAMS");
        for stream in &subscription.stream_order {
            command.arg(stream);
        }
        for _ in &subscription.stream_order {
            command.arg(start_id);
        }

        let reply = command
            .query_async::<Option<StreamReadReply>>(&mut connection)
            .await
            .map_err(|error| {
                AppError::Unavailable(format!("failed to read from event streams: {error}"))
            })?;

        let mut messages = Vec::new();
        for stream_key in reply.map(|reply| reply.keys).unwrap_or_default() {
            let Some(stream) = subscription.streams.get(&stream_key.key) else {
                continue;
            };
            for entry in stream_key.ids {
                messages.push(InboundMessage {
                    topic: stream.topic.clone(),
                    key: entry.get::<String>("key"),
                    payload: entry.get::<String>("payload").unwrap_or_default(),
                    offset: entry.id.clone(),
                    partition: stream.partition,
                });
            }
        }

        Ok(messages)
    }
}

#[async_trait]
impl EventPublisher for RedisStreamEventBus {
    async fn connect(&self) -> AppResult<()> {
        let mut failures = Vec::new();

        for broker in &self.brokers {
            let attempt = async {
                let client = redis::Client::open(broker.as_str())?;
                let mut connection = client.get_connection_manager().await?;
                redis::cmd("PING")
                    .query_async::<String>(&mut connection)
                    .await?;
                Ok::<_, redis::RedisError>(connection)
            };

            match attempt.await {
                Ok(connection) => {
                    *self.connection.write().await = Some(connection);
                    info!(component = COMPONENT, broker = %broker, "connected to event bus broker");
                    return Ok(());
                }
                Err(error) => {
                    warn!(
                        component = COMPONENT,
                        broker = %broker,
                        error = %error,
                        "event bus broker unreachable"
                    );
                    failures.push(format!("{broker}: {error}"));
                }
            }
        }

        Err(AppError::Unavailable(format!(
            "no event bus broker reachable ({})",
            failures.join("; ")
        )))
    }

    async fn publish(&self, message: OutboundMessage) -> AppResult<()> {
        let mut connection = self.connection().await?;
        let stream = stream_name(
            &message.topic,
            partition_for(&message.key, self.partitions),
        );

        let entry_id = redis::cmd("XADD")
            .arg(&stream)
            .arg("MAXLEN")
            .arg("~")
            .arg(STREAM_MAX_LENGTH)
            .arg("*")
            .arg("key")
            .arg(&message.key)
            .arg("payload")
            .arg(&message.payload)
            .query_async::<String>(&mut connection)
            .await
            .map_err(|error| {
                AppError::Unavailable(format!("failed to publish to '{stream}': {error}"))
            })?;

        debug!(
            component = COMPONENT,
            stream = %stream,
            entry_id = %entry_id,
            key = %message.key,
            "event published"
        );
        Ok(())
    }
}

#[async_trait]
impl EventConsumer for RedisStreamEventBus {
    async fn subscribe(&self, subscription: &Subscription) -> AppResult<()> {
        let mut connection = self.connection().await?;
        let start_id = match subscription.start {
            StartPosition::Earliest => "0",
            StartPosition::Latest => "$",
        };

        let mut streams = HashMap::new();
        let mut stream_order = Vec::new();
        for topic in &subscription.topics {
            for partition in self.owned_partitions() {
                let stream = stream_name(topic, partition);
                let created = redis::cmd("XGROUP")
                    .arg("CREATE")
                    .arg(&stream)
                    .arg(&subscription.group_id)
                    .arg(start_id)
                    .arg("MKSTREAM")
                    .query_async::<()>(&mut connection)
                    .await;

                match created {
                    Ok(()) => {
                        info!(
                            component = COMPONENT,
                            stream = %stream,
                            group_id = %subscription.group_id,
                            "consumer group created"
                        );
                    }
                    Err(error) if error.code() == Some("BUSYGROUP") => {}
                    Err(error) => {
                        return Err(AppError::Unavailable(format!(
                            "failed to join consumer group on '{stream}': {error}"
                        )));
                    }
                }

                stream_order.push(stream.clone());
                streams.insert(
                    stream,
                    PartitionStream {
                        topic: topic.clone(),
                        partition,
                    },
                );
            }
        }

        if stream_order.is_empty() {
            return Err(AppError::Validation(
                "subscription does not cover any owned partition".to_owned(),
            ));
        }

        info!(
            component = COMPONENT,
            group_id = %subscription.group_id,
            consumer = %self.consumer.consumer_name,
            streams = stream_order.len(),
            "subscribed to event streams"
        );
        *self.subscription.write().await = Some(ActiveSubscription {
            group_id: subscription.group_id.clone(),
            streams,
            stream_order,
            draining_pending: true,
        });
        Ok(())
    }

    async fn poll(&self) -> AppResult<Vec<InboundMessage>> {
        let Some(subscription) = self.subscription.read().await.clone() else {
            return Err(AppError::Validation(
                "poll called before subscribe".to_owned(),
            ));
        };

        if subscription.draining_pending {
            let pending = self.read_group(&subscription, PENDING_ENTRIES).await?;
            if !pending.is_empty() {
                debug!(
                    component = COMPONENT,
                    count = pending.len(),
                    "redelivering unacknowledged entries"
                );
                return Ok(pending);
            }

            if let Some(active) = self.subscription.write().await.as_mut() {
                active.draining_pending = false;
            }
        }

        let messages = match self.read_group(&subscription, NEW_ENTRIES).await {
            Ok(messages) => messages,
            Err(error) => {
                self.redeliver_pending().await;
                return Err(error);
            }
        };
        if messages.is_empty() {
            tokio::time::sleep(self.consumer.idle_wait).await;
        }

        Ok(messages)
    }

    async fn commit(&self, message: &InboundMessage) -> AppResult<()> {
        let Some(group_id) = self
            .subscription
            .read()
            .await
            .as_ref()
            .map(|subscription| subscription.group_id.clone())
        else {
            return Err(AppError::Validation(
                "commit called before subscribe".to_owned(),
            ));
        };

        let acknowledged = self.acknowledge(&group_id, message).await;
        if acknowledged.is_err() {
            self.redeliver_pending().await;
        }

        acknowledged
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use catalog_application::{EventConsumer, InboundMessage};

    use super::{
        ActiveSubscription, PartitionStream, RedisStreamEventBus, StreamConsumerSettings,
        partition_for, stream_name,
    };

    async fn subscribed_bus(draining_pending: bool) -> RedisStreamEventBus {
        let bus = RedisStreamEventBus::new(Vec::new(), 1);
        let stream = stream_name("product.created", 0);
        *bus.subscription.write().await = Some(ActiveSubscription {
            group_id: "catalog-category-counter".to_owned(),
            streams: HashMap::from([(
                stream.clone(),
                PartitionStream {
                    topic: "product.created".to_owned(),
                    partition: 0,
                },
            )]),
            stream_order: vec![stream],
            draining_pending,
        });
        bus
    }

    async fn draining_pending(bus: &RedisStreamEventBus) -> bool {
        bus.subscription
            .read()
            .await
            .as_ref()
            .is_some_and(|active| active.draining_pending)
    }

    #[tokio::test]
    async fn failed_acknowledgement_rereads_pending_entries() {
        let bus = subscribed_bus(false).await;
        let message = InboundMessage {
            topic: "product.created".to_owned(),
            key: Some("7f9c2ba4".to_owned()),
            payload: "{}".to_owned(),
            offset: "1700000000000-0".to_owned(),
            partition: 0,
        };

        assert!(bus.commit(&message).await.is_err());
        assert!(draining_pending(&bus).await);
    }

    #[tokio::test]
    async fn failed_read_rereads_pending_entries() {
        let bus = subscribed_bus(false).await;

        assert!(bus.poll().await.is_err());
        assert!(draining_pending(&bus).await);
    }

    #[test]
    fn partition_is_stable_and_in_range() {
        let first = partition_for("7f9c2ba4-e88f-4d3b-9d3a-0e2a3f5b6c7d", 8);
        let again = partition_for("7f9c2ba4-e88f-4d3b-9d3a-0e2a3f5b6c7d", 8);

        assert_eq!(first, again);
        assert!(first < 8);
        assert_eq!(partition_for("anything", 1), 0);
        assert_eq!(partition_for("anything", 0), 0);
    }

    #[test]
    fn keys_spread_over_partitions() {
        let used = (0..64)
            .map(|index| partition_for(&format!("product-{index}"), 8))
            .collect::<std::collections::HashSet<_>>();
        assert!(used.len() > 1);
    }

    #[test]
    fn stream_names_embed_topic_and_partition() {
        assert_eq!(stream_name("product.created", 3), "events:product.created:3");
    }

    #[test]
    fn owned_partitions_ignore_out_of_range_entries() {
        let bus = RedisStreamEventBus::new(Vec::new(), 4).with_consumer_settings(
            StreamConsumerSettings {
                owned_partitions: Some(vec![1, 3, 9]),
                ..StreamConsumerSettings::default()
            },
        );
        assert_eq!(bus.owned_partitions(), vec![1, 3]);
        assert_eq!(
            RedisStreamEventBus::new(Vec::new(), 3).owned_partitions(),
            vec![0, 1, 2]
        );
    }
}
