//! Ports for the message bus carrying domain events between services.

use async_trait::async_trait;
use catalog_core::AppResult;

/// Message handed to the bus for publication.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    /// Destination topic.
    pub topic: String,
    /// Partition key; messages sharing a key are delivered in publish order.
    pub key: String,
    /// JSON payload.
    pub payload: String,
}

/// Message received from a subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    /// Topic the message arrived on.
    pub topic: String,
    /// Partition key, when the producer supplied one.
    pub key: Option<String>,
    /// Raw payload.
    pub payload: String,
    /// Position of the message, used to commit it.
    pub offset: String,
    /// Partition the message was read from.
    pub partition: u32,
}

/// Where a consumer group starts when it has no committed position yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartPosition {
    /// Replay everything still retained.
    Earliest,
    /// Only messages published after the subscription.
    Latest,
}

/// Subscription request for a consumer group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    /// Topics to consume.
    pub topics: Vec<String>,
    /// Consumer group sharing the committed positions.
    pub group_id: String,
    /// Start position for a group seen for the first time.
    pub start: StartPosition,
}

/// Producer side of the message bus.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Establishes the underlying connection.
    async fn connect(&self) -> AppResult<()>;

    /// Publishes one message, failing fast when the bus does not accept it.
    async fn publish(&self, message: OutboundMessage) -> AppResult<()>;
}

/// Consumer side of the message bus.
#[async_trait]
pub trait EventConsumer: Send + Sync {
    /// Joins a consumer group for the given topics.
    async fn subscribe(&self, subscription: &Subscription) -> AppResult<()>;

    /// Waits for the next batch of messages, possibly empty.
    async fn poll(&self) -> AppResult<Vec<InboundMessage>>;

    /// Marks a message as processed for the consumer group.
    async fn commit(&self, message: &InboundMessage) -> AppResult<()>;
}
