//! Process-local event bus for development and tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use catalog_application::{
    EventConsumer, EventPublisher, InboundMessage, OutboundMessage, StartPosition, Subscription,
};
use catalog_core::{AppError, AppResult};
use tokio::sync::Mutex;

#[derive(Debug, Default)]
struct BusState {
    logs: HashMap<String, Vec<OutboundMessage>>,
    failing_topics: HashSet<String>,
    subscription: Option<Subscription>,
    cursors: HashMap<String, usize>,
    committed: Vec<InboundMessage>,
}

/// In-memory implementation of both event bus ports.
///
/// Every topic is one ordered log with a single partition. Polling hands
/// out messages past the subscriber's cursor; commits are recorded.
pub struct InMemoryEventBus {
    state: Mutex<BusState>,
    reachable: AtomicBool,
    batch_size: usize,
}

impl Default for InMemoryEventBus {
    fn default() -> Self {
        Self {
            state: Mutex::new(BusState::default()),
            reachable: AtomicBool::new(true),
            batch_size: 100,
        }
    }
}

impl InMemoryEventBus {
    /// Creates an empty, reachable bus.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulates the broker going away or coming back.
    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    /// Makes every publish to `topic` fail until cleared.
    pub async fn fail_topic(&self, topic: &str, failing: bool) {
        let mut state = self.state.lock().await;
        if failing {
            state.failing_topics.insert(topic.to_owned());
        } else {
            state.failing_topics.remove(topic);
        }
    }

    /// Returns every message published on `topic`, oldest first.
    pub async fn published(&self, topic: &str) -> Vec<OutboundMessage> {
        self.state
            .lock()
            .await
            .logs
            .get(topic)
            .cloned()
            .unwrap_or_default()
    }

    /// Returns every committed message, in commit order.
    pub async fn committed(&self) -> Vec<InboundMessage> {
        self.state.lock().await.committed.clone()
    }

    fn ensure_reachable(&self) -> AppResult<()> {
        if self.reachable.load(Ordering::SeqCst) {
            return Ok(());
        }
        Err(AppError::Unavailable(
            "in-memory event bus is unreachable".to_owned(),
        ))
    }
}

#[async_trait]
impl EventPublisher for InMemoryEventBus {
    async fn connect(&self) -> AppResult<()> {
        self.ensure_reachable()
    }

    async fn publish(&self, message: OutboundMessage) -> AppResult<()> {
        self.ensure_reachable()?;

        let mut state = self.state.lock().await;
        if state.failing_topics.contains(&message.topic) {
            return Err(AppError::Unavailable(format!(
                "topic '{}' rejected the message",
                message.topic
            )));
        }

        state
            .logs
            .entry(message.topic.clone())
            .or_default()
            .push(message);
        Ok(())
    }
}

#[async_trait]
impl EventConsumer for InMemoryEventBus {
    async fn subscribe(&self, subscription: &Subscription) -> AppResult<()> {
        self.ensure_reachable()?;

        let mut state = self.state.lock().await;
        for topic in &subscription.topics {
            let start = match subscription.start {
                StartPosition::Earliest => 0,
                StartPosition::Latest => state.logs.get(topic).map_or(0, Vec::len),
            };
            state.cursors.entry(topic.clone()).or_insert(start);
        }
        state.subscription = Some(subscription.clone());
        Ok(())
    }

    async fn poll(&self) -> AppResult<Vec<InboundMessage>> {
        self.ensure_reachable()?;

        let mut state = self.state.lock().await;
        let Some(subscription) = state.subscription.clone() else {
            return Err(AppError::Validation(
                "poll called before subscribe".to_owned(),
            ));
        };

        let mut batch = Vec::new();
        for topic in &subscription.topics {
            let cursor = state.cursors.get(topic).copied().unwrap_or(0);
            let log = state.logs.get(topic).cloned().unwrap_or_default();
            let taken = log
                .iter()
                .enumerate()
                .skip(cursor)
                .take(self.batch_size)
                .map(|(offset, message)| InboundMessage {
                    topic: message.topic.clone(),
                    key: Some(message.key.clone()),
                    payload: message.payload.clone(),
                    offset: offset.to_string(),
                    partition: 0,
                })
                .collect::<Vec<_>>();
            state.cursors.insert(topic.clone(), cursor + taken.len());
            batch.extend(taken);
        }

        Ok(batch)
    }

    async fn commit(&self, message: &InboundMessage) -> AppResult<()> {
        self.ensure_reachable()?;
        self.state.lock().await.committed.push(message.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use catalog_application::{
        EventConsumer, EventPublisher, OutboundMessage, StartPosition, Subscription,
    };

    use super::InMemoryEventBus;

    fn message(topic: &str, key: &str) -> OutboundMessage {
        OutboundMessage {
            topic: topic.to_owned(),
            key: key.to_owned(),
            payload: "{}".to_owned(),
        }
    }

    fn subscription(start: StartPosition) -> Subscription {
        Subscription {
            topics: vec!["t".to_owned()],
            group_id: "g".to_owned(),
            start,
        }
    }

    #[tokio::test]
    async fn earliest_subscription_sees_history_once() {
        let bus = InMemoryEventBus::new();
        assert!(bus.publish(message("t", "a")).await.is_ok());
        assert!(bus.subscribe(&subscription(StartPosition::Earliest)).await.is_ok());
        assert!(bus.publish(message("t", "b")).await.is_ok());

        let first = bus.poll().await.unwrap_or_default();
        let second = bus.poll().await.unwrap_or_default();

        assert_eq!(
            first.iter().map(|m| m.key.clone()).collect::<Vec<_>>(),
            vec![Some("a".to_owned()), Some("b".to_owned())]
        );
        assert!(second.is_empty());
    }

    #[tokio::test]
    async fn latest_subscription_skips_history() {
        let bus = InMemoryEventBus::new();
        assert!(bus.publish(message("t", "old")).await.is_ok());
        assert!(bus.subscribe(&subscription(StartPosition::Latest)).await.is_ok());

        assert!(bus.poll().await.unwrap_or_default().is_empty());
    }

    #[tokio::test]
    async fn failing_topic_rejects_publishes() {
        let bus = InMemoryEventBus::new();
        bus.fail_topic("t", true).await;

        assert!(bus.publish(message("t", "a")).await.is_err());
        assert!(bus.published("t").await.is_empty());

        bus.fail_topic("t", false).await;
        assert!(bus.publish(message("t", "a")).await.is_ok());
    }

    #[tokio::test]
    async fn unreachable_bus_refuses_connections() {
        let bus = InMemoryEventBus::new();
        bus.set_reachable(false);

        assert!(bus.connect().await.is_err());
    }
}
