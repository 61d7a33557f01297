//! Event producer used by the write path and the reconciliation saga.

use std::sync::Arc;
use std::time::Duration;

use catalog_core::{AppError, AppResult};
use catalog_domain::{CategoryCountAdjustment, ProductEvent};
use tracing::{error, info, warn};

use crate::event_ports::{EventPublisher, OutboundMessage};


const COMPONENT: &str = "event_dispatcher";

/// Bounded retry applied while establishing the bus connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectRetryPolicy {
    /// Total connection attempts.
    pub attempts: u32,
    /// Pause between attempts.
    pub backoff: Duration,
}

impl Default for ConnectRetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 5,
            backoff: Duration::from_secs(2),
        }
    }
}

/// Publishes domain events keyed by the entity they describe.
#[derive(Clone)]
pub struct EventDispatcher {
    publisher: Arc<dyn EventPublisher>,
    retry_policy: ConnectRetryPolicy,
}

impl EventDispatcher {
    /// Creates a dispatcher over a bus publisher.
    #[must_use]
    pub fn new(publisher: Arc<dyn EventPublisher>, retry_policy: ConnectRetryPolicy) -> Self {
        Self {
            publisher,
            retry_policy,
        }
    }

    /// Connects to the bus with bounded retry.
    ///
    /// Returns `false` once every attempt failed. The failure is logged and
    /// left to the host process; publishing later fails fast instead.
    pub async fn start(&self) -> bool {
        let attempts = self.retry_policy.attempts.max(1);

        for attempt in 1..=attempts {
            match self.publisher.connect().await {
                Ok(()) => {
                    info!(component = COMPONENT, attempt, "event bus connection established");
                    return true;
                }
                Err(error) => {
                    warn!(
                        component = COMPONENT,
                        attempt,
                        max_attempts = attempts,
                        error = %error,
                        "event bus connection attempt failed"
                    );
                    if attempt < attempts {
                        tokio::time::sleep(self.retry_policy.backoff).await;
                    }
                }
            }
        }

        error!(
            component = COMPONENT,
            max_attempts = attempts,
            "CRITICAL: could not connect to the event bus, events will not be published"
        );
        false
    }

    /// Publishes a product lifecycle event keyed by product id.
    pub async fn publish_product_event(&self, event: &ProductEvent) -> AppResult<()> {
        self.publish(event.topic(), event.partition_key(), event.to_payload()?)
            .await
    }

    /// Publishes a category count adjustment keyed by category id.
    pub async fn publish_count_adjustment(
        &self,
        adjustment: &CategoryCountAdjustment,
    ) -> AppResult<()> {
        self.publish(
            adjustment.topic(),
            adjustment.partition_key(),
            adjustment.to_payload()?,
        )
        .await
    }

    async fn publish(&self, topic: &str, key: String, payload: String) -> AppResult<()> {
        self.publisher
            .publish(OutboundMessage {
                topic: topic.to_owned(),
                key,
                payload,
            })
            .await
            .map_err(|error| {
                error!(component = COMPONENT, topic, error = %error, "failed to publish event");
                match error {
                    AppError::Unavailable(message) => AppError::Unavailable(message),
                    other => AppError::Unavailable(format!(
                        "failed to publish event to '{topic}': {other}"
                    )),
                }
            })
    }
}
