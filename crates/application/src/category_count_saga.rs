//! Choreographed saga keeping category product counts in step with products.
//!
//! Each product event is decoded once at the boundary and turned into zero,
//! one or two count adjustments for the category context:
//!
//! - created: increment the new category
//! - updated: decrement the old and increment the new category, only when
//!   the product actually moved
//! - deleted: decrement the category
//!
//! Emission failures are logged and never retried. A move whose two halves
//! disagree leaves a count skew that is logged with both category ids for
//! manual reconciliation. Replayed events are not deduplicated here.

use std::sync::Arc;

use catalog_core::AppResult;
use catalog_domain::{
    CategoryCountAdjustment, ProductCreated, ProductDeleted, ProductEvent, ProductUpdated,
};
use tracing::{debug, error, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::event_dispatcher::EventDispatcher;
use crate::event_ports::{EventConsumer, InboundMessage};
use crate::realtime_ports::RealtimeNotifier;


const COMPONENT: &str = "category_count_saga";

/// What handling one message amounted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconciliationOutcome {
    /// The payload could not be decoded and was dropped.
    Malformed,
    /// The event was handled.
    Applied {
        /// Adjustments published.
        emitted: u32,
        /// Adjustments that failed to publish.
        failed: u32,
    },
}

/// Consumer translating product events into category count adjustments.
#[derive(Clone)]
pub struct CategoryCountSaga {
    dispatcher: EventDispatcher,
    notifier: Arc<dyn RealtimeNotifier>,
    clock: Arc<dyn Clock>,
}

impl CategoryCountSaga {
    /// Creates the saga.
    #[must_use]
    pub fn new(dispatcher: EventDispatcher, notifier: Arc<dyn RealtimeNotifier>) -> Self {
        Self {
            dispatcher,
            notifier,
            clock: Arc::new(SystemClock),
        }
    }

    /// Replaces the time source used to stamp adjustments.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Polls one batch, handles every message and commits each of them.
    ///
    /// Returns the number of messages in the batch. Poll errors are returned
    /// so the caller can back off. A failed commit is logged and the rest of
    /// the batch is still handled; the entry stays pending on the bus and is
    /// delivered again.
    pub async fn process_batch(&self, consumer: &dyn EventConsumer) -> AppResult<usize> {
        let messages = consumer.poll().await?;
        for message in &messages {
            self.handle(message).await;
            if let Err(error) = consumer.commit(message).await {
                warn!(
                    component = COMPONENT,
                    topic = %message.topic,
                    offset = %message.offset,
                    error = %error,
                    "failed to commit product event, it will be redelivered"
                );
            }
        }

        Ok(messages.len())
    }

    /// Handles one message. Never fails: problems are logged.
    pub async fn handle(&self, message: &InboundMessage) -> ReconciliationOutcome {
        let event = match ProductEvent::decode(&message.topic, &message.payload) {
            Ok(event) => event,
            Err(error) => {
                warn!(
                    component = COMPONENT,
                    topic = %message.topic,
                    offset = %message.offset,
                    error = %error,
                    "dropping malformed product event"
                );
                return ReconciliationOutcome::Malformed;
            }
        };

        debug!(
            component = COMPONENT,
            topic = %message.topic,
            product_id = %event.product_id(),
            "handling product event"
        );

        match event {
            ProductEvent::Created(created) => self.on_created(&created).await,
            ProductEvent::Updated(updated) => self.on_updated(&updated).await,
            ProductEvent::Deleted(deleted) => self.on_deleted(&deleted).await,
        }
    }

    async fn on_created(&self, event: &ProductCreated) -> ReconciliationOutcome {
        let adjustment = CategoryCountAdjustment::increment(
            event.category_id.clone(),
            event.id,
            Some(event.name.clone()),
            self.clock.now(),
        );
        let outcome = tally([self.emit(&adjustment).await]);

        if let Err(error) = self.notifier.notify_product_created(event).await {
            warn!(
                component = COMPONENT,
                product_id = %event.id,
                error = %error,
                "failed to notify realtime subscribers"
            );
        }

        outcome
    }

    async fn on_updated(&self, event: &ProductUpdated) -> ReconciliationOutcome {
        let outcome = match event.category_move() {
            Some((from, to)) => {
                let now = self.clock.now();
                let decrement = CategoryCountAdjustment::decrement(
                    from.clone(),
                    event.id,
                    Some(event.name.clone()),
                    now,
                );
                let increment = CategoryCountAdjustment::increment(
                    to.clone(),
                    event.id,
                    Some(event.name.clone()),
                    now,
                );

                let decremented = self.emit(&decrement).await;
                let incremented = self.emit(&increment).await;
                if decremented != incremented {
                    error!(
                        component = COMPONENT,
                        product_id = %event.id,
                        from_category_id = %from,
                        to_category_id = %to,
                        decrement_published = decremented,
                        increment_published = incremented,
                        "category move half-applied, product counts are skewed"
                    );
                } else if decremented {
                    info!(
                        component = COMPONENT,
                        product_id = %event.id,
                        from_category_id = %from,
                        to_category_id = %to,
                        "product moved between categories"
                    );
                }

                tally([decremented, incremented])
            }
            None => ReconciliationOutcome::Applied {
                emitted: 0,
                failed: 0,
            },
        };

        if let Err(error) = self.notifier.notify_product_updated(event).await {
            warn!(
                component = COMPONENT,
                product_id = %event.id,
                error = %error,
                "failed to notify realtime subscribers"
            );
        }

        outcome
    }

    async fn on_deleted(&self, event: &ProductDeleted) -> ReconciliationOutcome {
        let adjustment = CategoryCountAdjustment::decrement(
            event.category_id.clone(),
            event.id,
            Some(event.name.clone()),
            self.clock.now(),
        );
        let outcome = tally([self.emit(&adjustment).await]);

        if let Err(error) = self.notifier.notify_product_deleted(event).await {
            warn!(
                component = COMPONENT,
                product_id = %event.id,
                error = %error,
                "failed to notify realtime subscribers"
            );
        }

        outcome
    }

    async fn emit(&self, adjustment: &CategoryCountAdjustment) -> bool {
        match self.dispatcher.publish_count_adjustment(adjustment).await {
            Ok(()) => true,
            Err(error) => {
                warn!(
                    component = COMPONENT,
                    category_id = %adjustment.category_id,
                    product_id = %adjustment.product_id,
                    direction = adjustment.direction.as_str(),
                    error = %error,
                    "failed to publish category count adjustment"
                );
                false
            }
        }
    }
}

fn tally<const N: usize>(results: [bool; N]) -> ReconciliationOutcome {
    let emitted = results.iter().filter(|published| **published).count();
    let failed = results.len() - emitted;

    ReconciliationOutcome::Applied {
        emitted: u32::try_from(emitted).unwrap_or(u32::MAX),
        failed: u32::try_from(failed).unwrap_or(u32::MAX),
    }
}
