//! Realtime notifier that only logs, for deployments without a push gateway.

use async_trait::async_trait;
use catalog_application::RealtimeNotifier;
use catalog_core::AppResult;
use catalog_domain::{ProductCreated, ProductDeleted, ProductUpdated};
use tracing::info;

const COMPONENT: &str = "realtime";

/// Development notifier that logs product changes to tracing output.
#[derive(Debug, Clone, Default)]
pub struct TracingRealtimeNotifier;

impl TracingRealtimeNotifier {
    /// Creates a new tracing notifier.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl RealtimeNotifier for TracingRealtimeNotifier {
    async fn notify_product_created(&self, event: &ProductCreated) -> AppResult<()> {
        info!(
            component = COMPONENT,
            product_id = %event.id,
            category_id = %event.category_id,
            name = %event.name,
            "product.created pushed to subscribers"
        );
        Ok(())
    }

    async fn notify_product_updated(&self, event: &ProductUpdated) -> AppResult<()> {
        info!(
            component = COMPONENT,
            product_id = %event.id,
            category_id = %event.category_id,
            version = event.version,
            "product.updated pushed to subscribers"
        );
        Ok(())
    }

    async fn notify_product_deleted(&self, event: &ProductDeleted) -> AppResult<()> {
        info!(
            component = COMPONENT,
            product_id = %event.id,
            category_id = %event.category_id,
            "product.deleted pushed to subscribers"
        );
        Ok(())
    }
}
