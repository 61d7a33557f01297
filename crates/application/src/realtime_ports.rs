//! Port for pushing product changes to live subscribers.

use async_trait::async_trait;
use catalog_core::AppResult;
use catalog_domain::{ProductCreated, ProductDeleted, ProductUpdated};

/// Fan-out to real-time subscribers. Callers log and swallow failures.
#[async_trait]
pub trait RealtimeNotifier: Send + Sync {
    /// Announces a new product.
    async fn notify_product_created(&self, event: &ProductCreated) -> AppResult<()>;

    /// Announces a changed product.
    async fn notify_product_updated(&self, event: &ProductUpdated) -> AppResult<()>;

    /// Announces a removed product.
    async fn notify_product_deleted(&self, event: &ProductDeleted) -> AppResult<()>;
}
