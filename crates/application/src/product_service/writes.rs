use catalog_core::{AppError, AppResult};
use catalog_domain::{Product, ProductDraft, ProductEvent, ProductId};
use tracing::{error, info};

use crate::product_ports::ProductUpdate;

use super::{COMPONENT, ProductService, cache_keys};

impl ProductService {
    /// Creates a product and announces it.
    pub async fn create_product(&self, draft: ProductDraft) -> AppResult<Product> {
        let product = self.repository.create(&draft).await?;
        self.refresh_cache(&product).await;
        self.announce(ProductEvent::created(&product)).await?;

        info!(component = COMPONENT, product_id = %product.id, "product created");
        Ok(product)
    }

    /// Replaces a product's attributes and announces the change.
    pub async fn update_product(
        &self,
        product_id: ProductId,
        draft: ProductDraft,
    ) -> AppResult<Product> {
        let ProductUpdate {
            product,
            previous_category_id,
        } = self.repository.update(product_id, &draft).await?;
        self.refresh_cache(&product).await;
        self.announce(ProductEvent::updated(&product, Some(previous_category_id)))
            .await?;

        info!(
            component = COMPONENT,
            product_id = %product.id,
            version = product.version,
            "product updated"
        );
        Ok(product)
    }

    /// Deletes a product and announces the removal.
    pub async fn delete_product(&self, product_id: ProductId) -> AppResult<Product> {
        let product = self.repository.delete(product_id).await?;
        self.cache
            .invalidate(&cache_keys::product(product.id))
            .await;
        self.cache
            .invalidate_pattern(cache_keys::LISTINGS_PATTERN)
            .await;
        self.announce(ProductEvent::deleted(&product, self.clock.now()))
            .await?;

        info!(component = COMPONENT, product_id = %product.id, "product deleted");
        Ok(product)
    }

    async fn refresh_cache(&self, product: &Product) {
        self.cache
            .put(&cache_keys::product(product.id), product, self.ttls.entity)
            .await;
        self.cache
            .invalidate_pattern(cache_keys::LISTINGS_PATTERN)
            .await;
    }

    async fn announce(&self, event: ProductEvent) -> AppResult<()> {
        let product_id = event.product_id();
        self.dispatcher
            .publish_product_event(&event)
            .await
            .map_err(|publish_error| {
                error!(
                    component = COMPONENT,
                    product_id = %product_id,
                    topic = event.topic(),
                    error = %publish_error,
                    "product change stored but its event was not published"
                );
                AppError::Unavailable(format!(
                    "product '{product_id}' was saved but its change event was not published"
                ))
            })
    }
}
