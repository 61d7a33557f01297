use std::sync::Arc;

use catalog_application::{KeyedStore, ProductService, RateLimitService};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub product_service: ProductService,
    pub rate_limit_service: RateLimitService,
    pub keyed_store: Arc<dyn KeyedStore>,
}
