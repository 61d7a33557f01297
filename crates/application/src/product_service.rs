//! Product read and write paths.
//!
//! Reads go through the read-through cache. Writes mutate the store of
//! record first, then refresh the cache, then publish the domain event.
//! There is no transaction spanning those steps: a failed publish leaves
//! the stored change in place and is reported to the caller.

use std::sync::Arc;

use crate::clock::{Clock, SystemClock};
use crate::event_dispatcher::EventDispatcher;
use crate::product_ports::ProductRepository;
use crate::read_through_cache::{CacheTtls, ReadThroughCache};

mod cache_keys;
mod reads;
mod writes;

#[cfg(test)]
mod tests;

const COMPONENT: &str = "product_service";

/// Application service for catalog products.
#[derive(Clone)]
pub struct ProductService {
    repository: Arc<dyn ProductRepository>,
    cache: ReadThroughCache,
    ttls: CacheTtls,
    dispatcher: EventDispatcher,
    clock: Arc<dyn Clock>,
}

impl ProductService {
    /// Creates a product service.
    #[must_use]
    pub fn new(
        repository: Arc<dyn ProductRepository>,
        cache: ReadThroughCache,
        ttls: CacheTtls,
        dispatcher: EventDispatcher,
    ) -> Self {
        Self {
            repository,
            cache,
            ttls,
            dispatcher,
            clock: Arc::new(SystemClock),
        }
    }

    /// Replaces the time source used to stamp deletion events.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}
