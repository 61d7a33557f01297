//! Application services and ports.

#![forbid(unsafe_code)]

mod category_count_saga;
mod clock;
mod event_dispatcher;
mod event_ports;
mod keyed_store_ports;
mod product_ports;
mod product_service;
mod rate_limit_service;
mod read_through_cache;
mod realtime_ports;

pub use category_count_saga::{CategoryCountSaga, ReconciliationOutcome};
pub use clock::{Clock, SystemClock};
pub use event_dispatcher::{ConnectRetryPolicy, EventDispatcher};
pub use event_ports::{
    EventConsumer, EventPublisher, InboundMessage, OutboundMessage, StartPosition, Subscription,
};
pub use keyed_store_ports::{KeyedStore, StoreCommand, StoreReply};
pub use product_ports::{
    DEFAULT_PAGE_LIMIT, MAX_PAGE_LIMIT, PageRequest, ProductFilter, ProductListQuery, ProductPage,
    ProductRepository, ProductSortField, ProductUpdate, SortDirection,
};
pub use product_service::ProductService;
pub use rate_limit_service::{
    RateLimitDecision, RateLimitRule, RateLimitService, resolve_rate_limit_identifier,
};
pub use read_through_cache::{CachePolicy, CacheTtls, ReadThroughCache};
pub use realtime_ports::RealtimeNotifier;

#[cfg(test)]
mod test_support;
