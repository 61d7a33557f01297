//! Sliding-window rate limiting.
//!
//! Every identifier owns a sorted set of attempt markers scored by their
//! timestamp in milliseconds. Checking an attempt prunes markers that fell
//! out of the window, counts what is left, records the new attempt and
//! refreshes the key expiry, all in one pipelined round trip. Rejected
//! attempts are recorded too, so hammering a limit keeps it closed.
//!
//! When the keyed store is unavailable the limiter fails open.

mod config;
mod identity;
mod service;


pub use config::{RateLimitDecision, RateLimitRule};
pub use identity::resolve_rate_limit_identifier;
pub use service::RateLimitService;
