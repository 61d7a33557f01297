//! Port for the shared remote key-value store.
//!
//! Implementations never return errors. A network fault or a connection
//! that is not ready turns every call into its sentinel (`None`, `false`,
//! `0`, empty) and flips [`KeyedStore::is_available`] to `false` until a
//! later call succeeds. Callers pick their own fallback policy.

use std::time::Duration;

use async_trait::async_trait;

/// One command submitted through [`KeyedStore::pipeline`].
#[derive(Debug, Clone, PartialEq)]
pub enum StoreCommand {
    /// Reads a string value.
    Get {
        /// Key to read.
        key: String,
    },
    /// Writes a string value with optional expiry.
    Set {
        /// Key to write.
        key: String,
        /// Value to store.
        value: String,
        /// Optional time to live.
        ttl: Option<Duration>,
    },
    /// Deletes a key.
    Del {
        /// Key to delete.
        key: String,
    },
    /// Checks whether a key exists.
    Exists {
        /// Key to check.
        key: String,
    },
    /// Atomically increments a counter.
    Incr {
        /// Counter key.
        key: String,
    },
    /// Sets or refreshes a key's expiry.
    PExpire {
        /// Key to expire.
        key: String,
        /// Time to live from now.
        ttl: Duration,
    },
    /// Removes sorted-set members whose score lies in `[min, max]`.
    ZRemRangeByScore {
        /// Sorted-set key.
        key: String,
        /// Inclusive lower bound.
        min: f64,
        /// Inclusive upper bound.
        max: f64,
    },
    /// Counts sorted-set members.
    ZCard {
        /// Sorted-set key.
        key: String,
    },
    /// Adds one sorted-set member.
    ZAdd {
        /// Sorted-set key.
        key: String,
        /// Member score.
        score: f64,
        /// Member value.
        member: String,
    },
    /// Reads the lowest score in a sorted set.
    ZOldestScore {
        /// Sorted-set key.
        key: String,
    },
}

/// Reply to one pipelined command, in submission order.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreReply {
    /// Absent value.
    Nil,
    /// Integer reply (counts, counters, flags).
    Integer(i64),
    /// Floating point reply (scores).
    Float(f64),
    /// String reply.
    Text(String),
    /// Acknowledgement without payload.
    Status,
}

impl StoreReply {
    /// Returns the integer payload, if any.
    #[must_use]
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Self::Integer(value) => Some(*value),
            _ => None,
        }
    }

    /// Returns the float payload, if any.
    #[must_use]
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(value) => Some(*value),
            Self::Integer(value) => Some(*value as f64),
            _ => None,
        }
    }
}

/// Fail-open key-value store shared by every service instance.
#[async_trait]
pub trait KeyedStore: Send + Sync {
    /// Reports whether the last interaction with the store succeeded.
    fn is_available(&self) -> bool;

    /// Reads a string value. Returns `None` when absent or unavailable.
    async fn get(&self, key: &str) -> Option<String>;

    /// Writes a string value. Returns `false` when unavailable.
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> bool;

    /// Deletes a key and returns how many keys were removed.
    async fn del(&self, key: &str) -> u64;

    /// Returns whether a key exists.
    async fn exists(&self, key: &str) -> bool;

    /// Atomically writes `value` only when `key` is absent.
    ///
    /// Returns `true` when this caller now holds the key.
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> bool;

    /// Deletes `key` only when it still holds `token`.
    async fn release_if_held(&self, key: &str, token: &str) -> bool;

    /// Atomically increments a counter and returns the new value, or `0`.
    async fn increment_counter(&self, key: &str) -> i64;

    /// Lists keys matching a glob pattern.
    ///
    /// This walks the whole keyspace and is only acceptable at low key
    /// cardinality.
    async fn keys_matching(&self, pattern: &str) -> Vec<String>;

    /// Sends several commands in one round trip.
    ///
    /// Commands are applied in submission order but not as a transaction.
    /// Returns `None` when the batch could not be delivered.
    async fn pipeline(&self, commands: Vec<StoreCommand>) -> Option<Vec<StoreReply>>;
}
