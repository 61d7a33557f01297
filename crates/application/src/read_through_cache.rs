//! Stampede-safe read-through cache.
//!
//! A miss is resolved by whichever caller wins the `{key}:lock` lease; the
//! rest poll the entry with a fixed backoff until it appears. The lease
//! bounds how long a crashed or hung holder can block the key. When the
//! keyed store is unavailable every caller goes straight to the origin.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use catalog_core::AppResult;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::keyed_store_ports::KeyedStore;

#[cfg(test)]
mod tests;

const COMPONENT: &str = "read_through_cache";
const LOCK_SUFFIX: &str = ":lock";

/// Lock lease and wait behaviour for cache population.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CachePolicy {
    /// How long a population lock is held before it expires on its own.
    pub lock_lease: Duration,
    /// Pause between polls while another caller populates the entry.
    pub retry_backoff: Duration,
}

impl CachePolicy {
    /// Returns how many polls a waiting caller performs before giving up.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        let backoff_ms = self.retry_backoff.as_millis().max(1);
        let polls = self.lock_lease.as_millis().div_ceil(backoff_ms);
        u32::try_from(polls).unwrap_or(u32::MAX).saturating_add(1)
    }
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self {
            lock_lease: Duration::from_secs(10),
            retry_backoff: Duration::from_millis(200),
        }
    }
}

/// Time-to-live per cached read model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheTtls {
    /// Single product lookups.
    pub entity: Duration,
    /// Filtered product lists.
    pub list: Duration,
    /// Products of one category.
    pub category_listing: Duration,
    /// Search results.
    pub search: Duration,
}

impl Default for CacheTtls {
    fn default() -> Self {
        Self {
            entity: Duration::from_secs(300),
            list: Duration::from_secs(60),
            category_listing: Duration::from_secs(120),
            search: Duration::from_secs(30),
        }
    }
}

enum Lookup<T> {
    Hit(T),
    Owner { lock_key: String, token: String },
    Bypass,
}

/// Read-through cache guaranteeing one origin fetch per miss.
#[derive(Clone)]
pub struct ReadThroughCache {
    store: Arc<dyn KeyedStore>,
    policy: CachePolicy,
}

impl ReadThroughCache {
    /// Creates a cache over the given store.
    #[must_use]
    pub fn new(store: Arc<dyn KeyedStore>, policy: CachePolicy) -> Self {
        Self { store, policy }
    }

    /// Returns the cached value for `key`, fetching it from the origin on a miss.
    ///
    /// Origin failures are returned to the caller and never cached; the
    /// population lock is released either way.
    pub async fn cached<T, F, Fut>(&self, key: &str, ttl: Duration, fetch: F) -> AppResult<T>
    where
        T: Serialize + DeserializeOwned + Send,
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = AppResult<T>> + Send,
    {
        match self.lookup::<T>(key).await {
            Lookup::Hit(value) => Ok(value),
            Lookup::Bypass => fetch().await,
            Lookup::Owner { lock_key, token } => {
                let result = fetch().await;
                if let Ok(value) = &result {
                    self.put(key, value, ttl).await;
                }

                if !self.store.release_if_held(&lock_key, &token).await {
                    debug!(component = COMPONENT, key, "cache lock was no longer held on release");
                }

                result
            }
        }
    }

    /// Writes a value directly, e.g. to seed an entry after a mutation.
    pub async fn put<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) {
        match serde_json::to_string(value) {
            Ok(encoded) => {
                if !self.store.set(key, &encoded, Some(ttl)).await {
                    debug!(component = COMPONENT, key, "cache write skipped");
                }
            }
            Err(error) => {
                warn!(component = COMPONENT, key, error = %error, "failed to encode cache entry");
            }
        }
    }

    /// Removes one entry.
    pub async fn invalidate(&self, key: &str) {
        self.store.del(key).await;
    }

    /// Removes every entry whose key matches a glob pattern.
    ///
    /// Population locks matching the pattern are left to their holders.
    pub async fn invalidate_pattern(&self, pattern: &str) -> usize {
        let keys = self
            .store
            .keys_matching(pattern)
            .await
            .into_iter()
            .filter(|key| !key.ends_with(LOCK_SUFFIX))
            .collect::<Vec<_>>();
        for key in &keys {
            self.store.del(key).await;
        }

        keys.len()
    }

    async fn read_entry<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let encoded = self.store.get(key).await?;
        match serde_json::from_str::<T>(&encoded) {
            Ok(value) => Some(value),
            Err(error) => {
                warn!(
                    component = COMPONENT,
                    key,
                    error = %error,
                    "discarding undecodable cache entry"
                );
                self.store.del(key).await;
                None
            }
        }
    }

    async fn lookup<T: DeserializeOwned>(&self, key: &str) -> Lookup<T> {
        let lock_key = format!("{key}{LOCK_SUFFIX}");
        let max_attempts = self.policy.max_attempts();

        for attempt in 0..max_attempts {
            if !self.store.is_available() {
                return Lookup::Bypass;
            }

            if let Some(value) = self.read_entry(key).await {
                return Lookup::Hit(value);
            }

            let token = Uuid::new_v4().to_string();
            if self
                .store
                .set_if_absent(&lock_key, &token, self.policy.lock_lease)
                .await
            {
                // A previous owner may have populated the entry and released
                // the lock between our read and the lock acquisition.
                if let Some(value) = self.read_entry(key).await {
                    self.store.release_if_held(&lock_key, &token).await;
                    return Lookup::Hit(value);
                }

                return Lookup::Owner { lock_key, token };
            }

            if !self.store.is_available() {
                return Lookup::Bypass;
            }

            debug!(component = COMPONENT, key, attempt, "cache entry is being populated, waiting");
            tokio::time::sleep(self.policy.retry_backoff).await;
        }

        warn!(
            component = COMPONENT,
            key,
            max_attempts,
            "gave up waiting for cache population, fetching from origin"
        );
        Lookup::Bypass
    }
}
