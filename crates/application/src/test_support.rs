//! Hand-written fakes shared by the unit tests of this crate.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use catalog_core::{AppError, AppResult};
use catalog_domain::{ProductCreated, ProductDeleted, ProductUpdated};
use chrono::{DateTime, TimeZone, Utc};

use crate::clock::Clock;
use crate::event_ports::{EventPublisher, OutboundMessage};
use crate::keyed_store_ports::{KeyedStore, StoreCommand, StoreReply};
use crate::realtime_ports::RealtimeNotifier;

/// String-only keyed store with an outage switch and scripted pipelines.
#[derive(Default)]
pub(crate) struct FakeKeyedStore {
    entries: Mutex<HashMap<String, String>>,
    unavailable: AtomicBool,
    pipeline_replies: Mutex<Option<Vec<StoreReply>>>,
    pipelines: Mutex<Vec<Vec<StoreCommand>>>,
    populated_before_lock: Mutex<Option<(String, String)>>,
}

impl FakeKeyedStore {
    pub(crate) fn set_available(&self, available: bool) {
        self.unavailable.store(!available, Ordering::SeqCst);
    }

    pub(crate) fn script_pipeline(&self, replies: Option<Vec<StoreReply>>) {
        if let Ok(mut scripted) = self.pipeline_replies.lock() {
            *scripted = replies;
        }
    }

    /// Writes `key` just before the next lock acquisition, as a concurrent
    /// owner finishing its population would.
    pub(crate) fn populate_before_next_lock(&self, key: &str, value: &str) {
        if let Ok(mut pending) = self.populated_before_lock.lock() {
            *pending = Some((key.to_owned(), value.to_owned()));
        }
    }

    pub(crate) fn entry(&self, key: &str) -> Option<String> {
        self.entries
            .lock()
            .ok()
            .and_then(|entries| entries.get(key).cloned())
    }

    pub(crate) fn insert(&self, key: &str, value: &str) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(key.to_owned(), value.to_owned());
        }
    }

    pub(crate) fn pipelines(&self) -> Vec<Vec<StoreCommand>> {
        self.pipelines
            .lock()
            .map(|pipelines| pipelines.clone())
            .unwrap_or_default()
    }

    fn down(&self) -> bool {
        self.unavailable.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl KeyedStore for FakeKeyedStore {
    fn is_available(&self) -> bool {
        !self.down()
    }

    async fn get(&self, key: &str) -> Option<String> {
        if self.down() {
            return None;
        }
        self.entry(key)
    }

    async fn set(&self, key: &str, value: &str, _ttl: Option<Duration>) -> bool {
        if self.down() {
            return false;
        }
        self.insert(key, value);
        true
    }

    async fn del(&self, key: &str) -> u64 {
        if self.down() {
            return 0;
        }
        self.entries
            .lock()
            .ok()
            .and_then(|mut entries| entries.remove(key))
            .map_or(0, |_| 1)
    }

    async fn exists(&self, key: &str) -> bool {
        !self.down() && self.entry(key).is_some()
    }

    async fn set_if_absent(&self, key: &str, value: &str, _ttl: Duration) -> bool {
        if self.down() {
            return false;
        }
        let populated = self
            .populated_before_lock
            .lock()
            .ok()
            .and_then(|mut pending| pending.take());
        let Ok(mut entries) = self.entries.lock() else {
            return false;
        };
        if let Some((populated_key, value)) = populated {
            entries.insert(populated_key, value);
        }
        if entries.contains_key(key) {
            return false;
        }
        entries.insert(key.to_owned(), value.to_owned());
        true
    }

    async fn release_if_held(&self, key: &str, token: &str) -> bool {
        if self.down() {
            return false;
        }
        let Ok(mut entries) = self.entries.lock() else {
            return false;
        };
        if entries.get(key).map(String::as_str) == Some(token) {
            entries.remove(key);
            return true;
        }
        false
    }

    async fn increment_counter(&self, key: &str) -> i64 {
        if self.down() {
            return 0;
        }
        let Ok(mut entries) = self.entries.lock() else {
            return 0;
        };
        let next = entries
            .get(key)
            .and_then(|value| value.parse::<i64>().ok())
            .unwrap_or(0)
            + 1;
        entries.insert(key.to_owned(), next.to_string());
        next
    }

    async fn keys_matching(&self, pattern: &str) -> Vec<String> {
        if self.down() {
            return Vec::new();
        }
        let prefix = pattern.trim_end_matches('*');
        self.entries
            .lock()
            .map(|entries| {
                entries
                    .keys()
                    .filter(|key| key.starts_with(prefix))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    async fn pipeline(&self, commands: Vec<StoreCommand>) -> Option<Vec<StoreReply>> {
        if self.down() {
            return None;
        }
        if let Ok(mut pipelines) = self.pipelines.lock() {
            pipelines.push(commands);
        }
        self.pipeline_replies
            .lock()
            .ok()
            .and_then(|replies| replies.clone())
    }
}

/// Clock that only moves when told to.
pub(crate) struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub(crate) fn at_epoch_millis(millis: i64) -> Self {
        Self {
            now: Mutex::new(Utc.timestamp_millis_opt(millis).single().unwrap_or_default()),
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        self.now.lock().map(|now| *now).unwrap_or_default()
    }
}

/// Publisher recording every message, with per-topic failure injection.
#[derive(Default)]
pub(crate) struct RecordingPublisher {
    published: Mutex<Vec<OutboundMessage>>,
    failing_topics: Mutex<HashSet<String>>,
    failing_connects: AtomicUsize,
    connect_calls: AtomicUsize,
}

impl RecordingPublisher {
    pub(crate) fn fail_topic(&self, topic: &str) {
        if let Ok(mut topics) = self.failing_topics.lock() {
            topics.insert(topic.to_owned());
        }
    }

    pub(crate) fn fail_next_connects(&self, count: usize) {
        self.failing_connects.store(count, Ordering::SeqCst);
    }

    pub(crate) fn connect_calls(&self) -> usize {
        self.connect_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn published(&self) -> Vec<OutboundMessage> {
        self.published
            .lock()
            .map(|published| published.clone())
            .unwrap_or_default()
    }

    pub(crate) fn published_on(&self, topic: &str) -> Vec<OutboundMessage> {
        self.published()
            .into_iter()
            .filter(|message| message.topic == topic)
            .collect()
    }
}

#[async_trait]
impl EventPublisher for RecordingPublisher {
    async fn connect(&self) -> AppResult<()> {
        self.connect_calls.fetch_add(1, Ordering::SeqCst);
        let remaining = self.failing_connects.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failing_connects.store(remaining - 1, Ordering::SeqCst);
            return Err(AppError::Unavailable("broker refused connection".to_owned()));
        }
        Ok(())
    }

    async fn publish(&self, message: OutboundMessage) -> AppResult<()> {
        let failing = self
            .failing_topics
            .lock()
            .map(|topics| topics.contains(&message.topic))
            .unwrap_or(false);
        if failing {
            return Err(AppError::Unavailable(format!(
                "broker rejected message on '{}'",
                message.topic
            )));
        }

        self.published
            .lock()
            .map_err(|error| AppError::Internal(format!("failed to lock publisher state: {error}")))?
            .push(message);
        Ok(())
    }
}

/// Notifier counting notifications, optionally failing them all.
#[derive(Default)]
pub(crate) struct RecordingNotifier {
    pub(crate) created: AtomicUsize,
    pub(crate) updated: AtomicUsize,
    pub(crate) deleted: AtomicUsize,
    pub(crate) failing: AtomicBool,
}

impl RecordingNotifier {
    fn outcome(&self) -> AppResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(AppError::Unavailable("no realtime gateway".to_owned()));
        }
        Ok(())
    }
}

#[async_trait]
impl RealtimeNotifier for RecordingNotifier {
    async fn notify_product_created(&self, _event: &ProductCreated) -> AppResult<()> {
        self.created.fetch_add(1, Ordering::SeqCst);
        self.outcome()
    }

    async fn notify_product_updated(&self, _event: &ProductUpdated) -> AppResult<()> {
        self.updated.fetch_add(1, Ordering::SeqCst);
        self.outcome()
    }

    async fn notify_product_deleted(&self, _event: &ProductDeleted) -> AppResult<()> {
        self.deleted.fetch_add(1, Ordering::SeqCst);
        self.outcome()
    }
}

pub(crate) fn category(value: &str) -> catalog_domain::CategoryId {
    let category = catalog_domain::CategoryId::new(value);
    assert!(category.is_ok());
    category.unwrap_or_else(|_| unreachable!())
}

pub(crate) fn sample_product(category_id: &str) -> catalog_domain::Product {
    let now = Utc::now();
    catalog_domain::Product {
        id: catalog_domain::ProductId::new(),
        name: "Desk Lamp".to_owned(),
        description: Some("Warm light".to_owned()),
        price: 39.5,
        category_id: category(category_id),
        version: 1,
        created_at: now,
        updated_at: now,
    }
}
