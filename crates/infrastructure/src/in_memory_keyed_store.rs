//! Process-local keyed store for development and tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use catalog_application::{KeyedStore, StoreCommand, StoreReply};
use tokio::sync::Mutex;

#[derive(Debug, Clone)]
enum StoredValue {
    Text(String),
    SortedSet(Vec<(f64, String)>),
}

#[derive(Debug, Clone)]
struct Entry {
    value: StoredValue,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|expires_at| expires_at > now)
    }
}

/// Writes between full sweeps of expired entries.
const SWEEP_EVERY_WRITES: u32 = 64;

#[derive(Debug, Default)]
struct Keyspace {
    entries: HashMap<String, Entry>,
    writes_since_sweep: u32,
}

impl Keyspace {
    /// Drops expired entries once every [`SWEEP_EVERY_WRITES`] writes so keys
    /// that are never read again do not accumulate.
    fn record_write(&mut self) {
        self.writes_since_sweep += 1;
        if self.writes_since_sweep < SWEEP_EVERY_WRITES {
            return;
        }
        self.writes_since_sweep = 0;
        let now = Instant::now();
        self.entries.retain(|_, entry| entry.is_live(now));
    }

    fn live(&mut self, key: &str) -> Option<&mut Entry> {
        let now = Instant::now();
        if self.entries.get(key).is_some_and(|entry| !entry.is_live(now)) {
            self.entries.remove(key);
        }
        self.entries.get_mut(key)
    }

    fn text(&mut self, key: &str) -> Option<String> {
        match self.live(key).map(|entry| &entry.value) {
            Some(StoredValue::Text(value)) => Some(value.clone()),
            _ => None,
        }
    }

    fn sorted_set(&mut self, key: &str) -> Option<&mut Vec<(f64, String)>> {
        match self.live(key).map(|entry| &mut entry.value) {
            Some(StoredValue::SortedSet(members)) => Some(members),
            _ => None,
        }
    }

    fn put_text(&mut self, key: &str, value: &str, ttl: Option<Duration>) {
        self.entries.insert(
            key.to_owned(),
            Entry {
                value: StoredValue::Text(value.to_owned()),
                expires_at: ttl.map(|ttl| Instant::now() + ttl),
            },
        );
    }

    fn apply(&mut self, command: StoreCommand) -> StoreReply {
        if is_write(&command) {
            self.record_write();
        }

        match command {
            StoreCommand::Get { key } => self.text(&key).map_or(StoreReply::Nil, StoreReply::Text),
            StoreCommand::Set { key, value, ttl } => {
                self.put_text(&key, &value, ttl);
                StoreReply::Status
            }
            StoreCommand::Del { key } => {
                let removed = self.live(&key).is_some();
                self.entries.remove(&key);
                StoreReply::Integer(i64::from(removed))
            }
            StoreCommand::Exists { key } => StoreReply::Integer(i64::from(self.live(&key).is_some())),
            StoreCommand::Incr { key } => {
                let next = self
                    .text(&key)
                    .and_then(|value| value.parse::<i64>().ok())
                    .unwrap_or(0)
                    + 1;
                let expires_at = self.live(&key).and_then(|entry| entry.expires_at);
                self.entries.insert(
                    key,
                    Entry {
                        value: StoredValue::Text(next.to_string()),
                        expires_at,
                    },
                );
                StoreReply::Integer(next)
            }
            StoreCommand::PExpire { key, ttl } => match self.live(&key) {
                Some(entry) => {
                    entry.expires_at = Some(Instant::now() + ttl);
                    StoreReply::Integer(1)
                }
                None => StoreReply::Integer(0),
            },
            StoreCommand::ZRemRangeByScore { key, min, max } => {
                let Some(members) = self.sorted_set(&key) else {
                    return StoreReply::Integer(0);
                };
                let before = members.len();
                members.retain(|(score, _)| *score < min || *score > max);
                let removed = before - members.len();
                if members.is_empty() {
                    self.entries.remove(&key);
                }
                StoreReply::Integer(i64::try_from(removed).unwrap_or(i64::MAX))
            }
            StoreCommand::ZCard { key } => StoreReply::Integer(
                self.sorted_set(&key)
                    .map_or(0, |members| i64::try_from(members.len()).unwrap_or(i64::MAX)),
            ),
            StoreCommand::ZAdd { key, score, member } => {
                if self.sorted_set(&key).is_none() {
                    self.entries.insert(
                        key.clone(),
                        Entry {
                            value: StoredValue::SortedSet(Vec::new()),
                            expires_at: None,
                        },
                    );
                }
                let Some(members) = self.sorted_set(&key) else {
                    return StoreReply::Integer(0);
                };
                let added = match members.iter_mut().find(|(_, existing)| *existing == member) {
                    Some(existing) => {
                        existing.0 = score;
                        0
                    }
                    None => {
                        members.push((score, member));
                        1
                    }
                };
                members.sort_by(|left, right| {
                    left.0.total_cmp(&right.0).then_with(|| left.1.cmp(&right.1))
                });
                StoreReply::Integer(added)
            }
            StoreCommand::ZOldestScore { key } => self
                .sorted_set(&key)
                .and_then(|members| members.first().map(|(score, _)| *score))
                .map_or(StoreReply::Nil, StoreReply::Float),
        }
    }
}

fn is_write(command: &StoreCommand) -> bool {
    matches!(
        command,
        StoreCommand::Set { .. }
            | StoreCommand::Del { .. }
            | StoreCommand::Incr { .. }
            | StoreCommand::PExpire { .. }
            | StoreCommand::ZRemRangeByScore { .. }
            | StoreCommand::ZAdd { .. }
    )
}

/// In-memory keyed store with an availability switch.
pub struct InMemoryKeyedStore {
    keyspace: Mutex<Keyspace>,
    available: AtomicBool,
}

impl Default for InMemoryKeyedStore {
    fn default() -> Self {
        Self {
            keyspace: Mutex::new(Keyspace::default()),
            available: AtomicBool::new(true),
        }
    }
}

impl InMemoryKeyedStore {
    /// Creates an empty, available store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulates losing or regaining the backing store.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    async fn apply(&self, command: StoreCommand) -> Option<StoreReply> {
        if !self.is_available() {
            return None;
        }
        Some(self.keyspace.lock().await.apply(command))
    }
}

#[async_trait]
impl KeyedStore for InMemoryKeyedStore {
    fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    async fn get(&self, key: &str) -> Option<String> {
        match self.apply(StoreCommand::Get { key: key.to_owned() }).await {
            Some(StoreReply::Text(value)) => Some(value),
            _ => None,
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> bool {
        self.apply(StoreCommand::Set {
            key: key.to_owned(),
            value: value.to_owned(),
            ttl,
        })
        .await
        .is_some()
    }

    async fn del(&self, key: &str) -> u64 {
        self.apply(StoreCommand::Del { key: key.to_owned() })
            .await
            .and_then(|reply| reply.as_integer())
            .map_or(0, |removed| u64::try_from(removed).unwrap_or(0))
    }

    async fn exists(&self, key: &str) -> bool {
        self.apply(StoreCommand::Exists { key: key.to_owned() })
            .await
            .and_then(|reply| reply.as_integer())
            == Some(1)
    }

    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> bool {
        if !self.is_available() {
            return false;
        }

        let mut keyspace = self.keyspace.lock().await;
        if keyspace.live(key).is_some() {
            return false;
        }
        keyspace.record_write();
        keyspace.put_text(key, value, Some(ttl));
        true
    }

    async fn release_if_held(&self, key: &str, token: &str) -> bool {
        if !self.is_available() {
            return false;
        }

        let mut keyspace = self.keyspace.lock().await;
        if keyspace.text(key).as_deref() != Some(token) {
            return false;
        }
        keyspace.entries.remove(key);
        true
    }

    async fn increment_counter(&self, key: &str) -> i64 {
        self.apply(StoreCommand::Incr { key: key.to_owned() })
            .await
            .and_then(|reply| reply.as_integer())
            .unwrap_or(0)
    }

    async fn keys_matching(&self, pattern: &str) -> Vec<String> {
        if !self.is_available() {
            return Vec::new();
        }

        let now = Instant::now();
        let keyspace = self.keyspace.lock().await;
        let mut keys = keyspace
            .entries
            .iter()
            .filter(|(key, entry)| entry.is_live(now) && glob_matches(pattern, key))
            .map(|(key, _)| key.clone())
            .collect::<Vec<_>>();
        keys.sort();
        keys
    }

    async fn pipeline(&self, commands: Vec<StoreCommand>) -> Option<Vec<StoreReply>> {
        if !self.is_available() {
            return None;
        }

        let mut keyspace = self.keyspace.lock().await;
        Some(
            commands
                .into_iter()
                .map(|command| keyspace.apply(command))
                .collect(),
        )
    }
}

/// Matches `*` and `?` wildcards the way the store's `MATCH` option does.
fn glob_matches(pattern: &str, candidate: &str) -> bool {
    let pattern = pattern.chars().collect::<Vec<_>>();
    let candidate = candidate.chars().collect::<Vec<_>>();
    let (mut p, mut c) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;

    while c < candidate.len() {
        match pattern.get(p) {
            Some('*') => {
                backtrack = Some((p, c));
                p += 1;
            }
            Some('?') => {
                p += 1;
                c += 1;
            }
            Some(expected) if *expected == candidate[c] => {
                p += 1;
                c += 1;
            }
            _ => match backtrack {
                Some((star, matched)) => {
                    p = star + 1;
                    c = matched + 1;
                    backtrack = Some((star, matched + 1));
                }
                None => return false,
            },
        }
    }

    pattern[p..].iter().all(|remaining| *remaining == '*')
}
