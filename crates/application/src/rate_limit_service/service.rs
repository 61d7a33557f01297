use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::warn;
use uuid::Uuid;

use crate::clock::{Clock, SystemClock};
use crate::keyed_store_ports::{KeyedStore, StoreCommand, StoreReply};

use super::config::{RateLimitDecision, RateLimitRule};

const COMPONENT: &str = "rate_limiter";
const COMMANDS_PER_IDENTIFIER: usize = 5;
const KEY_EXPIRY_GRACE_MS: u64 = 1_000;

/// Application service for sliding-window rate limiting.
#[derive(Clone)]
pub struct RateLimitService {
    store: Arc<dyn KeyedStore>,
    clock: Arc<dyn Clock>,
}

impl RateLimitService {
    /// Creates a new rate limit service using the system clock.
    #[must_use]
    pub fn new(store: Arc<dyn KeyedStore>) -> Self {
        Self {
            store,
            clock: Arc::new(SystemClock),
        }
    }

    /// Replaces the time source.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Records one attempt for `identifier` and decides whether it is admitted.
    pub async fn check(&self, identifier: &str, rule: &RateLimitRule) -> RateLimitDecision {
        let now = self.clock.now();
        if !self.store.is_available() {
            warn!(component = COMPONENT, identifier, "keyed store unavailable, failing open");
            return RateLimitDecision::fail_open(rule, now);
        }

        let key = rule.key_for(identifier);
        let Some(replies) = self.store.pipeline(attempt_commands(&key, rule, now)).await else {
            warn!(component = COMPONENT, identifier, "rate limit pipeline failed, failing open");
            return RateLimitDecision::fail_open(rule, now);
        };

        match decide(rule, &replies, now) {
            Some(decision) => decision,
            None => {
                warn!(
                    component = COMPONENT,
                    identifier,
                    reply_count = replies.len(),
                    "unexpected rate limit pipeline replies, failing open"
                );
                RateLimitDecision::fail_open(rule, now)
            }
        }
    }

    /// Records one attempt for every identifier in a single round trip.
    ///
    /// Any store failure admits the whole batch.
    pub async fn check_many(
        &self,
        identifiers: &[String],
        rule: &RateLimitRule,
    ) -> HashMap<String, RateLimitDecision> {
        let now = self.clock.now();
        let allow_all = || {
            identifiers
                .iter()
                .map(|identifier| (identifier.clone(), RateLimitDecision::fail_open(rule, now)))
                .collect::<HashMap<_, _>>()
        };

        if identifiers.is_empty() {
            return HashMap::new();
        }

        if !self.store.is_available() {
            warn!(
                component = COMPONENT,
                batch_size = identifiers.len(),
                "keyed store unavailable, failing open for batch"
            );
            return allow_all();
        }

        let commands = identifiers
            .iter()
            .flat_map(|identifier| attempt_commands(&rule.key_for(identifier), rule, now))
            .collect::<Vec<_>>();

        let Some(replies) = self.store.pipeline(commands).await else {
            warn!(
                component = COMPONENT,
                batch_size = identifiers.len(),
                "bulk rate limit pipeline failed, failing open for batch"
            );
            return allow_all();
        };

        if replies.len() != identifiers.len() * COMMANDS_PER_IDENTIFIER {
            warn!(
                component = COMPONENT,
                batch_size = identifiers.len(),
                reply_count = replies.len(),
                "unexpected bulk rate limit pipeline replies, failing open for batch"
            );
            return allow_all();
        }

        let mut decisions = HashMap::with_capacity(identifiers.len());
        for (identifier, chunk) in identifiers
            .iter()
            .zip(replies.chunks(COMMANDS_PER_IDENTIFIER))
        {
            let decision =
                decide(rule, chunk, now).unwrap_or_else(|| RateLimitDecision::fail_open(rule, now));
            decisions.insert(identifier.clone(), decision);
        }

        decisions
    }
}

fn attempt_commands(key: &str, rule: &RateLimitRule, now: DateTime<Utc>) -> Vec<StoreCommand> {
    let now_ms = now.timestamp_millis();
    let window_start_ms = now_ms.saturating_sub(rule.window_ms());
    let expiry = rule.window() + std::time::Duration::from_millis(KEY_EXPIRY_GRACE_MS);

    vec![
        StoreCommand::ZRemRangeByScore {
            key: key.to_owned(),
            min: f64::NEG_INFINITY,
            max: window_start_ms as f64,
        },
        StoreCommand::ZCard {
            key: key.to_owned(),
        },
        StoreCommand::ZAdd {
            key: key.to_owned(),
            score: now_ms as f64,
            member: format!("{now_ms}-{}", Uuid::new_v4()),
        },
        StoreCommand::PExpire {
            key: key.to_owned(),
            ttl: expiry,
        },
        StoreCommand::ZOldestScore {
            key: key.to_owned(),
        },
    ]
}

fn decide(
    rule: &RateLimitRule,
    replies: &[StoreReply],
    now: DateTime<Utc>,
) -> Option<RateLimitDecision> {
    if replies.len() != COMMANDS_PER_IDENTIFIER {
        return None;
    }

    let count_before_insert = replies[1].as_integer()?;
    let oldest_marker_ms = replies[4].as_float().map(|score| score as i64);

    Some(RateLimitDecision::evaluate(
        rule,
        count_before_insert,
        oldest_marker_ms,
        now,
    ))
}
