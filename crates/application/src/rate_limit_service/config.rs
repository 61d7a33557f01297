use std::time::Duration;

use catalog_core::{AppError, AppResult};
use chrono::{DateTime, Utc};

/// Admission rule attached to an operation at configuration time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitRule {
    key_prefix: String,
    max_requests: u32,
    window: Duration,
}

impl RateLimitRule {
    /// Creates a rule admitting `max_requests` per `window` for each identifier.
    pub fn new(
        key_prefix: impl Into<String>,
        max_requests: u32,
        window: Duration,
    ) -> AppResult<Self> {
        if max_requests == 0 {
            return Err(AppError::Validation(
                "rate limit max_requests must be at least 1".to_owned(),
            ));
        }

        if window.as_millis() == 0 {
            return Err(AppError::Validation(
                "rate limit window must be at least one millisecond".to_owned(),
            ));
        }

        Ok(Self {
            key_prefix: key_prefix.into(),
            max_requests,
            window,
        })
    }

    /// Returns the key prefix.
    #[must_use]
    pub fn key_prefix(&self) -> &str {
        self.key_prefix.as_str()
    }

    /// Returns the number of admitted requests per window.
    #[must_use]
    pub fn max_requests(&self) -> u32 {
        self.max_requests
    }

    /// Returns the window length.
    #[must_use]
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Returns the window length in milliseconds.
    #[must_use]
    pub fn window_ms(&self) -> i64 {
        i64::try_from(self.window.as_millis()).unwrap_or(i64::MAX)
    }

    /// Returns the store key tracking `identifier`.
    #[must_use]
    pub fn key_for(&self, identifier: &str) -> String {
        format!("{}{identifier}", self.key_prefix)
    }
}

/// Outcome of one admission check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitDecision {
    /// Whether the attempt is admitted.
    pub allowed: bool,
    /// Attempts left in the current window.
    pub remaining: u32,
    /// When the oldest attempt in the window expires.
    pub reset_at: DateTime<Utc>,
    /// Admitted requests per window.
    pub total: u32,
    /// Window length.
    pub window: Duration,
    /// Whole seconds until `reset_at`, rounded up.
    pub retry_after_seconds: u64,
}

impl RateLimitDecision {
    pub(super) fn evaluate(
        rule: &RateLimitRule,
        count_before_insert: i64,
        oldest_marker_ms: Option<i64>,
        now: DateTime<Utc>,
    ) -> Self {
        let now_ms = now.timestamp_millis();
        let requests_in_window = count_before_insert.max(0).saturating_add(1);
        let max_requests = i64::from(rule.max_requests);
        let remaining = u32::try_from((max_requests - requests_in_window).max(0)).unwrap_or(0);
        let reset_at_ms = oldest_marker_ms
            .unwrap_or(now_ms)
            .saturating_add(rule.window_ms())
            .max(now_ms);

        Self {
            allowed: requests_in_window <= max_requests,
            remaining,
            reset_at: millis_to_datetime(reset_at_ms, now),
            total: rule.max_requests,
            window: rule.window,
            retry_after_seconds: retry_after_seconds(reset_at_ms - now_ms),
        }
    }

    pub(super) fn fail_open(rule: &RateLimitRule, now: DateTime<Utc>) -> Self {
        let reset_at_ms = now.timestamp_millis().saturating_add(rule.window_ms());

        Self {
            allowed: true,
            remaining: rule.max_requests,
            reset_at: millis_to_datetime(reset_at_ms, now),
            total: rule.max_requests,
            window: rule.window,
            retry_after_seconds: 0,
        }
    }

    /// Returns the reset time as Unix epoch seconds.
    #[must_use]
    pub fn reset_epoch_seconds(&self) -> i64 {
        self.reset_at.timestamp()
    }
}

fn millis_to_datetime(value: i64, fallback: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp_millis(value).unwrap_or(fallback)
}

fn retry_after_seconds(delta_ms: i64) -> u64 {
    let delta_ms = u64::try_from(delta_ms.max(0)).unwrap_or(0);
    delta_ms.div_ceil(1000)
}
