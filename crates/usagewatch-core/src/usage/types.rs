//! Usage data produced by a check cycle.

use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;

/// Result of one successful check: how much of the quota is used and when it resets
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct UsageSnapshot {
    /// Percentage used (0-100)
    pub percent: f64,
    /// When the quota replenishes, if the output said so
    pub reset_at: Option<DateTime<Utc>>,
}

impl UsageSnapshot {
    /// Snapshot used when nothing better is known: 0% and no reset time
    pub const fn unknown() -> Self {
        Self {
            percent: 0.0,
            reset_at: None,
        }
    }
}

/// A cached snapshot and the time it was captured
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CacheEntry {
    pub snapshot: UsageSnapshot,
    pub captured_at: DateTime<Utc>,
}

impl CacheEntry {
    /// Age of the entry at `now`
    pub fn age(&self, now: DateTime<Utc>) -> TimeDelta {
        now - self.captured_at
    }

    /// Whether the entry is still younger than `ttl`
    pub fn is_fresh(&self, now: DateTime<Utc>, ttl: TimeDelta) -> bool {
        self.age(now) < ttl
    }
}

/// Answer to "should work pause now?"
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PauseDecision {
    pub should_pause: bool,
    pub reset_at: Option<DateTime<Utc>>,
}

impl PauseDecision {
    /// Fail-open answer used when the check itself went wrong
    pub const fn proceed() -> Self {
        Self {
            should_pause: false,
            reset_at: None,
        }
    }
}
