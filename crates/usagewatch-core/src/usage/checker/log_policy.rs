//! Decide which snapshots are worth a log line.
//!
//! Usage drifts by fractions of a percent between polls, so a snapshot is
//! only logged when it enters a new decile at or above 50%, when it sits at
//! 80% or more, or when the reset instant moves to a new period.

use crate::usage::types::UsageSnapshot;

/// Usage at which the first observation is logged
const FIRST_LOG_PERCENT: f64 = 50.0;
/// Usage at which every observation is logged
const ALWAYS_LOG_PERCENT: f64 = 80.0;
/// Lowest decile whose crossing is logged
const MILESTONE_FLOOR: i64 = 50;

/// Tracks the last logged snapshot, independent of the usage cache
#[derive(Debug, Default)]
pub struct SnapshotLogPolicy {
    last_logged: Option<UsageSnapshot>,
}

impl SnapshotLogPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot the next decision is compared against
    pub fn last_logged(&self) -> Option<&UsageSnapshot> {
        self.last_logged.as_ref()
    }

    /// Whether `snapshot` should be logged; records it as the new reference when so.
    ///
    /// The very first observation is always recorded, and logged only at 50% or more.
    pub fn should_log(&mut self, snapshot: &UsageSnapshot) -> bool {
        let Some(previous) = self.last_logged else {
            self.last_logged = Some(*snapshot);
            return snapshot.percent >= FIRST_LOG_PERCENT;
        };

        let current_decile = decile(snapshot.percent);
        let crossed_milestone =
            current_decile != decile(previous.percent) && current_decile >= MILESTONE_FLOOR;
        let reset_moved = matches!(
            (previous.reset_at, snapshot.reset_at),
            (Some(prev), Some(next)) if prev != next
        );

        let should_log =
            crossed_milestone || snapshot.percent >= ALWAYS_LOG_PERCENT || reset_moved;
        if should_log {
            self.last_logged = Some(*snapshot);
        }
        should_log
    }
}

/// Multiple-of-ten bucket a percentage falls into
fn decile(percent: f64) -> i64 {
    (percent / 10.0).floor() as i64 * 10
}
