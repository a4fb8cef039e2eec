//! Usage checker: run the command, parse its screen, cache and report.

mod log_policy;


use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::Mutex;
use thiserror::Error;
use tracing::{debug, error, info, warn};

pub use log_policy::SnapshotLogPolicy;

use super::parser::parse_usage;
use super::reset::parse_reset_time;
use super::sanitize::clean_output;
use super::timezone::resolve_timezone;
use super::types::{CacheEntry, PauseDecision, UsageSnapshot};
use crate::config::UsageSettings;
use crate::exec::{CommandExecutor, SystemExecutor};

/// Source of the current time
pub trait Clock: Send {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Faults that are not part of normal degradation and reach the caller
#[derive(Debug, Error)]
pub enum UsageError {
    /// The usage command could not be started or supervised
    #[error("usage command failed: {0}")]
    Command(#[from] anyhow::Error),
}

/// Checker shared between tasks; the lock covers a whole check cycle
pub type SharedUsageChecker = Arc<Mutex<UsageChecker>>;

/// Runs the usage command and answers whether work should pause.
///
/// Owns the cache, the last logged snapshot and the last timezone label seen
/// in the output. Checks are expected to run one at a time.
pub struct UsageChecker<E = SystemExecutor, C = SystemClock> {
    command: String,
    cache_duration: TimeDelta,
    executor: E,
    clock: C,
    cache: Option<CacheEntry>,
    log_policy: SnapshotLogPolicy,
    timezone_label: Option<String>,
}

impl UsageChecker {
    /// Create a checker that runs commands on this system
    pub fn new(settings: &UsageSettings) -> Self {
        Self::with_parts(
            settings,
            SystemExecutor::new(settings.capture_timeout()),
            SystemClock,
        )
    }

    /// Create a checker wrapped for sharing across tasks
    pub fn shared(settings: &UsageSettings) -> SharedUsageChecker {
        Arc::new(Mutex::new(Self::new(settings)))
    }
}

impl<E: CommandExecutor, C: Clock> UsageChecker<E, C> {
    /// Create a checker with a custom executor and clock
    pub fn with_parts(settings: &UsageSettings, executor: E, clock: C) -> Self {
        let cache_duration = TimeDelta::from_std(settings.cache_duration())
            .unwrap_or_else(|_| TimeDelta::seconds(60));
        Self {
            command: settings.command.clone(),
            cache_duration,
            executor,
            clock,
            cache: None,
            log_policy: SnapshotLogPolicy::new(),
            timezone_label: None,
        }
    }

    /// Current cache entry, fresh or not
    pub fn cached(&self) -> Option<&CacheEntry> {
        self.cache.as_ref()
    }

    /// Timezone label from the most recent reset time that carried one
    pub fn timezone_label(&self) -> Option<&str> {
        self.timezone_label.as_deref()
    }

    /// Current usage percentage and reset instant.
    ///
    /// Served from the cache while it is fresh. Invalid commands, empty
    /// output and unparseable output fall back to the cached snapshot (or
    /// 0% with no reset). Only faults running the command are returned as
    /// errors.
    pub fn get_usage(&mut self) -> Result<UsageSnapshot, UsageError> {
        let now = self.clock.now();
        if let Some(entry) = self.cache.filter(|e| e.is_fresh(now, self.cache_duration)) {
            debug!(age_seconds = entry.age(now).num_seconds(), "usage.cache.hit");
            return Ok(entry.snapshot);
        }

        let args = match shell_words::split(&self.command) {
            Ok(args) if !args.is_empty() => args,
            Ok(_) => {
                error!(command = %self.command, error = "empty command", "usage.command.invalid");
                return Ok(self.fallback_usage());
            }
            Err(e) => {
                error!(command = %self.command, error = %e, "usage.command.invalid");
                return Ok(self.fallback_usage());
            }
        };

        let output = match self.executor.execute(&args) {
            Ok(output) => output,
            Err(e) => {
                error!(error = %e, "usage.command.exception");
                return Err(UsageError::Command(e));
            }
        };
        let cleaned = clean_output(&output.text);

        if !output.status.is_accepted() {
            let return_code = output.status.return_code();
            if cleaned.is_empty() {
                error!(return_code, "usage.command.failed");
            } else {
                warn!(return_code, "usage.command.nonzero_exit");
            }
        }

        if cleaned.is_empty() {
            warn!("usage.command.empty_output");
            return Ok(self.fallback_usage());
        }

        let percent = match parse_usage(&cleaned) {
            Ok(percent) => percent,
            Err(e) => {
                warn!(error = %e, "usage.parse_failed");
                return Ok(self.fallback_usage());
            }
        };

        let now = self.clock.now();
        let reset = parse_reset_time(&cleaned, now);
        let reset_at = reset.as_ref().map(|r| r.at);
        if let Some(label) = reset.and_then(|r| r.timezone_label) {
            self.timezone_label = Some(label);
        }

        let snapshot = UsageSnapshot { percent, reset_at };
        self.cache = Some(CacheEntry {
            snapshot,
            captured_at: now,
        });

        if self.log_policy.should_log(&snapshot) {
            info!(
                usage_percent = percent,
                reset = %reset_label(reset_at, self.timezone_label.as_deref()),
                "usage.snapshot"
            );
        }

        Ok(snapshot)
    }

    /// Whether usage has reached `threshold_percent`, with the reset instant.
    ///
    /// Fails open: any error while checking yields "do not pause".
    pub fn check_should_pause(&mut self, threshold_percent: f64) -> PauseDecision {
        self.check_usage(threshold_percent).1
    }

    /// Same decision as [`Self::check_should_pause`], together with the
    /// snapshot it was based on. The snapshot is `None` when the check failed
    /// and the decision is the fail-open default.
    pub fn check_usage(
        &mut self,
        threshold_percent: f64,
    ) -> (Option<UsageSnapshot>, PauseDecision) {
        match self.get_usage() {
            Ok(snapshot) => {
                let should_pause = snapshot.percent >= threshold_percent;
                if should_pause {
                    warn!(
                        usage_percent = snapshot.percent,
                        threshold_percent, "usage.threshold.exceeded"
                    );
                }
                let decision = PauseDecision {
                    should_pause,
                    reset_at: snapshot.reset_at,
                };
                (Some(snapshot), decision)
            }
            Err(e) => {
                error!(error = %e, "usage.threshold.error");
                (None, PauseDecision::proceed())
            }
        }
    }

    /// Cached snapshot if there is one, otherwise 0% with no reset.
    ///
    /// The default is cached too, so repeated failures inside the cache
    /// window do not rerun the command.
    fn fallback_usage(&mut self) -> UsageSnapshot {
        if let Some(entry) = &self.cache {
            debug!("usage.cache.fallback");
            return entry.snapshot;
        }

        let snapshot = UsageSnapshot::unknown();
        self.cache = Some(CacheEntry {
            snapshot,
            captured_at: self.clock.now(),
        });
        info!("usage.fallback.default");
        snapshot
    }
}

/// Human readable reset time for logs.
///
/// `"02:59am (America/New_York)"` when the label resolves, the UTC
/// time of day otherwise, `"unknown"` without a reset instant.
pub fn reset_label(reset_at: Option<DateTime<Utc>>, timezone_label: Option<&str>) -> String {
    let Some(reset_at) = reset_at else {
        return "unknown".to_string();
    };

    let zoned = timezone_label.and_then(|label| Some((label, resolve_timezone(Some(label))?)));
    match zoned {
        Some((label, tz)) => {
            let local = tz.local_time(reset_at).format("%I:%M%p").to_string();
            format!("{} ({})", local.to_lowercase(), label)
        }
        None => reset_at.format("%H:%M:%S").to_string(),
    }
}
