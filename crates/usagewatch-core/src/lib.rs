//! Core library for usagewatch.
//!
//! Runs a usage command (PTY first, plain pipes as fallback), cleans the
//! captured screen, extracts the usage percentage and reset instant, and
//! answers whether work should pause.

pub mod config;
pub mod exec;
pub mod usage;

#[cfg(test)]
pub(crate) mod test_support;

pub use config::UsageSettings;
pub use exec::{CommandExecutor, CommandOutput, ExitStatus, SystemExecutor};
pub use usage::{
    reset_label, Clock, PauseDecision, SharedUsageChecker, SystemClock, UsageChecker, UsageError,
    UsageSnapshot,
};
