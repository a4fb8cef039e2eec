//! Usage monitoring: capture and interpret the `/usage` screen.
//!
//! The checker runs the configured command, strips terminal decoration from
//! the captured output, parses a usage percentage and an optional reset
//! instant, and caches the result for a short window.

pub mod checker;
pub mod parser;
pub mod reset;
pub mod sanitize;
pub mod timezone;
pub mod types;

pub use checker::{
    reset_label, Clock, SharedUsageChecker, SystemClock, UsageChecker, UsageError,
};
pub use parser::{parse_usage, ParseError};
pub use reset::{parse_reset_time, ParsedReset};
pub use sanitize::clean_output;
pub use timezone::{resolve_timezone, ResolvedTimezone};
pub use types::{CacheEntry, PauseDecision, UsageSnapshot};
