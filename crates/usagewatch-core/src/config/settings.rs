use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Usage check settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageSettings {
    /// Command that prints the usage screen (shell-style quoting allowed)
    #[serde(default = "default_command")]
    pub command: String,

    /// How long a successful check is reused, in seconds
    #[serde(default = "default_cache_duration")]
    pub cache_duration_secs: u64,

    /// Pause once usage reaches this percentage
    #[serde(default = "default_threshold")]
    pub threshold_percent: f64,

    /// Time the command gets to render its output, in seconds
    #[serde(default = "default_capture_timeout")]
    pub capture_timeout_secs: u64,
}

fn default_command() -> String {
    "claude /usage".to_string()
}

fn default_cache_duration() -> u64 {
    60
}

fn default_threshold() -> f64 {
    85.0
}

fn default_capture_timeout() -> u64 {
    5
}

impl Default for UsageSettings {
    fn default() -> Self {
        Self {
            command: default_command(),
            cache_duration_secs: default_cache_duration(),
            threshold_percent: default_threshold(),
            capture_timeout_secs: default_capture_timeout(),
        }
    }
}

impl UsageSettings {
    pub fn cache_duration(&self) -> Duration {
        Duration::from_secs(self.cache_duration_secs)
    }

    pub fn capture_timeout(&self) -> Duration {
        Duration::from_secs(self.capture_timeout_secs)
    }

    /// Validate and normalize settings values
    ///
    /// Keeps the threshold within `[0, 100]` and timings at one second or more.
    pub fn validate(&mut self) {
        const MIN_SECS: u64 = 1;

        if !self.threshold_percent.is_finite() {
            self.threshold_percent = default_threshold();
        }
        self.threshold_percent = self.threshold_percent.clamp(0.0, 100.0);
        self.cache_duration_secs = self.cache_duration_secs.max(MIN_SECS);
        self.capture_timeout_secs = self.capture_timeout_secs.max(MIN_SECS);
    }
}
