use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use usagewatch_core::UsageSettings;

/// Command line arguments
#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Watch an agent CLI's plan usage and report when work should pause"
)]
pub struct Config {
    /// Enable debug mode
    #[arg(short, long, global = true)]
    pub debug: bool,

    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Command that prints the usage screen (e.g. "claude /usage")
    #[arg(long = "command", global = true)]
    pub usage_command: Option<String>,

    /// Pause threshold in percent
    #[arg(short, long, global = true)]
    pub threshold: Option<f64>,

    /// Subcommand (defaults to `check`)
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Subcommands
#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Run one usage check and print the result
    Check {
        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },
    /// Check usage periodically until interrupted
    Watch {
        /// Seconds between checks
        #[arg(short, long)]
        interval: Option<u64>,
    },
}

impl Default for Command {
    fn default() -> Self {
        Self::Check { json: false }
    }
}

impl Config {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Watch interval given on the command line, if any
    pub fn watch_interval(&self) -> Option<u64> {
        match &self.command {
            Some(Command::Watch { interval }) => *interval,
            _ => None,
        }
    }
}

/// Application settings (from config file)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Usage command, cache and threshold
    #[serde(default)]
    pub usage: UsageSettings,

    /// Watch loop settings
    #[serde(default)]
    pub watch: WatchSettings,
}

/// Watch loop settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatchSettings {
    /// Seconds between checks
    #[serde(default = "default_watch_interval")]
    pub interval_secs: u64,
}

fn default_watch_interval() -> u64 {
    300
}

impl Default for WatchSettings {
    fn default() -> Self {
        Self {
            interval_secs: default_watch_interval(),
        }
    }
}

impl Settings {
    /// Load settings from config file or use defaults
    pub fn load(path: Option<&PathBuf>) -> Result<Self> {
        // Try custom path first
        if let Some(p) = path {
            if p.exists() {
                return Self::read(p);
            }
        }

        // Try default config locations
        let default_paths = [
            dirs::config_dir().map(|p| p.join("usagewatch/config.toml")),
            dirs::home_dir().map(|p| p.join(".config/usagewatch/config.toml")),
            dirs::home_dir().map(|p| p.join(".usagewatch.toml")),
        ];

        for path in default_paths.iter().flatten() {
            if path.exists() {
                return Self::read(path);
            }
        }

        // Return defaults if no config file found
        Ok(Self::default())
    }

    fn read(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }

    /// Merge CLI config into settings (CLI takes precedence)
    pub fn merge_cli(&mut self, cli: &Config) {
        if let Some(command) = &cli.usage_command {
            self.usage.command = command.clone();
        }
        if let Some(threshold) = cli.threshold {
            self.usage.threshold_percent = threshold;
        }
        if let Some(interval) = cli.watch_interval() {
            self.watch.interval_secs = interval;
        }
    }

    /// Validate and normalize settings values
    ///
    /// Keeps the watch interval at one second or more.
    pub fn validate(&mut self) {
        const MIN_WATCH_INTERVAL: u64 = 1;

        self.usage.validate();
        if self.watch.interval_secs < MIN_WATCH_INTERVAL {
            self.watch.interval_secs = MIN_WATCH_INTERVAL;
        }
    }
}
