use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;

use usagewatch_core::{reset_label, Clock, CommandExecutor, UsageChecker};

use crate::config::Settings;

/// Outcome of one check cycle, as printed by `check` and logged by `watch`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckReport {
    /// Usage percentage the decision was based on, `None` if the check failed
    pub usage_percent: Option<f64>,
    pub threshold_percent: f64,
    pub should_pause: bool,
    pub reset_at: Option<DateTime<Utc>>,
    /// Reset time as shown to humans
    pub reset: String,
}

impl CheckReport {
    /// Run one check cycle on `checker`
    pub fn collect<E: CommandExecutor, C: Clock>(
        checker: &mut UsageChecker<E, C>,
        threshold_percent: f64,
    ) -> Self {
        let (snapshot, decision) = checker.check_usage(threshold_percent);

        Self {
            usage_percent: snapshot.map(|s| s.percent),
            threshold_percent,
            should_pause: decision.should_pause,
            reset_at: decision.reset_at,
            reset: reset_label(decision.reset_at, checker.timezone_label()),
        }
    }

    /// Plain text rendering for terminals
    pub fn render_text(&self) -> String {
        let usage = self
            .usage_percent
            .map(|p| format!("{:.1}%", p))
            .unwrap_or_else(|| "unknown".to_string());

        format!(
            "usage:     {}\nthreshold: {:.1}%\nreset:     {}\npause:     {}",
            usage,
            self.threshold_percent,
            self.reset,
            if self.should_pause { "yes" } else { "no" }
        )
    }
}

/// Run a single check and print the report to stdout
pub async fn run_check(settings: &Settings, json: bool) -> Result<()> {
    let checker = UsageChecker::shared(&settings.usage);
    let threshold = settings.usage.threshold_percent;

    let report = tokio::task::spawn_blocking(move || {
        let mut guard = checker.lock();
        CheckReport::collect(&mut *guard, threshold)
    })
    .await
    .context("Usage check task failed")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{}", report.render_text());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicBool, Ordering};
    use usagewatch_core::{CommandOutput, ExitStatus, SystemClock, UsageSettings};

    /// Executor that always prints the same screen
    struct FixedOutput(&'static str);

    impl CommandExecutor for FixedOutput {
        fn execute(&self, _args: &[String]) -> anyhow::Result<CommandOutput> {
            Ok(CommandOutput {
                text: self.0.to_string(),
                status: ExitStatus::Exited(0),
            })
        }
    }

    /// Executor whose process never starts
    struct Unstartable;

    impl CommandExecutor for Unstartable {
        fn execute(&self, _args: &[String]) -> anyhow::Result<CommandOutput> {
            anyhow::bail!("No such file or directory")
        }
    }

    /// Executor that works once and then fails to start
    #[derive(Default)]
    struct FailsAfterFirst(AtomicBool);

    impl CommandExecutor for FailsAfterFirst {
        fn execute(&self, _args: &[String]) -> anyhow::Result<CommandOutput> {
            if self.0.swap(true, Ordering::SeqCst) {
                anyhow::bail!("No such file or directory");
            }
            Ok(CommandOutput {
                text: "95% used".to_string(),
                status: ExitStatus::Exited(0),
            })
        }
    }

    fn checker<E: CommandExecutor>(executor: E) -> UsageChecker<E, SystemClock> {
        UsageChecker::with_parts(&UsageSettings::default(), executor, SystemClock)
    }

    #[test]
    fn test_collect_above_threshold() {
        let mut checker = checker(FixedOutput("91% used\nResets in 2h"));
        let report = CheckReport::collect(&mut checker, 85.0);

        assert_eq!(report.usage_percent, Some(91.0));
        assert!(report.should_pause);
        assert!(report.reset_at.is_some());
    }

    #[test]
    fn test_collect_fails_open() {
        let mut checker = checker(Unstartable);
        let report = CheckReport::collect(&mut checker, 0.0);

        assert_eq!(
            report,
            CheckReport {
                usage_percent: None,
                threshold_percent: 0.0,
                should_pause: false,
                reset_at: None,
                reset: "unknown".to_string(),
            }
        );
    }

    #[test]
    fn test_collect_hides_stale_percent_after_fault() {
        // Zero cache window: every collect runs the command again
        let settings = UsageSettings {
            cache_duration_secs: 0,
            ..Default::default()
        };
        let mut checker =
            UsageChecker::with_parts(&settings, FailsAfterFirst::default(), SystemClock);

        let first = CheckReport::collect(&mut checker, 85.0);
        assert_eq!(first.usage_percent, Some(95.0));
        assert!(first.should_pause);

        let second = CheckReport::collect(&mut checker, 85.0);
        assert_eq!(second.usage_percent, None);
        assert!(!second.should_pause);
        assert_eq!(second.render_text().lines().next(), Some("usage:     unknown"));
    }

    #[test]
    fn test_render_text() {
        let report = CheckReport {
            usage_percent: Some(72.0),
            threshold_percent: 85.0,
            should_pause: false,
            reset_at: Some(Utc.with_ymd_and_hms(2026, 1, 16, 7, 59, 0).unwrap()),
            reset: "02:59am (America/New_York)".to_string(),
        };

        assert_eq!(
            report.render_text(),
            "usage:     72.0%\nthreshold: 85.0%\nreset:     02:59am (America/New_York)\npause:     no"
        );
    }

    #[test]
    fn test_json_fields() {
        let report = CheckReport {
            usage_percent: None,
            threshold_percent: 85.0,
            should_pause: false,
            reset_at: None,
            reset: "unknown".to_string(),
        };

        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["usage_percent"], serde_json::Value::Null);
        assert_eq!(value["should_pause"], false);
        assert_eq!(value["reset"], "unknown");
    }
}
