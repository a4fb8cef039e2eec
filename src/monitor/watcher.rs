use anyhow::{Context, Result};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use usagewatch_core::{Clock, CommandExecutor, SystemClock, SystemExecutor, UsageChecker};

use super::report::CheckReport;
use crate::config::Settings;

/// Message sent from the watcher to the main loop
#[derive(Debug)]
pub enum WatchMessage {
    /// Result of a completed check
    Report(CheckReport),
    /// The check task itself failed
    Error(String),
}

/// Runs usage checks on a fixed interval in a background task.
///
/// Checks block on a child process, so each one runs on the blocking pool
/// while holding the checker lock for the whole cycle.
pub struct Watcher<E = SystemExecutor, C = SystemClock> {
    checker: Arc<Mutex<UsageChecker<E, C>>>,
    threshold_percent: f64,
    interval: Duration,
}

impl Watcher {
    /// Create a watcher that runs the configured command on this system
    pub fn new(settings: &Settings) -> Self {
        Self::with_checker(
            UsageChecker::shared(&settings.usage),
            settings.usage.threshold_percent,
            Duration::from_secs(settings.watch.interval_secs),
        )
    }
}

impl<E, C> Watcher<E, C>
where
    E: CommandExecutor + 'static,
    C: Clock + 'static,
{
    pub fn with_checker(
        checker: Arc<Mutex<UsageChecker<E, C>>>,
        threshold_percent: f64,
        interval: Duration,
    ) -> Self {
        Self {
            checker,
            threshold_percent,
            interval,
        }
    }

    /// Start watching in a background task; the first check runs immediately
    pub fn start(self) -> mpsc::Receiver<WatchMessage> {
        let (tx, rx) = mpsc::channel(8);

        tokio::spawn(async move {
            self.run(tx).await;
        });

        rx
    }

    async fn run(self, tx: mpsc::Sender<WatchMessage>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;

            let message = match self.check_once().await {
                Ok(report) => WatchMessage::Report(report),
                Err(e) => WatchMessage::Error(format!("{:#}", e)),
            };
            if tx.send(message).await.is_err() {
                break; // Receiver dropped
            }
        }
    }

    /// Run one check cycle on the blocking pool
    pub async fn check_once(&self) -> Result<CheckReport> {
        let checker = Arc::clone(&self.checker);
        let threshold = self.threshold_percent;

        tokio::task::spawn_blocking(move || {
            let mut guard = checker.lock();
            CheckReport::collect(&mut *guard, threshold)
        })
        .await
        .context("Usage check task failed")
    }
}

/// Watch usage until Ctrl-C, logging every decision
pub async fn run_watch(settings: &Settings) -> Result<()> {
    info!(
        interval_secs = settings.watch.interval_secs,
        threshold_percent = settings.usage.threshold_percent,
        command = %settings.usage.command,
        "watch.started"
    );

    let mut rx = Watcher::new(settings).start();
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                info!("watch.stopped");
                break;
            }
            message = rx.recv() => match message {
                Some(WatchMessage::Report(report)) => log_report(&report),
                Some(WatchMessage::Error(e)) => error!(error = %e, "watch.check_failed"),
                None => break,
            },
        }
    }

    Ok(())
}

fn log_report(report: &CheckReport) {
    if report.should_pause {
        warn!(
            usage_percent = report.usage_percent,
            reset = %report.reset,
            "watch.pause"
        );
    } else {
        info!(
            usage_percent = report.usage_percent,
            reset = %report.reset,
            "watch.proceed"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use usagewatch_core::{CommandOutput, ExitStatus, UsageSettings};

    /// Executor reporting one more percent on every run
    #[derive(Default)]
    struct Climbing(Arc<AtomicUsize>);

    impl CommandExecutor for Climbing {
        fn execute(&self, _args: &[String]) -> anyhow::Result<CommandOutput> {
            let run = self.0.fetch_add(1, Ordering::SeqCst);
            Ok(CommandOutput {
                text: format!("{}% used", 80 + run),
                status: ExitStatus::Exited(0),
            })
        }
    }

    fn watcher(cache_duration_secs: u64, interval: Duration) -> Watcher<Climbing, SystemClock> {
        let settings = UsageSettings {
            cache_duration_secs,
            ..Default::default()
        };
        let checker = UsageChecker::with_parts(&settings, Climbing::default(), SystemClock);
        Watcher::with_checker(Arc::new(Mutex::new(checker)), 81.0, interval)
    }

    #[tokio::test]
    async fn test_check_once() {
        let watcher = watcher(60, Duration::from_secs(300));

        let report = watcher.check_once().await.unwrap();
        assert_eq!(report.usage_percent, Some(80.0));
        assert!(!report.should_pause);

        // Served from the cache
        let report = watcher.check_once().await.unwrap();
        assert_eq!(report.usage_percent, Some(80.0));
    }

    #[tokio::test]
    async fn test_start_reports_each_tick() {
        let mut rx = watcher(1, Duration::from_millis(1100)).start();

        let first = match rx.recv().await {
            Some(WatchMessage::Report(report)) => report,
            other => panic!("unexpected message: {:?}", other),
        };
        assert_eq!(first.usage_percent, Some(80.0));

        let second = match rx.recv().await {
            Some(WatchMessage::Report(report)) => report,
            other => panic!("unexpected message: {:?}", other),
        };
        assert_eq!(second.usage_percent, Some(81.0));
        assert!(second.should_pause);
    }
}
