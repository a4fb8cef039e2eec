//! Plain stdout/stderr capture for commands that do not need a terminal.

use std::io::Read;
use std::process::{Child, Command, Stdio};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::debug;

use super::{
    join_thread_with_timeout, wait_with_timeout, CommandExecutor, CommandOutput, ExitStatus,
    CAPTURE_TIMEOUT, TERMINATE_GRACE,
};

/// Runs the command with separate stdout/stderr pipes
#[derive(Debug, Clone)]
pub struct PipeExecutor {
    timeout: Duration,
}

impl Default for PipeExecutor {
    fn default() -> Self {
        Self::new(CAPTURE_TIMEOUT)
    }
}

impl PipeExecutor {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl CommandExecutor for PipeExecutor {
    fn execute(&self, args: &[String]) -> Result<CommandOutput> {
        let (program, rest) = args.split_first().context("Command is empty")?;

        let mut child = Command::new(program)
            .args(rest)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("Failed to spawn {}", program))?;

        let stdout = spawn_collector(child.stdout.take());
        let stderr = spawn_collector(child.stderr.take());

        let status = wait_or_stop(&mut child, self.timeout)?;

        // Readers finish once the child's end of each pipe closes
        let mut text = collect(stdout);
        text.push_str(&collect(stderr));

        Ok(CommandOutput { text, status })
    }
}

/// Wait for the child; on timeout terminate it, then kill it if it still lingers.
fn wait_or_stop(child: &mut Child, timeout: Duration) -> Result<ExitStatus> {
    if let Some(status) = wait_with_timeout(timeout, || child.try_wait())? {
        return Ok(status.into());
    }

    debug!(
        mode = "pipes",
        timeout_seconds = timeout.as_secs(),
        "usage.command.timeout"
    );
    terminate(child);
    if let Some(status) = wait_with_timeout(TERMINATE_GRACE, || child.try_wait())? {
        return Ok(status.into());
    }

    if let Err(e) = child.kill() {
        debug!("Failed to kill child: {}", e);
    }
    let status = child.wait().context("Failed to wait for killed child")?;
    Ok(status.into())
}

#[cfg(unix)]
fn terminate(child: &mut Child) {
    super::send_signal(child.id(), nix::sys::signal::Signal::SIGTERM);
}

#[cfg(not(unix))]
fn terminate(child: &mut Child) {
    let _ = child.kill();
}

fn spawn_collector<R: Read + Send + 'static>(pipe: Option<R>) -> Option<JoinHandle<Vec<u8>>> {
    let mut pipe = pipe?;
    Some(thread::spawn(move || {
        let mut buf = Vec::new();
        if let Err(e) = pipe.read_to_end(&mut buf) {
            debug!("Pipe read error: {}", e);
        }
        buf
    }))
}

fn collect(handle: Option<JoinHandle<Vec<u8>>>) -> String {
    handle
        .and_then(|h| join_thread_with_timeout(h, Duration::from_secs(1)))
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
        .unwrap_or_default()
}
