//! Run the usage command and capture what it prints.
//!
//! Interactive CLIs only render their usage screen on a real terminal, so the
//! command is first run inside a pseudo-terminal. Any failure there is
//! discarded and the command is run again over plain pipes.

mod pipe;
mod pty;

use std::io;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use anyhow::Result;
use tracing::debug;

pub use pipe::PipeExecutor;
pub use pty::{pty_supported, PtyExecutor};

/// Total time the command gets before it is asked to exit
pub const CAPTURE_TIMEOUT: Duration = Duration::from_secs(5);
/// How long a terminated process gets before it is killed
pub const TERMINATE_GRACE: Duration = Duration::from_secs(2);
/// Interval between checks while waiting on a child or its output
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// How the command finished
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    /// Exited normally with this code
    Exited(i32),
    /// Terminated by this signal number
    Signaled(i32),
    /// Finished, but the status could not be determined
    Unknown,
}

impl ExitStatus {
    /// Success, or the terminate/kill signals sent during shutdown
    pub fn is_accepted(&self) -> bool {
        match self {
            Self::Exited(code) => *code == 0,
            Self::Signaled(signal) => *signal == SIGTERM || *signal == SIGKILL,
            Self::Unknown => false,
        }
    }

    /// Numeric code for logs: the exit code, or the negated signal number
    pub fn return_code(&self) -> i32 {
        match self {
            Self::Exited(code) => *code,
            Self::Signaled(signal) => -signal,
            Self::Unknown => -1,
        }
    }
}

impl From<std::process::ExitStatus> for ExitStatus {
    fn from(status: std::process::ExitStatus) -> Self {
        if let Some(code) = status.code() {
            return Self::Exited(code);
        }
        #[cfg(unix)]
        {
            use std::os::unix::process::ExitStatusExt;
            if let Some(signal) = status.signal() {
                return Self::Signaled(signal);
            }
        }
        Self::Unknown
    }
}

#[cfg(unix)]
const SIGTERM: i32 = nix::sys::signal::Signal::SIGTERM as i32;
#[cfg(unix)]
const SIGKILL: i32 = nix::sys::signal::Signal::SIGKILL as i32;
#[cfg(not(unix))]
const SIGTERM: i32 = 15;
#[cfg(not(unix))]
const SIGKILL: i32 = 9;

/// Combined output of one command run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// Decoded output (stdout then stderr in pipe mode, the terminal stream in PTY mode)
    pub text: String,
    pub status: ExitStatus,
}

/// Runs a tokenized command and captures its output
pub trait CommandExecutor: Send {
    /// Run `args[0]` with `args[1..]`; `Err` only for faults starting or
    /// supervising the process.
    fn execute(&self, args: &[String]) -> Result<CommandOutput>;
}

/// PTY capture when the platform has it, pipe capture otherwise or on failure
#[derive(Debug, Clone, Default)]
pub struct SystemExecutor {
    pty: PtyExecutor,
    pipe: PipeExecutor,
}

impl SystemExecutor {
    pub fn new(capture_timeout: Duration) -> Self {
        Self {
            pty: PtyExecutor::new(capture_timeout),
            pipe: PipeExecutor::new(capture_timeout),
        }
    }
}

impl CommandExecutor for SystemExecutor {
    fn execute(&self, args: &[String]) -> Result<CommandOutput> {
        if pty_supported() {
            match self.pty.execute(args) {
                Ok(output) => return Ok(output),
                Err(e) => debug!(error = %e, "usage.command.pty_fallback"),
            }
        }
        self.pipe.execute(args)
    }
}

/// Poll `try_wait` until it yields a value or `timeout` passes
pub(crate) fn wait_with_timeout<T>(
    timeout: Duration,
    mut try_wait: impl FnMut() -> io::Result<Option<T>>,
) -> io::Result<Option<T>> {
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(value) = try_wait()? {
            return Ok(Some(value));
        }
        let now = Instant::now();
        if now >= deadline {
            return Ok(None);
        }
        thread::sleep((deadline - now).min(Duration::from_millis(20)));
    }
}

/// Send a signal to a child by pid, ignoring children that are already gone
#[cfg(unix)]
pub(crate) fn send_signal(pid: u32, sig: nix::sys::signal::Signal) {
    use nix::sys::signal;
    use nix::unistd::Pid;

    if pid == 0 {
        return;
    }
    if let Err(e) = signal::kill(Pid::from_raw(pid as i32), sig) {
        debug!("Failed to send {} to {}: {}", sig, pid, e);
    }
}

/// Join a thread with a timeout, abandoning it if it doesn't finish in time
pub(crate) fn join_thread_with_timeout<T>(handle: JoinHandle<T>, timeout: Duration) -> Option<T> {
    let start = Instant::now();
    loop {
        if handle.is_finished() {
            return handle.join().ok();
        }
        if start.elapsed() >= timeout {
            // A grandchild still holding the output open keeps the reader blocked
            debug!("Thread join timed out, abandoning thread");
            return None;
        }
        thread::sleep(Duration::from_millis(10));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_status_acceptance() {
        assert!(ExitStatus::Exited(0).is_accepted());
        assert!(ExitStatus::Signaled(15).is_accepted());
        assert!(ExitStatus::Signaled(9).is_accepted());
        assert!(!ExitStatus::Exited(1).is_accepted());
        assert!(!ExitStatus::Signaled(2).is_accepted());
        assert!(!ExitStatus::Unknown.is_accepted());
    }

    #[test]
    fn test_return_code() {
        assert_eq!(ExitStatus::Exited(3).return_code(), 3);
        assert_eq!(ExitStatus::Signaled(15).return_code(), -15);
        assert_eq!(ExitStatus::Unknown.return_code(), -1);
    }

    #[test]
    fn test_wait_with_timeout_returns_value() {
        let mut calls = 0;
        let result = wait_with_timeout(Duration::from_secs(1), || {
            calls += 1;
            Ok((calls == 3).then_some(calls))
        })
        .unwrap();
        assert_eq!(result, Some(3));
    }

    #[test]
    fn test_wait_with_timeout_expires() {
        let start = Instant::now();
        let result: Option<()> =
            wait_with_timeout(Duration::from_millis(50), || Ok(None)).unwrap();
        assert_eq!(result, None);
        assert!(start.elapsed() >= Duration::from_millis(50));
    }

    #[cfg(unix)]
    #[test]
    fn test_system_executor_captures_output() {
        let executor = SystemExecutor::default();
        let args = ["sh", "-c", "printf '42%% used\\n'"].map(String::from);
        let output = executor.execute(&args).unwrap();
        assert!(output.text.contains("42% used"), "{:?}", output.text);
    }

    #[cfg(unix)]
    #[test]
    fn test_system_executor_missing_program_is_error() {
        let executor = SystemExecutor::default();
        let args = ["/nonexistent/usagewatch-missing-binary".to_string()];
        assert!(executor.execute(&args).is_err());
    }
}
