//! Pseudo-terminal capture for interactive CLIs.
//!
//! The child gets a terminal on all three standard streams so it renders its
//! full-screen view. Output is read on a helper thread and polled here with a
//! short timeout, so the capture loop never blocks past its deadline.

use std::io::{ErrorKind, Read, Write};
use std::path::Path;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use portable_pty::{native_pty_system, Child, ChildKiller, CommandBuilder, MasterPty, PtySize};
use tracing::debug;

use super::{
    join_thread_with_timeout, wait_with_timeout, CommandExecutor, CommandOutput, ExitStatus,
    CAPTURE_TIMEOUT, POLL_INTERVAL, TERMINATE_GRACE,
};

/// TERM given to the child when the parent environment has none
const DEFAULT_TERM: &str = "xterm-256color";
/// Once the usage screen is visible, keep reading only this much longer
const SCREEN_SETTLE: Duration = Duration::from_millis(500);
/// Pause after each key sent during shutdown
const KEY_GRACE: Duration = Duration::from_millis(200);
/// Window for reading output produced after shutdown began
const DRAIN_TIMEOUT: Duration = Duration::from_millis(500);
/// Markers that the usage screen has rendered
const SCREEN_MARKERS: &[&[u8]] = &[b"Resets", b"% used"];

const ESCAPE: u8 = 0x1b;
const CTRL_C: u8 = 0x03;

static PTY_SUPPORTED: Lazy<bool> = Lazy::new(|| cfg!(unix) && Path::new("/dev/ptmx").exists());

/// Whether this platform can allocate pseudo-terminals
pub fn pty_supported() -> bool {
    *PTY_SUPPORTED
}

/// Runs the command attached to a pseudo-terminal
#[derive(Debug, Clone)]
pub struct PtyExecutor {
    timeout: Duration,
    rows: u16,
    cols: u16,
}

impl Default for PtyExecutor {
    fn default() -> Self {
        Self::new(CAPTURE_TIMEOUT)
    }
}

impl PtyExecutor {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            rows: 50,
            cols: 120,
        }
    }
}

impl CommandExecutor for PtyExecutor {
    fn execute(&self, args: &[String]) -> Result<CommandOutput> {
        let cmd = build_command(args)?;

        let pair = native_pty_system()
            .openpty(PtySize {
                rows: self.rows,
                cols: self.cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .context("Failed to open PTY")?;

        let child = pair
            .slave
            .spawn_command(cmd)
            .context("Failed to spawn command in PTY")?;
        // Only the child keeps the slave side open
        drop(pair.slave);

        let mut session = PtySession {
            master: pair.master,
            child,
            writer: None,
        };
        debug!("Spawned {} in PTY with PID {:?}", args[0], session.child.process_id());

        let reader = session
            .master
            .try_clone_reader()
            .context("Failed to clone PTY reader")?;
        session.writer = Some(
            session
                .master
                .take_writer()
                .context("Failed to take PTY writer")?,
        );

        let (tx, rx) = mpsc::channel();
        let reader_thread = spawn_reader(reader, tx);

        let mut output = Vec::new();
        session.capture(&rx, &mut output, self.timeout)?;
        let status = session.shutdown()?;
        drain(&rx, &mut output);

        // Releases the master side before waiting on the reader
        drop(session);
        // A grandchild holding the slave open keeps the reader blocked; the
        // abandoned thread then owns the cloned master descriptor and closes
        // it once that grandchild exits and the read fails.
        join_thread_with_timeout(reader_thread, Duration::from_secs(1));

        Ok(CommandOutput {
            text: String::from_utf8_lossy(&output).into_owned(),
            status,
        })
    }
}

/// Command with the parent's environment and a TERM suited to full-screen rendering
fn build_command(args: &[String]) -> Result<CommandBuilder> {
    let (program, rest) = args.split_first().context("Command is empty")?;

    let mut cmd = CommandBuilder::new(program);
    cmd.args(rest);
    if let Ok(cwd) = std::env::current_dir() {
        cmd.cwd(cwd);
    }
    if cmd.get_env("TERM").is_none() {
        cmd.env("TERM", DEFAULT_TERM);
    }
    Ok(cmd)
}

/// A running child and the master side of its terminal.
///
/// Dropping the session kills and reaps a child that is still running, and
/// closes the master descriptor.
struct PtySession {
    master: Box<dyn MasterPty + Send>,
    child: Box<dyn Child + Send + Sync>,
    writer: Option<Box<dyn Write + Send>>,
}

impl PtySession {
    /// Collect output until the deadline, EOF, or the child exits. The
    /// deadline shrinks once the usage screen shows up.
    fn capture(
        &mut self,
        rx: &Receiver<Vec<u8>>,
        output: &mut Vec<u8>,
        timeout: Duration,
    ) -> Result<()> {
        let mut deadline = Instant::now() + timeout;
        let mut screen_ready = false;

        loop {
            let now = Instant::now();
            if now >= deadline {
                if !screen_ready {
                    debug!(
                        mode = "pty",
                        timeout_seconds = timeout.as_secs(),
                        "usage.command.timeout"
                    );
                }
                return Ok(());
            }
            if !self.is_running()? {
                return Ok(());
            }

            match rx.recv_timeout((deadline - now).min(POLL_INTERVAL)) {
                Ok(chunk) => {
                    output.extend_from_slice(&chunk);
                    if !screen_ready && usage_screen_rendered(output) {
                        screen_ready = true;
                        deadline = deadline.min(Instant::now() + SCREEN_SETTLE);
                    }
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => return Ok(()),
            }
        }
    }

    /// Ask the CLI to exit (Escape, then Ctrl-C), then terminate, then kill.
    fn shutdown(&mut self) -> Result<ExitStatus> {
        for key in [ESCAPE, CTRL_C] {
            if !self.is_running()? {
                break;
            }
            self.send_key(key);
            thread::sleep(KEY_GRACE);
        }

        if self.is_running()? {
            self.signal(Stop::Terminate);
        }
        if let Some(status) = wait_with_timeout(TERMINATE_GRACE, || self.child.try_wait())? {
            return Ok(exit_status(&status));
        }

        self.signal(Stop::Kill);
        match wait_with_timeout(TERMINATE_GRACE, || self.child.try_wait())? {
            Some(status) => Ok(exit_status(&status)),
            None => anyhow::bail!("PTY child did not exit after kill"),
        }
    }

    fn is_running(&mut self) -> Result<bool> {
        let status = self
            .child
            .try_wait()
            .context("Failed to poll PTY child")?;
        Ok(status.is_none())
    }

    fn send_key(&mut self, key: u8) {
        if let Some(writer) = self.writer.as_mut() {
            if let Err(e) = writer.write_all(&[key]).and_then(|_| writer.flush()) {
                debug!("PTY write error: {}", e);
            }
        }
    }

    #[cfg(unix)]
    fn signal(&mut self, stop: Stop) {
        use nix::sys::signal::Signal;

        let sig = match stop {
            Stop::Terminate => Signal::SIGTERM,
            Stop::Kill => Signal::SIGKILL,
        };
        match self.child.process_id() {
            Some(pid) => super::send_signal(pid, sig),
            None => {
                let _ = self.child.kill();
            }
        }
    }

    #[cfg(not(unix))]
    fn signal(&mut self, _stop: Stop) {
        let _ = self.child.kill();
    }
}

impl Drop for PtySession {
    fn drop(&mut self) {
        if let Ok(None) = self.child.try_wait() {
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Stop {
    Terminate,
    Kill,
}

/// Read the master side until EOF, forwarding each chunk
fn spawn_reader(mut reader: Box<dyn Read + Send>, tx: Sender<Vec<u8>>) -> JoinHandle<()> {
    thread::spawn(move || {
        let mut buf = [0u8; 4096];
        loop {
            match reader.read(&mut buf) {
                Ok(0) => break, // EOF
                Ok(n) => {
                    if tx.send(buf[..n].to_vec()).is_err() {
                        break;
                    }
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    // EIO once every slave descriptor is closed
                    debug!("PTY read error: {}", e);
                    break;
                }
            }
        }
    })
}

/// Pick up output written while the child was shutting down
fn drain(rx: &Receiver<Vec<u8>>, output: &mut Vec<u8>) {
    let deadline = Instant::now() + DRAIN_TIMEOUT;
    loop {
        let now = Instant::now();
        if now >= deadline {
            break;
        }
        match rx.recv_timeout((deadline - now).min(POLL_INTERVAL)) {
            Ok(chunk) => output.extend_from_slice(&chunk),
            Err(_) => break,
        }
    }
}

fn usage_screen_rendered(output: &[u8]) -> bool {
    SCREEN_MARKERS
        .iter()
        .any(|marker| output.windows(marker.len()).any(|w| w == *marker))
}

/// Translate portable-pty's status, which reports signals by description
fn exit_status(status: &portable_pty::ExitStatus) -> ExitStatus {
    match status.signal() {
        None => ExitStatus::Exited(status.exit_code() as i32),
        Some(description) => signal_from_description(description)
            .map(ExitStatus::Signaled)
            .unwrap_or(ExitStatus::Unknown),
    }
}

/// Signal number from a `strsignal` description ("Terminated", "Killed: 9", "Signal 15")
fn signal_from_description(description: &str) -> Option<i32> {
    if let Some(number) = description.strip_prefix("Signal ") {
        return number.trim().parse().ok();
    }
    let name = description.split(':').next()?.trim();
    let number = match name {
        "Hangup" => 1,
        "Interrupt" => 2,
        "Killed" => 9,
        "Terminated" => 15,
        _ => return None,
    };
    Some(number)
}
