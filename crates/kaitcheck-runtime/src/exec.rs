//! Subprocess execution with captured output and an optional deadline.
//!
//! Every interaction with a container runtime CLI goes through
//! [`run_command`], which drains stdout and stderr on helper threads so a
//! chatty child cannot block on a full pipe while the deadline is watched.

use std::io::Read;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use kaitcheck_common::error::{KaitError, Result};
use serde::{Deserialize, Serialize};

/// Interval between `try_wait` checks while a deadline is active.
const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// How long output is still collected after a kill. Grandchildren that
/// inherited the pipes can keep them open long after the child is gone.
const KILL_GRACE: Duration = Duration::from_millis(200);

/// Output from a command executed inside a container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecOutput {
    /// Standard output from the command.
    pub stdout: String,
    /// Standard error from the command.
    pub stderr: String,
    /// Exit code returned by the command.
    pub exit_code: i32,
}

impl ExecOutput {
    /// Returns whether the command exited with status zero.
    #[must_use]
    pub const fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Returns stdout followed by stderr.
    #[must_use]
    pub fn combined(&self) -> String {
        let mut out = self.stdout.clone();
        if !self.stderr.is_empty() {
            if !out.is_empty() && !out.ends_with('\n') {
                out.push('\n');
            }
            out.push_str(&self.stderr);
        }
        out
    }
}

/// How a subprocess run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    /// The process exited on its own.
    Finished(ExecOutput),
    /// The deadline passed and the process was killed.
    TimedOut {
        /// Output captured before the kill.
        partial: ExecOutput,
    },
}

/// Spawns `command` and waits for it, killing it once `timeout` elapses.
///
/// Stdin is closed. A process terminated by a signal reports exit code `-1`.
///
/// # Errors
///
/// Returns [`KaitError::Io`] if the process cannot be spawned or waited on.
pub fn run_command(
    mut command: Command,
    program: &str,
    timeout: Option<Duration>,
) -> Result<Completion> {
    let io_error = |source| KaitError::Io {
        path: program.into(),
        source,
    };

    let mut child = command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(io_error)?;

    let stdout = child.stdout.take().map(drain);
    let stderr = child.stderr.take().map(drain);

    let status = match timeout {
        Some(limit) => wait_with_deadline(&mut child, limit).map_err(io_error)?,
        None => Some(child.wait().map_err(io_error)?),
    };

    let timed_out = status.is_none();
    if timed_out {
        tracing::warn!(program, "process exceeded its deadline, killing");
        let _ = child.kill();
        let _ = child.wait();
    }

    let grace = timed_out.then(|| Instant::now() + KILL_GRACE);
    let output = ExecOutput {
        stdout: collect(stdout, grace),
        stderr: collect(stderr, grace),
        exit_code: status.and_then(|s| s.code()).unwrap_or(-1),
    };

    Ok(if timed_out {
        Completion::TimedOut { partial: output }
    } else {
        Completion::Finished(output)
    })
}

fn wait_with_deadline(child: &mut Child, limit: Duration) -> std::io::Result<Option<ExitStatus>> {
    let start = Instant::now();
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        let remaining = limit.saturating_sub(start.elapsed());
        if remaining.is_zero() {
            return Ok(None);
        }
        std::thread::sleep(remaining.min(WAIT_POLL_INTERVAL));
    }
}

fn drain<R: Read + Send + 'static>(mut reader: R) -> JoinHandle<String> {
    std::thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = reader.read_to_end(&mut buf);
        String::from_utf8_lossy(&buf).into_owned()
    })
}

/// Joins a drain thread. With a `grace` deadline, a thread still blocked on
/// an open pipe past it is abandoned and its output dropped.
fn collect(handle: Option<JoinHandle<String>>, grace: Option<Instant>) -> String {
    let Some(handle) = handle else {
        return String::new();
    };
    if let Some(deadline) = grace {
        while !handle.is_finished() {
            if Instant::now() >= deadline {
                return String::new();
            }
            std::thread::sleep(WAIT_POLL_INTERVAL);
        }
    }
    handle.join().unwrap_or_default()
}
