//! Bounded execution of OS metadata utilities.
//!
//! A probe command that hangs, crashes, or exits non-zero must degrade to
//! "value unknown" instead of stalling license validation.

use std::io::{self, Read};
use std::process::{Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::debug;

/// Default upper bound for a single probe command.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Why a probe produced no value. Never escapes the collector.
#[derive(Debug, Error)]
pub enum ProbeFailure {
    #[error("failed to start `{0}`: {1}")]
    Spawn(String, io::Error),
    #[error("`{0}` did not finish within {1:?}")]
    TimedOut(String, Duration),
    #[error("`{0}` exited with {1}")]
    Failed(String, ExitStatus),
    #[error("`{0}` stdout was not captured")]
    NoOutput(String),
}

/// Runs external commands with a hard deadline.
#[derive(Debug, Clone, Copy)]
pub struct CommandRunner {
    timeout: Duration,
}

impl Default for CommandRunner {
    fn default() -> Self {
        Self::new(DEFAULT_PROBE_TIMEOUT)
    }
}

impl CommandRunner {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Run `program` with `args`, returning its stdout on a zero exit.
    ///
    /// stdout is drained on a helper thread so a chatty utility cannot
    /// block on a full pipe. The deadline covers both the exit and the
    /// end of stdout: a background process that inherited the pipe cannot
    /// hold the caller past it. On timeout the child is killed and reaped;
    /// the reader thread is left to finish on its own.
    pub fn run(&self, program: &str, args: &[&str]) -> Result<String, ProbeFailure> {
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| ProbeFailure::Spawn(program.to_string(), e))?;

        let Some(mut stdout) = child.stdout.take() else {
            let _ = child.kill();
            let _ = child.wait();
            return Err(ProbeFailure::NoOutput(program.to_string()));
        };

        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = stdout.read_to_end(&mut buf);
            let _ = tx.send(buf);
        });

        let deadline = Instant::now() + self.timeout;
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) if Instant::now() >= deadline => {
                    let _ = child.kill();
                    let _ = child.wait();
                    debug!(program, timeout_ms = self.timeout.as_millis() as u64, "Probe command killed");
                    return Err(ProbeFailure::TimedOut(program.to_string(), self.timeout));
                }
                Ok(None) => thread::sleep(POLL_INTERVAL),
                Err(e) => {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(ProbeFailure::Spawn(program.to_string(), e));
                }
            }
        };

        if !status.success() {
            return Err(ProbeFailure::Failed(program.to_string(), status));
        }

        let remaining = deadline
            .saturating_duration_since(Instant::now())
            .max(POLL_INTERVAL);
        let bytes = match rx.recv_timeout(remaining) {
            Ok(bytes) => bytes,
            Err(RecvTimeoutError::Timeout) => {
                debug!(program, "Probe output still open after exit");
                return Err(ProbeFailure::TimedOut(program.to_string(), self.timeout));
            }
            Err(RecvTimeoutError::Disconnected) => {
                return Err(ProbeFailure::NoOutput(program.to_string()));
            }
        };
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Like [`run`](Self::run), but logs the failure and returns `None`.
    pub fn output(&self, program: &str, args: &[&str]) -> Option<String> {
        match self.run(program, args) {
            Ok(out) => Some(out),
            Err(e) => {
                debug!(error = %e, "Probe command failed");
                None
            }
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn captures_stdout() {
        let runner = CommandRunner::default();
        let out = runner.run("echo", &["hello"]).unwrap();
        assert_eq!(out.trim(), "hello");
    }

    #[test]
    fn missing_binary_is_spawn_failure() {
        let runner = CommandRunner::default();
        let err = runner.run("definitely-not-a-real-binary-xyz", &[]).unwrap_err();
        assert!(matches!(err, ProbeFailure::Spawn(..)));
    }

    #[test]
    fn non_zero_exit_is_failure() {
        let runner = CommandRunner::default();
        let err = runner.run("false", &[]).unwrap_err();
        assert!(matches!(err, ProbeFailure::Failed(..)));
    }

    #[test]
    fn hung_command_is_killed_at_deadline() {
        let runner = CommandRunner::new(Duration::from_millis(200));
        let started = Instant::now();
        let err = runner.run("sleep", &["30"]).unwrap_err();

        assert!(matches!(err, ProbeFailure::TimedOut(..)));
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[test]
    fn background_child_holding_stdout_does_not_outlive_deadline() {
        let runner = CommandRunner::new(Duration::from_millis(200));
        let started = Instant::now();
        let err = runner.run("sh", &["-c", "sleep 5 & echo hi"]).unwrap_err();

        assert!(matches!(err, ProbeFailure::TimedOut(..)));
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn output_swallows_errors() {
        let runner = CommandRunner::new(Duration::from_millis(200));
        assert!(runner.output("false", &[]).is_none());
    }
}
