//! Process runner - bounded, cancellable subprocess execution

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tokio::sync::Notify;
use tracing::{debug, info, warn};

use crate::{
    config::ProcessConfig,
    error::{ProcessError, Result},
};

/// Captured output of a completed process
#[derive(Debug, Clone)]
pub struct RunOutput {
    /// Captured stdout (lossy UTF-8)
    pub stdout: String,
    /// Captured stderr (lossy UTF-8)
    pub stderr: String,
    /// Process exit code
    pub exit_code: i32,
    /// Wall-clock duration of the run
    pub duration: Duration,
}

/// Runs subprocesses with timeout enforcement and cancellation by id
///
/// Each in-flight execution is tracked in a registry keyed by execution id.
/// Entries are removed the instant a terminal outcome is reached, so a cancel
/// that races with completion is a no-op rather than a double cleanup.
pub struct ProcessRunner {
    running: Arc<Mutex<HashMap<String, Arc<Notify>>>>,
}

impl ProcessRunner {
    /// Create new process runner
    pub fn new() -> Self {
        Self {
            running: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Number of currently running executions
    pub fn running_count(&self) -> usize {
        self.running.lock().len()
    }

    /// Whether an execution id has a live process
    pub fn is_running(&self, execution_id: &str) -> bool {
        self.running.lock().contains_key(execution_id)
    }

    /// Cancel a running execution by id
    ///
    /// Returns `true` if a live process was signalled, `false` if the id is
    /// unknown or already terminal. Idempotent by construction.
    pub fn cancel(&self, execution_id: &str) -> bool {
        let notify = self.running.lock().get(execution_id).cloned();
        match notify {
            Some(notify) => {
                info!(execution_id = %execution_id, "Cancelling execution");
                notify.notify_one();
                true
            }
            None => false,
        }
    }

    /// Run a process to completion
    ///
    /// The command is spawned directly (no shell), stdin is closed
    /// immediately, and stdout/stderr are fully captured. A configured
    /// timeout terminates the process group gracefully, escalating to a
    /// forced kill after the grace window.
    pub async fn run(&self, execution_id: &str, config: ProcessConfig) -> Result<RunOutput> {
        let cancel = Arc::new(Notify::new());
        {
            let mut running = self.running.lock();
            if running.contains_key(execution_id) {
                return Err(ProcessError::AlreadyRunning(execution_id.to_string()));
            }
            running.insert(execution_id.to_string(), cancel.clone());
        }

        let result = self.run_inner(execution_id, config, cancel).await;

        // Terminal outcome reached: drop the registry entry exactly once.
        self.running.lock().remove(execution_id);
        result
    }

    async fn run_inner(
        &self,
        execution_id: &str,
        config: ProcessConfig,
        cancel: Arc<Notify>,
    ) -> Result<RunOutput> {
        debug!(
            execution_id = %execution_id,
            command = %config.command,
            args = ?config.args,
            "Spawning process"
        );

        let mut cmd = Command::new(&config.command);
        cmd.args(&config.args);

        if let Some(ref dir) = config.working_dir {
            cmd.current_dir(dir);
        }
        for (key, value) in &config.env {
            cmd.env(key, value);
        }

        // All input travels as arguments; stdin is closed up front.
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd.kill_on_drop(true);

        #[cfg(unix)]
        cmd.process_group(0);

        let started = Instant::now();
        let mut child = cmd.spawn()?;
        let pid = child.id().unwrap_or(0);
        info!(execution_id = %execution_id, pid = %pid, command = %config.command, "Process spawned");

        // Drain stdout/stderr concurrently so a chatty child never blocks on
        // a full pipe while we wait for it.
        let mut stdout_pipe = child.stdout.take();
        let mut stderr_pipe = child.stderr.take();
        let stdout_task = tokio::spawn(async move {
            let mut buf = Vec::new();
            if let Some(ref mut pipe) = stdout_pipe {
                let _ = pipe.read_to_end(&mut buf).await;
            }
            buf
        });
        let stderr_task = tokio::spawn(async move {
            let mut buf = Vec::new();
            if let Some(ref mut pipe) = stderr_pipe {
                let _ = pipe.read_to_end(&mut buf).await;
            }
            buf
        });

        let timeout = config.timeout.unwrap_or(Duration::from_secs(u64::MAX / 2));

        let status = tokio::select! {
            status = child.wait() => status?,
            _ = tokio::time::sleep(timeout) => {
                warn!(execution_id = %execution_id, pid = %pid, "Process timed out, terminating");
                Self::terminate(&mut child, pid, config.grace).await;
                return Err(ProcessError::Timeout {
                    seconds: timeout.as_secs(),
                });
            }
            _ = cancel.notified() => {
                info!(execution_id = %execution_id, pid = %pid, "Process cancelled, terminating");
                Self::terminate(&mut child, pid, config.grace).await;
                return Err(ProcessError::Cancelled);
            }
        };

        let stdout = String::from_utf8_lossy(&stdout_task.await.unwrap_or_default()).into_owned();
        let stderr = String::from_utf8_lossy(&stderr_task.await.unwrap_or_default()).into_owned();
        let duration = started.elapsed();
        let exit_code = status.code().unwrap_or(-1);

        debug!(
            execution_id = %execution_id,
            exit_code = %exit_code,
            duration_ms = %duration.as_millis(),
            "Process exited"
        );

        if exit_code != 0 {
            let detail = if stderr.trim().is_empty() {
                stdout.trim().to_string()
            } else {
                stderr.trim().to_string()
            };
            return Err(ProcessError::NonZeroExit {
                code: exit_code,
                stderr: detail,
            });
        }

        Ok(RunOutput {
            stdout,
            stderr,
            exit_code,
            duration,
        })
    }

    /// Graceful termination: SIGTERM to the process group, then SIGKILL after
    /// the grace window if it has not exited.
    async fn terminate(child: &mut Child, pid: u32, grace: Duration) {
        #[cfg(unix)]
        {
            use nix::sys::signal::{killpg, Signal};
            use nix::unistd::Pid;

            let pgid = Pid::from_raw(pid as i32);
            match killpg(pgid, Signal::SIGTERM) {
                Ok(_) => debug!(pid = %pid, "Sent SIGTERM to process group"),
                Err(e) => {
                    warn!(pid = %pid, error = %e, "Failed to send SIGTERM, killing process directly");
                    let _ = child.kill().await;
                }
            }

            if tokio::time::timeout(grace, child.wait()).await.is_ok() {
                return;
            }

            warn!(pid = %pid, "Grace window elapsed, sending SIGKILL");
            match killpg(pgid, Signal::SIGKILL) {
                Ok(_) => debug!(pid = %pid, "Sent SIGKILL to process group"),
                Err(e) => {
                    warn!(pid = %pid, error = %e, "Failed to send SIGKILL, killing process directly");
                    let _ = child.kill().await;
                }
            }
            let _ = child.wait().await;
        }

        #[cfg(not(unix))]
        {
            let _ = grace;
            let _ = child.kill().await;
            let _ = child.wait().await;
        }
    }
}

impl Default for ProcessRunner {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn run_captures_stdout() {
        let runner = ProcessRunner::new();
        let config = ProcessConfig::new("echo").args(["hello"]);

        let output = runner.run("t-echo", config).await.unwrap();
        assert_eq!(output.stdout.trim(), "hello");
        assert_eq!(output.exit_code, 0);
        assert_eq!(runner.running_count(), 0);
    }

    #[tokio::test]
    async fn nonzero_exit_carries_stderr() {
        let runner = ProcessRunner::new();
        let config = ProcessConfig::new("sh").args(["-c", "echo boom >&2; exit 3"]);

        let err = runner.run("t-exit", config).await.unwrap_err();
        match err {
            ProcessError::NonZeroExit { code, stderr } => {
                assert_eq!(code, 3);
                assert_eq!(stderr, "boom");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn timeout_kills_long_running_process() {
        let runner = ProcessRunner::new();
        let config = ProcessConfig::new("sleep")
            .args(["30"])
            .timeout(Duration::from_millis(50))
            .grace(Duration::from_millis(200));

        let started = Instant::now();
        let err = runner.run("t-timeout", config).await.unwrap_err();
        assert!(matches!(err, ProcessError::Timeout { .. }));
        // timeout + grace window, with some scheduler slack
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(runner.running_count(), 0);
    }

    #[tokio::test]
    async fn cancel_running_execution() {
        let runner = Arc::new(ProcessRunner::new());
        let config = ProcessConfig::new("sleep")
            .args(["30"])
            .grace(Duration::from_millis(200));

        let r = runner.clone();
        let handle = tokio::spawn(async move { r.run("t-cancel", config).await });

        // Wait for the registry entry to appear
        for _ in 0..100 {
            if runner.is_running("t-cancel") {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        assert!(runner.cancel("t-cancel"));
        let err = handle.await.unwrap().unwrap_err();
        assert!(matches!(err, ProcessError::Cancelled));

        // Terminal id: cancel is now a no-op, twice over
        assert!(!runner.cancel("t-cancel"));
        assert!(!runner.cancel("t-cancel"));
    }

    #[tokio::test]
    async fn duplicate_execution_id_rejected() {
        let runner = Arc::new(ProcessRunner::new());
        let config = ProcessConfig::new("sleep").args(["5"]);

        let r = runner.clone();
        let c = config.clone();
        let handle = tokio::spawn(async move { r.run("t-dup", c).await });

        for _ in 0..100 {
            if runner.is_running("t-dup") {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        let err = runner.run("t-dup", config).await.unwrap_err();
        assert!(matches!(err, ProcessError::AlreadyRunning(_)));

        runner.cancel("t-dup");
        let _ = handle.await;
    }
}
