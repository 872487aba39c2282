//! Toolchain subprocess management.
//!
//! Two shapes of subprocess are used by the engine: one-shot commands whose
//! full output is captured under a timeout ([`capture_output`]), and
//! long-lived streaming processes whose stdout/stderr are read line by line
//! by dedicated background tasks ([`StreamProcess`]).

use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot, Notify};
use tokio::time::timeout;

use xcmon_core::prelude::*;

/// Output of a one-shot command
#[derive(Debug)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub code: Option<i32>,
    pub success: bool,
}

/// Run a command to completion, capturing output under a timeout.
///
/// The child is killed on timeout before the error is returned, so no
/// process outlives the call.
pub async fn capture_output(
    program: &str,
    args: &[&str],
    limit: Duration,
) -> Result<CommandOutput> {
    let cmdline = format!("{} {}", program, args.join(" "));
    debug!("Running: {}", cmdline);

    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| spawn_error(program, e))?;

    let output = match timeout(limit, child.wait_with_output()).await {
        Ok(result) => result.map_err(|e| Error::process_spawn(cmdline.clone(), e.to_string()))?,
        Err(_) => {
            // wait_with_output consumed the child; kill_on_drop already
            // reaped it when the future was dropped by the timeout.
            return Err(Error::timeout(cmdline, limit));
        }
    };

    Ok(CommandOutput {
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        code: output.status.code(),
        success: output.status.success(),
    })
}

fn spawn_error(program: &str, e: std::io::Error) -> Error {
    if e.kind() == std::io::ErrorKind::NotFound {
        Error::tool_not_found(program)
    } else {
        Error::process_spawn(program, e.to_string())
    }
}

/// Event emitted by a streaming subprocess
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessEvent {
    Stdout(String),
    Stderr(String),
    Exited { code: Option<i32> },
}

/// A supervised streaming subprocess.
///
/// The `Child` handle is moved into a dedicated `wait_for_exit` background
/// task that calls `child.wait()`, so the real exit code is captured and the
/// process is always reaped. `StreamProcess` retains a kill channel to
/// request a force-kill, an atomic flag for synchronous `has_exited()`
/// checks, and a [`Notify`] handle so `wait_exit()` can await termination
/// without holding a lock across `.await`.
#[derive(Debug)]
pub struct StreamProcess {
    pid: Option<u32>,
    /// One-shot sender that tells the wait task to force-kill the process.
    /// Consumed on first use (or on drop).
    kill_tx: Option<oneshot::Sender<()>>,
    /// Set to `true` by the wait task once the child has exited.
    exited: Arc<AtomicBool>,
    /// Notified by the wait task immediately after the child exits.
    exit_notify: Arc<Notify>,
}

impl StreamProcess {
    /// Spawn a streaming subprocess.
    ///
    /// Output lines and the final exit event are sent to `event_tx` as they
    /// arrive; the caller never blocks on the subprocess.
    pub fn spawn(
        program: &str,
        args: &[String],
        event_tx: mpsc::Sender<ProcessEvent>,
    ) -> Result<Self> {
        info!("Spawning: {} {}", program, args.join(" "));

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| spawn_error(program, e))?;

        let pid = child.id();
        debug!("{} started with PID: {:?}", program, pid);

        let stdout = child.stdout.take().expect("stdout was configured");
        tokio::spawn(Self::stdout_reader(stdout, event_tx.clone()));

        let stderr = child.stderr.take().expect("stderr was configured");
        tokio::spawn(Self::stderr_reader(stderr, event_tx.clone()));

        let exited = Arc::new(AtomicBool::new(false));
        let exit_notify = Arc::new(Notify::new());
        let (kill_tx, kill_rx) = oneshot::channel::<()>();

        tokio::spawn(Self::wait_for_exit(
            child,
            kill_rx,
            event_tx,
            Arc::clone(&exited),
            Arc::clone(&exit_notify),
        ));

        Ok(Self {
            pid,
            kill_tx: Some(kill_tx),
            exited,
            exit_notify,
        })
    }

    /// Background task: owns `child`, waits for it to exit, emits
    /// `ProcessEvent::Exited`.
    ///
    /// Two ways the task can end:
    /// 1. The process exits naturally — `child.wait()` resolves.
    /// 2. `kill_rx` fires — we kill the child first, then wait for it.
    async fn wait_for_exit(
        mut child: Child,
        kill_rx: oneshot::Receiver<()>,
        event_tx: mpsc::Sender<ProcessEvent>,
        exited: Arc<AtomicBool>,
        exit_notify: Arc<Notify>,
    ) {
        let code: Option<i32> = tokio::select! {
            result = child.wait() => {
                match result {
                    Ok(status) => {
                        debug!("Subprocess exited with status: {:?}", status);
                        status.code()
                    }
                    Err(e) => {
                        error!("Error waiting for subprocess: {}", e);
                        None
                    }
                }
            }
            _ = kill_rx => {
                debug!("Kill signal received, terminating subprocess");
                if let Err(e) = child.kill().await {
                    error!("Failed to kill subprocess: {}", e);
                }
                match child.wait().await {
                    Ok(status) => status.code(),
                    Err(e) => {
                        error!("Error waiting after kill: {}", e);
                        None
                    }
                }
            }
        };

        // Mark exited and wake waiters before sending the event, so
        // has_exited() is true before callers observe Exited.
        exited.store(true, Ordering::Release);
        exit_notify.notify_waiters();

        let _ = event_tx.send(ProcessEvent::Exited { code }).await;
    }

    /// Read lines from stdout and forward as `ProcessEvent::Stdout`.
    ///
    /// Does NOT emit `Exited` — that is the wait task's job, which captures
    /// the real exit code.
    async fn stdout_reader(stdout: tokio::process::ChildStdout, tx: mpsc::Sender<ProcessEvent>) {
        let mut reader = BufReader::new(stdout).lines();

        while let Ok(Some(line)) = reader.next_line().await {
            trace!("stdout: {}", line);
            if tx.send(ProcessEvent::Stdout(line)).await.is_err() {
                debug!("stdout channel closed");
                break;
            }
        }

        debug!("stdout reader finished");
    }

    /// Read lines from stderr and forward as `ProcessEvent::Stderr`.
    async fn stderr_reader(stderr: tokio::process::ChildStderr, tx: mpsc::Sender<ProcessEvent>) {
        let mut reader = BufReader::new(stderr).lines();

        while let Ok(Some(line)) = reader.next_line().await {
            trace!("stderr: {}", line);
            if tx.send(ProcessEvent::Stderr(line)).await.is_err() {
                debug!("stderr channel closed");
                break;
            }
        }

        debug!("stderr reader finished");
    }

    /// Signal the wait task to kill the child.
    ///
    /// The wait task calls `child.kill()` and then `child.wait()`, ensuring
    /// the OS reaps the process before `Exited` is emitted.
    pub fn kill(&mut self) {
        if let Some(tx) = self.kill_tx.take() {
            // Ignore send error — the wait task may have already exited.
            let _ = tx.send(());
        }
    }

    /// Terminate the child (if still running) and block until it has fully
    /// exited, up to `grace`. Returns `true` when the exit was observed.
    ///
    /// Idempotent: calling this on an already-exited process returns
    /// immediately.
    pub async fn shutdown(&mut self, grace: Duration) -> bool {
        if self.has_exited() {
            return true;
        }

        // Race-free pattern: create the notified() future BEFORE the final
        // has_exited() check, so a notification between check and await is
        // not missed.
        let exit_notify = Arc::clone(&self.exit_notify);
        let notified = exit_notify.notified();
        self.kill();
        if self.has_exited() {
            return true;
        }

        match timeout(grace, notified).await {
            Ok(()) => true,
            Err(_) => {
                warn!("Subprocess (pid {:?}) did not exit within {:?}", self.pid, grace);
                false
            }
        }
    }

    /// Wait (bounded) for natural exit without requesting termination.
    pub async fn wait_exit(&self, limit: Duration) -> bool {
        let notified = self.exit_notify.notified();
        if self.has_exited() {
            return true;
        }
        timeout(limit, notified).await.is_ok()
    }

    /// Non-blocking, synchronous exit check backed by the wait task's flag.
    pub fn has_exited(&self) -> bool {
        self.exited.load(Ordering::Acquire)
    }

    pub fn is_running(&self) -> bool {
        !self.has_exited()
    }

    pub fn id(&self) -> Option<u32> {
        self.pid
    }
}

impl Drop for StreamProcess {
    fn drop(&mut self) {
        if !self.has_exited() {
            // Send kill so the wait task tears down the child cleanly.
            // kill_on_drop(true) on the Child is the final safety net.
            if let Some(tx) = self.kill_tx.take() {
                let _ = tx.send(());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_capture_output_success() {
        let out = capture_output("sh", &["-c", "echo hello"], Duration::from_secs(5))
            .await
            .expect("sh must be available");
        assert!(out.success);
        assert_eq!(out.stdout.trim(), "hello");
    }

    #[tokio::test]
    async fn test_capture_output_nonzero_exit() {
        let out = capture_output("sh", &["-c", "echo oops >&2; exit 3"], Duration::from_secs(5))
            .await
            .expect("sh must be available");
        assert!(!out.success);
        assert_eq!(out.code, Some(3));
        assert_eq!(out.stderr.trim(), "oops");
    }

    #[tokio::test]
    async fn test_capture_output_timeout() {
        let err = capture_output("sh", &["-c", "sleep 30"], Duration::from_millis(100))
            .await
            .expect_err("should time out");
        assert!(matches!(err, Error::Timeout { .. }));
    }

    #[tokio::test]
    async fn test_capture_output_missing_tool() {
        let err = capture_output("definitely-not-a-tool", &[], Duration::from_secs(1))
            .await
            .expect_err("should fail to spawn");
        assert!(matches!(err, Error::ToolNotFound { .. }));
    }

    #[tokio::test]
    async fn test_stream_process_lines_and_exit() {
        let (tx, mut rx) = mpsc::channel(32);
        let _process = StreamProcess::spawn(
            "sh",
            &["-c".to_string(), "echo one; echo two".to_string()],
            tx,
        )
        .expect("spawn");

        let mut lines = Vec::new();
        let mut code = None;
        for _ in 0..50 {
            match tokio::time::timeout(Duration::from_millis(200), rx.recv()).await {
                Ok(Some(ProcessEvent::Stdout(line))) => lines.push(line),
                Ok(Some(ProcessEvent::Exited { code: c })) => {
                    code = Some(c);
                    break;
                }
                Ok(Some(_)) => continue,
                _ => break,
            }
        }

        assert_eq!(lines, vec!["one", "two"]);
        assert_eq!(code, Some(Some(0)));
    }

    #[tokio::test]
    async fn test_shutdown_kills_long_running_process() {
        let (tx, mut rx) = mpsc::channel(16);
        let mut process =
            StreamProcess::spawn("sh", &["-c".to_string(), "sleep 60".to_string()], tx)
                .expect("spawn");

        assert!(process.is_running());
        let exited = process.shutdown(Duration::from_secs(5)).await;
        assert!(exited, "shutdown should observe the exit");
        assert!(process.has_exited());

        // The wait task must still emit Exited after the kill.
        let mut got_exited = false;
        for _ in 0..30 {
            match tokio::time::timeout(Duration::from_millis(100), rx.recv()).await {
                Ok(Some(ProcessEvent::Exited { .. })) => {
                    got_exited = true;
                    break;
                }
                Ok(Some(_)) => continue,
                _ => break,
            }
        }
        assert!(got_exited);
    }

    #[tokio::test]
    async fn test_shutdown_is_idempotent() {
        let (tx, _rx) = mpsc::channel(16);
        let mut process = StreamProcess::spawn("sh", &["-c".to_string(), "true".to_string()], tx)
            .expect("spawn");

        assert!(process.shutdown(Duration::from_secs(5)).await);
        assert!(process.shutdown(Duration::from_secs(5)).await);
    }

    #[tokio::test]
    async fn test_has_exited_after_natural_exit() {
        let (tx, mut rx) = mpsc::channel(16);
        let process = StreamProcess::spawn("sh", &["-c".to_string(), "exit 7".to_string()], tx)
            .expect("spawn");

        let mut code = None;
        for _ in 0..50 {
            match tokio::time::timeout(Duration::from_millis(200), rx.recv()).await {
                Ok(Some(ProcessEvent::Exited { code: c })) => {
                    code = Some(c);
                    break;
                }
                Ok(Some(_)) => continue,
                _ => break,
            }
        }

        assert_eq!(code, Some(Some(7)));
        assert!(process.has_exited());
    }
}
