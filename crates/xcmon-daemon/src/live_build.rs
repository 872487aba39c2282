//! Live builds via `xcodebuild`.
//!
//! Runs a foreground build for a project, feeding every output line through
//! the diagnostic extractor as it is flushed. Builds are single-flight per
//! project: a second request for the same project is rejected or waits,
//! depending on the caller's [`BusyPolicy`].

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Local;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::time::{timeout, timeout_at, Instant};

use xcmon_core::extract::{DiagnosticParser, ParseContext};
use xcmon_core::prelude::*;
use xcmon_core::{Diagnostic, SourceKind};

use crate::process::{capture_output, ProcessEvent, StreamProcess};

/// Timeout for `xcodebuild -list`
const LIST_TIMEOUT: Duration = Duration::from_secs(30);

/// Grace period for killing a timed-out build
const KILL_GRACE: Duration = Duration::from_secs(5);

/// What to do when a build is already running for the same project
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BusyPolicy {
    /// Fail immediately with `Error::Busy`
    #[default]
    Reject,

    /// Wait up to the given duration for the running build to finish,
    /// then fail with `Error::Busy`
    Wait(Duration),
}

/// A live build request
#[derive(Debug, Clone)]
pub struct LiveBuildRequest {
    /// `.xcworkspace` or `.xcodeproj` bundle to build
    pub project_file: PathBuf,

    pub project_name: String,

    /// Scheme to build; resolved via `xcodebuild -list` when omitted
    pub scheme: Option<String>,

    /// Overall wall-clock limit for the build
    pub timeout: Duration,

    pub policy: BusyPolicy,
}

/// Result of a live build
#[derive(Debug, Clone, Serialize)]
pub struct LiveBuildReport {
    /// Diagnostics extracted from the build output, in emission order
    pub diagnostics: Vec<Diagnostic>,

    /// True when the build hit its time limit and was killed; the
    /// diagnostics collected up to that point are still returned
    pub timed_out: bool,

    /// Total output lines observed (stdout + stderr)
    pub raw_line_count: usize,

    /// Exit code, when the build ran to completion
    pub exit_code: Option<i32>,
}

/// Runs live builds, one at a time per project
#[derive(Debug, Default)]
pub struct LiveBuildRunner {
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl LiveBuildRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run a build to completion (or timeout) and return the report.
    pub async fn run(&self, request: LiveBuildRequest) -> Result<LiveBuildReport> {
        let lock = self.project_lock(&request.project_name);

        let _guard = match request.policy {
            BusyPolicy::Reject => lock
                .try_lock()
                .map_err(|_| Error::busy(&request.project_name))?,
            BusyPolicy::Wait(limit) => timeout(limit, lock.lock())
                .await
                .map_err(|_| Error::busy(&request.project_name))?,
        };

        let scheme = match &request.scheme {
            Some(scheme) => scheme.clone(),
            None => default_scheme(&request.project_file).await?,
        };

        let args = build_args(&request.project_file, &scheme);
        info!(
            "Starting live build: {} (scheme {})",
            request.project_name, scheme
        );

        let (event_tx, event_rx) = mpsc::channel(1024);
        let process = StreamProcess::spawn("xcodebuild", &args, event_tx)?;

        let ctx = ParseContext::new(&request.project_name, SourceKind::LiveBuild, Local::now());
        let report = stream_build(process, event_rx, ctx, request.timeout).await?;

        info!(
            "Live build finished: {} ({} diagnostics, {} lines, timed_out={})",
            request.project_name,
            report.diagnostics.len(),
            report.raw_line_count,
            report.timed_out
        );
        Ok(report)
    }

    fn project_lock(&self, project: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        Arc::clone(locks.entry(project.to_string()).or_default())
    }
}

/// Consume a build's output events, extracting diagnostics as lines flush.
///
/// On timeout the subprocess is killed, the kill is waited on, any already
/// queued lines are drained, and the partial report is returned with
/// `timed_out = true`. A timed-out build that produced no output at all is
/// reported as a `Timeout` error instead of an empty success.
async fn stream_build(
    mut process: StreamProcess,
    mut events: mpsc::Receiver<ProcessEvent>,
    ctx: ParseContext,
    limit: Duration,
) -> Result<LiveBuildReport> {
    let operation = format!("xcodebuild build {}", ctx.project_name);
    let mut parser = DiagnosticParser::new(ctx);
    let mut diagnostics = Vec::new();
    let mut raw_line_count = 0usize;
    let mut timed_out = false;
    let mut exit_code = None;

    let deadline = Instant::now() + limit;

    loop {
        match timeout_at(deadline, events.recv()).await {
            Ok(Some(ProcessEvent::Stdout(line))) | Ok(Some(ProcessEvent::Stderr(line))) => {
                raw_line_count += 1;
                if let Some(diag) = parser.feed(&line) {
                    diagnostics.push(diag);
                }
            }
            Ok(Some(ProcessEvent::Exited { code })) => {
                // The exit event comes from the wait task; the reader tasks
                // may still be flushing queued lines. Keep receiving until
                // the channel closes so none are lost.
                exit_code = code;
            }
            Ok(None) => break,
            Err(_) => {
                warn!("Build timed out after {:?}, killing xcodebuild", limit);
                timed_out = true;
                process.shutdown(KILL_GRACE).await;
                // Drain lines that were already queued before the kill.
                while let Ok(event) = events.try_recv() {
                    match event {
                        ProcessEvent::Stdout(line) | ProcessEvent::Stderr(line) => {
                            raw_line_count += 1;
                            if let Some(diag) = parser.feed(&line) {
                                diagnostics.push(diag);
                            }
                        }
                        ProcessEvent::Exited { code } => exit_code = code,
                    }
                }
                break;
            }
        }
    }

    if let Some(diag) = parser.finish() {
        diagnostics.push(diag);
    }

    if timed_out && raw_line_count == 0 && diagnostics.is_empty() {
        return Err(Error::timeout(operation, limit));
    }

    Ok(LiveBuildReport {
        diagnostics,
        timed_out,
        raw_line_count,
        exit_code,
    })
}

/// `-workspace` for `.xcworkspace` bundles, `-project` otherwise.
fn build_args(project_file: &Path, scheme: &str) -> Vec<String> {
    let flag = if project_file
        .extension()
        .map(|ext| ext == "xcworkspace")
        .unwrap_or(false)
    {
        "-workspace"
    } else {
        "-project"
    };

    vec![
        flag.to_string(),
        project_file.to_string_lossy().to_string(),
        "-scheme".to_string(),
        scheme.to_string(),
        "build".to_string(),
    ]
}

/// List the schemes a project bundle declares, via `xcodebuild -list`.
pub async fn list_schemes(project_file: &Path) -> Result<Vec<String>> {
    let flag = if project_file
        .extension()
        .map(|ext| ext == "xcworkspace")
        .unwrap_or(false)
    {
        "-workspace"
    } else {
        "-project"
    };
    let path = project_file.to_string_lossy().to_string();

    let output = capture_output("xcodebuild", &["-list", flag, &path], LIST_TIMEOUT).await?;
    if !output.success {
        return Err(Error::process_failure(
            format!("xcodebuild -list {path}"),
            output.code,
            output.stderr,
        ));
    }

    Ok(parse_schemes(&output.stdout))
}

/// First declared scheme, used when the caller does not name one.
async fn default_scheme(project_file: &Path) -> Result<String> {
    let schemes = list_schemes(project_file).await?;
    schemes.into_iter().next().ok_or_else(|| {
        Error::config(format!(
            "no schemes declared in {}",
            project_file.display()
        ))
    })
}

/// Parse the `Schemes:` section of `xcodebuild -list` output.
fn parse_schemes(output: &str) -> Vec<String> {
    let mut schemes = Vec::new();
    let mut in_section = false;

    for line in output.lines() {
        let trimmed = line.trim();
        if trimmed == "Schemes:" {
            in_section = true;
            continue;
        }
        if in_section {
            if trimmed.is_empty() || trimmed.ends_with(':') {
                break;
            }
            schemes.push(trimmed.to_string());
        }
    }

    schemes
}

#[cfg(test)]
mod tests {
    use super::*;
    use xcmon_core::Severity;

    fn test_ctx() -> ParseContext {
        ParseContext::new("MyApp", SourceKind::LiveBuild, Local::now())
    }

    fn spawn_script(script: &str) -> (StreamProcess, mpsc::Receiver<ProcessEvent>) {
        let (tx, rx) = mpsc::channel(1024);
        let process = StreamProcess::spawn("sh", &["-c".to_string(), script.to_string()], tx)
            .expect("spawn");
        (process, rx)
    }

    #[test]
    fn test_parse_schemes() {
        let output = "Information about project \"MyApp\":\n\
                      \x20   Targets:\n\
                      \x20       MyApp\n\
                      \n\
                      \x20   Schemes:\n\
                      \x20       MyApp\n\
                      \x20       MyApp-Staging\n\
                      \n";
        assert_eq!(parse_schemes(output), vec!["MyApp", "MyApp-Staging"]);
    }

    #[test]
    fn test_parse_schemes_none_declared() {
        assert!(parse_schemes("Information about project \"Empty\":\n").is_empty());
    }

    #[test]
    fn test_build_args_workspace_vs_project() {
        let ws = build_args(Path::new("/x/MyApp.xcworkspace"), "MyApp");
        assert_eq!(ws[0], "-workspace");

        let proj = build_args(Path::new("/x/MyApp.xcodeproj"), "MyApp");
        assert_eq!(proj[0], "-project");
        assert_eq!(proj[2], "-scheme");
        assert_eq!(proj[4], "build");
    }

    #[tokio::test]
    async fn test_stream_build_extracts_diagnostics() {
        let script = "echo 'CompileSwift normal arm64'; \
                      echo '/src/main.swift:10:5: error: cannot find foo'; \
                      echo 'ld: warning: directory not found'; \
                      exit 65";
        let (process, rx) = spawn_script(script);

        let report = stream_build(process, rx, test_ctx(), Duration::from_secs(10))
            .await
            .expect("report");

        assert!(!report.timed_out);
        assert_eq!(report.exit_code, Some(65));
        assert_eq!(report.raw_line_count, 3);
        assert_eq!(report.diagnostics.len(), 2);
        assert_eq!(report.diagnostics[0].severity, Severity::Error);
        assert_eq!(report.diagnostics[1].severity, Severity::Warning);
    }

    #[tokio::test]
    async fn test_stream_build_timeout_returns_partial() {
        let script = "echo '/src/a.swift:1:1: error: partial result'; sleep 60";
        let (process, rx) = spawn_script(script);

        let report = stream_build(process, rx, test_ctx(), Duration::from_millis(500))
            .await
            .expect("partial report");

        assert!(report.timed_out);
        assert_eq!(report.diagnostics.len(), 1);
        assert_eq!(report.diagnostics[0].message, "partial result");
    }

    #[tokio::test]
    async fn test_stream_build_timeout_leaves_no_child() {
        let (process, rx) = spawn_script("echo '/src/a.swift:1:1: error: pre-timeout'; sleep 60");
        let pid = process.id().expect("pid");

        let report = stream_build(process, rx, test_ctx(), Duration::from_millis(500))
            .await
            .expect("partial report");
        assert!(report.timed_out);

        // The killed child must be reaped by the time the report is
        // returned, so signalling its pid fails.
        let alive = std::process::Command::new("kill")
            .args(["-0", &pid.to_string()])
            .status()
            .expect("kill status")
            .success();
        assert!(!alive, "pid {pid} survived the timeout");
    }

    #[tokio::test]
    async fn test_stream_build_silent_timeout_is_error() {
        let (process, rx) = spawn_script("sleep 60");

        let err = stream_build(process, rx, test_ctx(), Duration::from_millis(300))
            .await
            .expect_err("silent timeout must error");
        assert!(matches!(err, Error::Timeout { .. }));
    }

    #[tokio::test]
    async fn test_busy_policy_reject() {
        let runner = LiveBuildRunner::new();
        let lock = runner.project_lock("MyApp");
        let _held = lock.lock().await;

        let request = LiveBuildRequest {
            project_file: PathBuf::from("/x/MyApp.xcodeproj"),
            project_name: "MyApp".to_string(),
            scheme: Some("MyApp".to_string()),
            timeout: Duration::from_secs(1),
            policy: BusyPolicy::Reject,
        };

        let err = runner.run(request).await.expect_err("must be busy");
        assert!(err.is_busy());
    }

    #[tokio::test]
    async fn test_busy_policy_wait_expires() {
        let runner = LiveBuildRunner::new();
        let lock = runner.project_lock("MyApp");
        let _held = lock.lock().await;

        let request = LiveBuildRequest {
            project_file: PathBuf::from("/x/MyApp.xcodeproj"),
            project_name: "MyApp".to_string(),
            scheme: Some("MyApp".to_string()),
            timeout: Duration::from_secs(1),
            policy: BusyPolicy::Wait(Duration::from_millis(200)),
        };

        let err = runner.run(request).await.expect_err("wait must expire");
        assert!(err.is_busy());
    }

    #[tokio::test]
    async fn test_different_projects_do_not_conflict() {
        let runner = LiveBuildRunner::new();
        let lock_a = runner.project_lock("AppA");
        let _held = lock_a.lock().await;

        // A different project's lock is unaffected.
        let lock_b = runner.project_lock("AppB");
        assert!(lock_b.try_lock().is_ok());
    }

    #[tokio::test]
    #[ignore] // Requires Xcode
    async fn test_list_schemes_integration() {
        match list_schemes(Path::new("MyApp.xcodeproj")).await {
            Ok(schemes) => println!("schemes: {schemes:?}"),
            Err(Error::ToolNotFound { .. }) => {
                println!("xcodebuild not found - skipping integration test");
            }
            Err(e) => panic!("Unexpected error: {e:?}"),
        }
    }
}
