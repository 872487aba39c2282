//! Streaming log monitor sessions.
//!
//! A monitor session owns one `log stream` subprocess and one reader task.
//! The reader task is the sole writer to the session's ring buffers; live
//! subscribers get every line through a broadcast channel regardless of
//! buffer eviction.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Local};
use tokio::sync::{broadcast, mpsc};

use xcmon_core::extract::{self, ParseContext};
use xcmon_core::prelude::*;
use xcmon_core::unified;
use xcmon_core::{Diagnostic, LogLine, RingBuffer, SourceKind};

use crate::devices::app_predicate;
use crate::process::{ProcessEvent, StreamProcess};

/// Processes whose output is relevant to builds and tooling
pub const XCODE_PROCESSES: &[&str] = &[
    "Xcode",
    "xcodebuild",
    "swift",
    "swift-frontend",
    "clang",
    "ld",
    "codesign",
    "Simulator",
    "SourceKitService",
];

/// Default retained-window sizes
pub const DEFAULT_LINE_CAPACITY: usize = 2000;
pub const DEFAULT_DIAGNOSTIC_CAPACITY: usize = 500;

/// Grace period for subprocess teardown on stop()
const STOP_GRACE: Duration = Duration::from_secs(5);

/// Broadcast channel depth for live subscribers
const BROADCAST_CAPACITY: usize = 1024;

/// Lifecycle state of a monitor session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorStatus {
    Running,
    Stopped,
    /// The subprocess exited without a stop request. The retained buffer
    /// stays queryable; the session is not restarted.
    Error,
}

/// What a monitor session should run and retain
#[derive(Debug, Clone)]
pub struct MonitorSpec {
    pub program: String,
    pub args: Vec<String>,

    /// Label used in logs and status output
    pub label: String,

    /// Where extracted diagnostics are attributed
    pub source_kind: SourceKind,

    pub line_capacity: usize,
    pub diagnostic_capacity: usize,
}

impl MonitorSpec {
    /// Monitor the host unified log, scoped to build-relevant processes.
    pub fn xcode_console() -> Self {
        let processes: Vec<String> = XCODE_PROCESSES
            .iter()
            .map(|p| format!("process == \"{p}\""))
            .collect();
        let predicate = format!("({})", processes.join(" OR "));

        Self {
            program: "log".to_string(),
            args: vec![
                "stream".to_string(),
                "--style".to_string(),
                "syslog".to_string(),
                "--predicate".to_string(),
                predicate,
            ],
            label: "xcode-console".to_string(),
            source_kind: SourceKind::Console,
            line_capacity: DEFAULT_LINE_CAPACITY,
            diagnostic_capacity: DEFAULT_DIAGNOSTIC_CAPACITY,
        }
    }

    /// Monitor one device's log stream, optionally scoped to an app.
    pub fn device(udid: &str, app_bundle_id: Option<&str>) -> Self {
        let mut args: Vec<String> = [
            "simctl", "spawn", udid, "log", "stream", "--style", "syslog", "--level", "debug",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();

        if let Some(bundle_id) = app_bundle_id {
            args.push("--predicate".to_string());
            args.push(app_predicate(bundle_id));
        }

        Self {
            program: "xcrun".to_string(),
            args,
            label: format!("device-{udid}"),
            source_kind: SourceKind::Device,
            line_capacity: DEFAULT_LINE_CAPACITY,
            diagnostic_capacity: DEFAULT_DIAGNOSTIC_CAPACITY,
        }
    }
}

/// Handle to a running monitor session
#[derive(Debug)]
pub struct MonitorHandle {
    label: String,
    status: Arc<Mutex<MonitorStatus>>,
    lines: Arc<Mutex<RingBuffer<LogLine>>>,
    diagnostics: Arc<Mutex<RingBuffer<Diagnostic>>>,
    broadcast: broadcast::Sender<LogLine>,
    stop_requested: Arc<AtomicBool>,
    process: StreamProcess,
}

impl MonitorHandle {
    /// Spawn the subprocess and its reader task.
    pub fn start(spec: MonitorSpec) -> Result<Self> {
        info!("Starting monitor session: {}", spec.label);

        let (event_tx, event_rx) = mpsc::channel(256);
        let process = StreamProcess::spawn(&spec.program, &spec.args, event_tx)?;

        let status = Arc::new(Mutex::new(MonitorStatus::Running));
        let lines = Arc::new(Mutex::new(RingBuffer::new(spec.line_capacity)));
        let diagnostics = Arc::new(Mutex::new(RingBuffer::new(spec.diagnostic_capacity)));
        let (broadcast_tx, _) = broadcast::channel(BROADCAST_CAPACITY);
        let stop_requested = Arc::new(AtomicBool::new(false));

        tokio::spawn(reader_task(
            event_rx,
            spec.label.clone(),
            spec.source_kind,
            Arc::clone(&status),
            Arc::clone(&lines),
            Arc::clone(&diagnostics),
            broadcast_tx.clone(),
            Arc::clone(&stop_requested),
        ));

        Ok(Self {
            label: spec.label,
            status,
            lines,
            diagnostics,
            broadcast: broadcast_tx,
            stop_requested,
            process,
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn status(&self) -> MonitorStatus {
        *self.status.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Subscribe to the live line stream.
    ///
    /// Subscribers receive every line from subscription onward; a slow
    /// subscriber that lags past the channel depth misses lines but the
    /// retained buffer is unaffected.
    pub fn subscribe(&self) -> broadcast::Receiver<LogLine> {
        self.broadcast.subscribe()
    }

    /// Newest retained lines, optionally bounded by a start time.
    ///
    /// Returned oldest-to-newest, independent of subscriber delivery.
    pub fn recent(&self, since: Option<DateTime<Local>>, count: usize) -> Vec<LogLine> {
        let lines = self.lines.lock().unwrap_or_else(|e| e.into_inner());
        lines.newest_matching(count, |line| match since {
            Some(cutoff) => line.timestamp >= cutoff,
            None => true,
        })
    }

    /// Newest retained diagnostics extracted from the stream.
    pub fn recent_diagnostics(&self, count: usize) -> Vec<Diagnostic> {
        let diags = self.diagnostics.lock().unwrap_or_else(|e| e.into_inner());
        diags.newest_matching(count, |_| true)
    }

    /// Terminate the subprocess and wait (bounded) for full exit.
    ///
    /// Idempotent: stopping an already-stopped session is a no-op. The
    /// retained buffers stay queryable after stop.
    pub async fn stop(&mut self) {
        self.stop_with_grace(STOP_GRACE).await;
    }

    async fn stop_with_grace(&mut self, grace: Duration) {
        if self.status() != MonitorStatus::Running {
            return;
        }

        debug!("Stopping monitor session: {}", self.label);
        self.stop_requested.store(true, Ordering::Release);
        let observed = self.process.shutdown(grace).await;

        let mut status = self.status.lock().unwrap_or_else(|e| e.into_inner());
        if observed {
            *status = MonitorStatus::Stopped;
        } else {
            // The exit was not observed within the grace period; claiming a
            // clean stop would be a lie. The reader task records Stopped if
            // the exit eventually lands.
            warn!(
                "[{}] subprocess (pid {:?}) still running after {:?}",
                self.label,
                self.process.id(),
                grace
            );
            *status = MonitorStatus::Error;
        }
    }
}

/// Reader task: sole writer to the session's ring buffers.
#[allow(clippy::too_many_arguments)]
async fn reader_task(
    mut events: mpsc::Receiver<ProcessEvent>,
    label: String,
    source_kind: SourceKind,
    status: Arc<Mutex<MonitorStatus>>,
    lines: Arc<Mutex<RingBuffer<LogLine>>>,
    diagnostics: Arc<Mutex<RingBuffer<Diagnostic>>>,
    broadcast: broadcast::Sender<LogLine>,
    stop_requested: Arc<AtomicBool>,
) {
    static NEXT_DIAG_ID: AtomicU64 = AtomicU64::new(1);

    while let Some(event) = events.recv().await {
        match event {
            ProcessEvent::Stdout(raw) => {
                if unified::is_stream_preamble(&raw) {
                    continue;
                }
                let Some(line) = unified::parse_line(&raw) else {
                    continue;
                };

                // Classify before buffering so a diagnostic carries the
                // line's own timestamp.
                let ctx = ParseContext::new(line.process.clone(), source_kind, line.timestamp);
                if let Some(mut diag) = extract::parse_line(&line.text, &ctx) {
                    diag.id = NEXT_DIAG_ID.fetch_add(1, Ordering::Relaxed);
                    let mut diags = diagnostics.lock().unwrap_or_else(|e| e.into_inner());
                    diags.push(diag);
                }

                {
                    let mut buffer = lines.lock().unwrap_or_else(|e| e.into_inner());
                    buffer.push(line.clone());
                }
                // Errors only mean no subscribers are connected.
                let _ = broadcast.send(line);
            }
            ProcessEvent::Stderr(raw) => {
                debug!("[{}] stderr: {}", label, raw);
            }
            ProcessEvent::Exited { code } => {
                let mut current = status.lock().unwrap_or_else(|e| e.into_inner());
                if stop_requested.load(Ordering::Acquire) {
                    *current = MonitorStatus::Stopped;
                } else {
                    warn!(
                        "[{}] log stream exited unexpectedly with code {:?}",
                        label, code
                    );
                    *current = MonitorStatus::Error;
                }
                // Keep receiving until the channel closes: the reader tasks
                // may still be flushing lines queued before the exit.
            }
        }
    }

    debug!("[{}] reader task finished", label);
}
