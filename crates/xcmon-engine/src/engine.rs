//! The query facade.
//!
//! `Engine` composes the locator, scanner, build runner, monitor registry
//! and device layer into the surface a dispatch layer (or the CLI) calls.

use std::time::Duration;

use chrono::{DateTime, Duration as ChronoDuration, Local};

use xcmon_core::locator::{DiscoveryReport, ProjectLocator};
use xcmon_core::prelude::*;
use xcmon_core::types::ProjectInfo;
use xcmon_core::unified;
use xcmon_core::{Diagnostic, LogLine};
use xcmon_daemon::{
    capture_output, device_debug_logs, device_logs, list_devices, DeviceInventory,
    LiveBuildReport, LiveBuildRequest, LiveBuildRunner, MonitorSpec, ToolAvailability,
    DEBUG_CAPTURE_WINDOW, XCODE_PROCESSES,
};

use crate::analysis::{analyze, AnalysisReport};
use crate::registry::{MonitorRegistry, SessionId, SessionSummary};
use crate::scanner::BuildLogScanner;
use crate::settings::Settings;

/// Timeout for one-shot `log show` queries
const LOG_SHOW_TIMEOUT: Duration = Duration::from_secs(30);

/// Facade over all query operations
#[derive(Debug)]
pub struct Engine {
    settings: Settings,
    locator: ProjectLocator,
    scanner: BuildLogScanner,
    runner: LiveBuildRunner,
    registry: MonitorRegistry,
    tools: ToolAvailability,
}

impl Engine {
    pub fn new(settings: Settings) -> Self {
        let locator = ProjectLocator::new(settings.locator_config());
        Self {
            settings,
            locator,
            scanner: BuildLogScanner::new(),
            runner: LiveBuildRunner::new(),
            registry: MonitorRegistry::new(),
            tools: ToolAvailability::check(),
        }
    }

    pub fn tools(&self) -> &ToolAvailability {
        &self.tools
    }

    /// All discovered projects, newest first.
    pub fn list_projects(&self) -> DiscoveryReport {
        self.locator.discover()
    }

    /// Diagnostics from a project's newest static build log.
    ///
    /// Without a name, the most recently built project is used.
    pub async fn build_errors(&self, project: Option<&str>) -> Result<Vec<Diagnostic>> {
        let info = self.resolve_project(project)?;
        let diagnostics = self.scanner.static_diagnostics(&info).await?;
        Ok(diagnostics.as_ref().clone())
    }

    /// Run a foreground build and return its diagnostics.
    pub async fn run_live_build(
        &self,
        project: &str,
        scheme: Option<&str>,
        timeout: Option<Duration>,
    ) -> Result<LiveBuildReport> {
        if let Some(message) = self.tools.builds_unavailable_message() {
            return Err(Error::config(message));
        }

        let info = self.resolve_project(Some(project))?;
        let project_file = self
            .locator
            .find_project_file(&info.name)
            .ok_or_else(|| Error::project_not_found(&info.name))?;

        let request = LiveBuildRequest {
            project_file,
            project_name: info.name,
            scheme: scheme.map(str::to_string),
            timeout: timeout.unwrap_or_else(|| self.settings.build_timeout()),
            policy: self.settings.busy_policy(),
        };
        self.runner.run(request).await
    }

    /// Build-related diagnostics observed by live monitor sessions within
    /// the given window, scoped to one project.
    ///
    /// Requires a console monitor session; without one the result is empty.
    pub async fn live_build_errors(
        &self,
        project: &str,
        since_minutes: u32,
    ) -> Result<Vec<Diagnostic>> {
        let cutoff = window_start(since_minutes);
        let mut diagnostics = self
            .registry
            .all_recent_diagnostics(self.settings.diagnostic_buffer_capacity)
            .await;

        diagnostics.retain(|diag| {
            diag.timestamp >= cutoff
                && (diag.raw_context.contains(project) || diag.project_name == project)
        });
        Ok(diagnostics)
    }

    /// One-shot recent host console logs from build-relevant processes.
    pub async fn console_logs(
        &self,
        since_minutes: u32,
        filter: Option<&str>,
    ) -> Result<Vec<LogLine>> {
        if !self.tools.unified_log_available() {
            return Err(Error::tool_not_found("log"));
        }

        let window = format!("{since_minutes}m");
        let processes: Vec<String> = XCODE_PROCESSES
            .iter()
            .map(|p| format!("process == \"{p}\""))
            .collect();
        let predicate = format!("({})", processes.join(" OR "));

        let args = [
            "show", "--last", &window, "--style", "syslog", "--predicate", &predicate,
        ];
        let output = capture_output("log", &args, LOG_SHOW_TIMEOUT).await?;
        if !output.success {
            return Err(Error::process_failure(
                "log show",
                output.code,
                output.stderr,
            ));
        }

        let lines = output
            .stdout
            .lines()
            .filter_map(unified::parse_line)
            .filter(|line| match filter {
                Some(needle) => line.matches_filter(needle),
                None => true,
            })
            .collect();
        Ok(lines)
    }

    /// Merged simulator + physical device inventory.
    pub async fn devices(&self) -> Result<DeviceInventory> {
        if let Some(message) = self.tools.devices_unavailable_message() {
            return Err(Error::config(message));
        }
        list_devices().await
    }

    /// One-shot recent logs from a device.
    pub async fn device_logs(
        &self,
        udid: &str,
        count: usize,
        since_minutes: u32,
    ) -> Result<Vec<LogLine>> {
        device_logs(udid, count, since_minutes).await
    }

    /// Short debug-level capture from a device, optionally scoped to an app.
    pub async fn device_debug_logs(
        &self,
        udid: &str,
        app_bundle_id: Option<&str>,
        count: usize,
    ) -> Result<Vec<LogLine>> {
        self.require_device(udid).await?;
        device_debug_logs(udid, app_bundle_id, count, DEBUG_CAPTURE_WINDOW).await
    }

    /// Start monitoring the host console, scoped to build processes.
    pub async fn start_console_monitoring(&self) -> Result<SessionId> {
        if !self.tools.unified_log_available() {
            return Err(Error::tool_not_found("log"));
        }
        self.registry.start(self.sized(MonitorSpec::xcode_console())).await
    }

    /// Start monitoring one device's log stream.
    ///
    /// The UDID is validated against the inventory before anything is
    /// spawned.
    pub async fn start_device_monitoring(
        &self,
        udid: &str,
        app_bundle_id: Option<&str>,
    ) -> Result<SessionId> {
        self.require_device(udid).await?;
        self.registry
            .start(self.sized(MonitorSpec::device(udid, app_bundle_id)))
            .await
    }

    pub async fn stop_monitoring(&self, id: SessionId) -> Result<()> {
        self.registry.stop(id).await
    }

    /// Newest retained lines from a monitor session.
    pub async fn monitor_recent(
        &self,
        id: SessionId,
        since_minutes: Option<u32>,
        count: usize,
    ) -> Result<Vec<LogLine>> {
        let since = since_minutes.map(window_start);
        self.registry.recent(id, since, count).await
    }

    pub async fn sessions(&self) -> Vec<SessionSummary> {
        self.registry.list().await
    }

    /// Newest diagnostics extracted across all monitor sessions.
    pub async fn registry_diagnostics(&self, count: usize) -> Vec<Diagnostic> {
        self.registry.all_recent_diagnostics(count).await
    }

    /// Analyze a project's latest build log.
    pub async fn analyze_project(&self, project: &str) -> Result<AnalysisReport> {
        let info = self.resolve_project(Some(project))?;
        let diagnostics = self.scanner.static_diagnostics(&info).await?;
        Ok(analyze(&info.name, info.last_modified, &diagnostics))
    }

    /// Stop all monitor sessions. Called at shutdown.
    pub async fn shutdown(&self) {
        self.registry.stop_all().await;
    }

    fn resolve_project(&self, name: Option<&str>) -> Result<ProjectInfo> {
        match name {
            Some(name) => self
                .locator
                .find_project(name)
                .ok_or_else(|| Error::project_not_found(name)),
            None => self
                .locator
                .most_recent()
                .ok_or_else(|| Error::project_not_found("<most recent>")),
        }
    }

    async fn require_device(&self, udid: &str) -> Result<()> {
        let inventory = list_devices().await?;
        if inventory.find(udid).is_none() {
            return Err(Error::device_not_found(udid));
        }
        Ok(())
    }

    /// Apply configured buffer capacities to a monitor spec.
    fn sized(&self, mut spec: MonitorSpec) -> MonitorSpec {
        spec.line_capacity = self.settings.line_buffer_capacity;
        spec.diagnostic_capacity = self.settings.diagnostic_buffer_capacity;
        spec
    }
}

fn window_start(since_minutes: u32) -> DateTime<Local> {
    Local::now() - ChronoDuration::minutes(i64::from(since_minutes))
}
