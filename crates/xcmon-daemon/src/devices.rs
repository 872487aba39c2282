//! Device inventory and device log acquisition
//!
//! Merges two inventory sources: `xcrun simctl list devices --json` for
//! simulators and `xcrun devicectl list devices` for physical hardware.
//! Either source failing degrades the result instead of failing it.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use xcmon_core::prelude::*;
use xcmon_core::types::{Device, DeviceKind, DeviceState};
use xcmon_core::unified;
use xcmon_core::LogLine;

use crate::process::{capture_output, ProcessEvent, StreamProcess};

/// Default timeout for inventory commands
const INVENTORY_TIMEOUT: Duration = Duration::from_secs(10);

/// Default timeout for one-shot `log show` queries
const LOG_SHOW_TIMEOUT: Duration = Duration::from_secs(30);

/// How long a debug-log capture keeps its stream open
pub const DEBUG_CAPTURE_WINDOW: Duration = Duration::from_secs(5);

/// Grace period when tearing down a capture stream
const CAPTURE_SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Result of an inventory scan
#[derive(Debug, Clone, Default, Serialize)]
pub struct DeviceInventory {
    /// Known devices, deduplicated by UDID
    pub devices: Vec<Device>,

    /// True when one of the inventory sources failed
    pub degraded: bool,

    /// Human-readable notes about failed sources
    pub warnings: Vec<String>,
}

impl DeviceInventory {
    /// Find a device by UDID (case-insensitive).
    pub fn find(&self, udid: &str) -> Option<&Device> {
        let lower = udid.to_lowercase();
        self.devices.iter().find(|d| d.udid.to_lowercase() == lower)
    }
}

/// List all known devices, merging both inventory sources.
pub async fn list_devices() -> Result<DeviceInventory> {
    list_devices_with_timeout(INVENTORY_TIMEOUT).await
}

/// List devices with a custom per-source timeout.
pub async fn list_devices_with_timeout(limit: Duration) -> Result<DeviceInventory> {
    let simulators = simulator_devices(limit).await;
    let physical = physical_devices(limit).await;
    let inventory = merge_inventory(simulators, physical)?;

    info!(
        "Discovered {} devices ({} warnings)",
        inventory.devices.len(),
        inventory.warnings.len()
    );
    Ok(inventory)
}

/// Simulator inventory via `simctl list devices --json`.
async fn simulator_devices(limit: Duration) -> Result<Vec<Device>> {
    let output = capture_output("xcrun", &["simctl", "list", "devices", "--json"], limit).await?;
    if !output.success {
        return Err(Error::process_failure(
            "xcrun simctl list devices",
            output.code,
            output.stderr.trim().to_string(),
        ));
    }
    parse_simctl_output(&output.stdout)
}

/// Physical device inventory via `devicectl list devices`.
async fn physical_devices(limit: Duration) -> Result<Vec<Device>> {
    let output = capture_output("xcrun", &["devicectl", "list", "devices"], limit).await?;
    if !output.success {
        return Err(Error::process_failure(
            "xcrun devicectl list devices",
            output.code,
            output.stderr.trim().to_string(),
        ));
    }
    Ok(parse_devicectl_output(&output.stdout))
}

/// Merge the two inventory sources, deduplicating by UDID.
///
/// A UDID reported by both sources keeps the simulator record. One failed
/// source degrades the inventory with a warning; both failing is an error.
fn merge_inventory(
    simulators: Result<Vec<Device>>,
    physical: Result<Vec<Device>>,
) -> Result<DeviceInventory> {
    if let (Err(sim), Err(phys)) = (&simulators, &physical) {
        return Err(Error::process_failure(
            "device inventory",
            None,
            format!("simulators: {sim}; physical devices: {phys}"),
        ));
    }

    let mut inventory = DeviceInventory::default();
    let mut by_udid: HashMap<String, Device> = HashMap::new();

    match simulators {
        Ok(devices) => {
            for device in devices {
                by_udid.insert(device.udid.clone(), device);
            }
        }
        Err(e) => {
            inventory.degraded = true;
            inventory
                .warnings
                .push(format!("simulator inventory unavailable: {e}"));
        }
    }

    match physical {
        Ok(devices) => {
            for device in devices {
                by_udid.entry(device.udid.clone()).or_insert(device);
            }
        }
        Err(e) => {
            inventory.degraded = true;
            inventory
                .warnings
                .push(format!("physical device inventory unavailable: {e}"));
        }
    }

    inventory.devices = by_udid.into_values().collect();
    inventory
        .devices
        .sort_by(|a, b| a.name.cmp(&b.name).then(a.udid.cmp(&b.udid)));
    Ok(inventory)
}

#[derive(Debug, Deserialize)]
struct SimctlList {
    #[serde(default)]
    devices: HashMap<String, Vec<SimctlDevice>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SimctlDevice {
    udid: String,
    name: String,
    state: String,
    #[serde(default)]
    is_available: bool,
}

/// Parse `simctl list devices --json` output.
///
/// Only iOS and iPadOS runtimes are kept; other simulator platforms are
/// out of scope for log acquisition.
fn parse_simctl_output(json: &str) -> Result<Vec<Device>> {
    let list: SimctlList = serde_json::from_str(json)?;
    let mut devices = Vec::new();

    for (runtime, sims) in &list.devices {
        if !runtime.contains("iOS") && !runtime.contains("iPadOS") {
            continue;
        }
        for sim in sims {
            if !sim.is_available {
                continue;
            }
            devices.push(Device {
                udid: sim.udid.clone(),
                name: sim.name.clone(),
                kind: DeviceKind::Simulator,
                state: DeviceState::parse(&sim.state),
                runtime: pretty_runtime(runtime),
            });
        }
    }

    Ok(devices)
}

/// `com.apple.CoreSimulator.SimRuntime.iOS-17-4` → `iOS 17.4`
fn pretty_runtime(identifier: &str) -> String {
    let short = identifier
        .rsplit('.')
        .next()
        .unwrap_or(identifier);
    match short.split_once('-') {
        Some((platform, version)) => format!("{} {}", platform, version.replace('-', ".")),
        None => short.to_string(),
    }
}

/// Parse the `devicectl list devices` table.
///
/// The table has a header row followed by whitespace-separated columns:
/// name, hostname, identifier, state, model. Only rows that look like an
/// iOS device (by model or name) are kept.
fn parse_devicectl_output(text: &str) -> Vec<Device> {
    let mut devices = Vec::new();

    for line in text.lines().skip(1) {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 5 {
            continue;
        }

        let name = parts[0];
        let udid = parts[2];
        let state = parts[3];
        let model = parts[4..].join(" ");

        let looks_ios = ["iPhone", "iPad", "iPod"]
            .iter()
            .any(|m| model.contains(m) || name.contains(m));
        if !looks_ios {
            continue;
        }

        devices.push(Device {
            udid: udid.to_string(),
            name: name.to_string(),
            kind: DeviceKind::Physical,
            state: DeviceState::parse(state),
            runtime: "Physical Device".to_string(),
        });
    }

    devices
}

/// Predicate that scopes a stream to one app's output.
pub fn app_predicate(bundle_id: &str) -> String {
    format!("subsystem == \"{bundle_id}\" OR sender == \"{bundle_id}\"")
}

/// One-shot recent logs from a device via `simctl spawn <udid> log show`.
///
/// Returns the newest `count` parsed lines from the requested window.
pub async fn device_logs(udid: &str, count: usize, since_minutes: u32) -> Result<Vec<LogLine>> {
    let window = format!("{since_minutes}m");
    let args = [
        "simctl", "spawn", udid, "log", "show", "--last", &window, "--style", "syslog",
    ];

    let output = capture_output("xcrun", &args, LOG_SHOW_TIMEOUT).await?;
    if !output.success {
        return Err(classify_log_failure(udid, &output.stderr, output.code));
    }

    let mut lines: Vec<LogLine> = output
        .stdout
        .lines()
        .filter_map(unified::parse_line)
        .collect();
    if lines.len() > count {
        lines.drain(..lines.len() - count);
    }
    Ok(lines)
}

/// Capture a short burst of debug-level logs from a device.
///
/// Spawns `simctl spawn <udid> log stream --level debug`, optionally scoped
/// to one app, reads lines for a bounded window, then tears the stream down
/// and returns the captured tail.
pub async fn device_debug_logs(
    udid: &str,
    app_bundle_id: Option<&str>,
    count: usize,
    window: Duration,
) -> Result<Vec<LogLine>> {
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

    let (tx, mut rx) = mpsc::channel(256);
    let mut process = StreamProcess::spawn("xcrun", &args, tx)?;

    let mut lines = Vec::new();
    let deadline = tokio::time::Instant::now() + window;

    loop {
        let event = match tokio::time::timeout_at(deadline, rx.recv()).await {
            Ok(Some(event)) => event,
            // Channel closed or window elapsed: stop collecting.
            _ => break,
        };
        match event {
            ProcessEvent::Stdout(line) => {
                if unified::is_stream_preamble(&line) {
                    continue;
                }
                if let Some(parsed) = unified::parse_line(&line) {
                    lines.push(parsed);
                    if lines.len() >= count {
                        break;
                    }
                }
            }
            ProcessEvent::Stderr(line) => {
                debug!("log stream stderr: {}", line);
            }
            ProcessEvent::Exited { code } => {
                // The stream ending early with no output usually means the
                // UDID was rejected by simctl.
                if lines.is_empty() {
                    return Err(Error::device_not_found(udid)).with_context(|| {
                        format!("log stream exited early with code {code:?}")
                    });
                }
                break;
            }
        }
    }

    process.shutdown(CAPTURE_SHUTDOWN_GRACE).await;

    if lines.len() > count {
        lines.drain(..lines.len() - count);
    }
    Ok(lines)
}

/// Map a failed `log` invocation to a specific error where possible.
fn classify_log_failure(udid: &str, stderr: &str, code: Option<i32>) -> Error {
    let lower = stderr.to_lowercase();
    if lower.contains("invalid device") || lower.contains("no devices matching") {
        Error::device_not_found(udid)
    } else if lower.contains("not permitted") || lower.contains("denied") {
        Error::permission_denied(format!("log show on device {udid}"))
    } else {
        Error::process_failure(format!("xcrun simctl spawn {udid} log show"), code, stderr)
    }
}
