//! Core domain types shared across all xcmon crates

use std::path::PathBuf;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

/// Severity of a unified-log line
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
    Fault,
}

impl LogLevel {
    /// Infer a level from message content.
    ///
    /// `log stream --style syslog` does not carry an explicit level field,
    /// so we fall back to scanning the message text.
    pub fn infer(message: &str) -> Self {
        let lower = message.to_lowercase();
        if ["error", "failed", "exception", "crash"]
            .iter()
            .any(|w| lower.contains(w))
        {
            LogLevel::Error
        } else if lower.contains("warning") || lower.contains("warn") {
            LogLevel::Warning
        } else if lower.contains("debug") || lower.contains("trace") {
            LogLevel::Debug
        } else {
            LogLevel::Info
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, LogLevel::Error | LogLevel::Fault)
    }
}

/// A single line captured from the unified log (`log stream` / `log show`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogLine {
    pub timestamp: DateTime<Local>,
    pub process: String,
    pub subsystem: Option<String>,
    pub category: Option<String>,
    pub level: LogLevel,
    pub text: String,
}

impl LogLine {
    /// Check whether the line matches a free-text filter (case-insensitive).
    pub fn matches_filter(&self, filter: &str) -> bool {
        self.text.to_lowercase().contains(&filter.to_lowercase())
    }
}

/// Whether a device is a simulator or physical hardware
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceKind {
    Simulator,
    Physical,
}

/// Boot state reported by the inventory tools
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceState {
    Booted,
    Shutdown,
    Unknown,
}

impl DeviceState {
    /// Normalize the state strings emitted by `simctl` and `devicectl`.
    pub fn parse(raw: &str) -> Self {
        match raw.to_lowercase().as_str() {
            "booted" | "connected" | "available" => DeviceState::Booted,
            "shutdown" | "disconnected" => DeviceState::Shutdown,
            _ => DeviceState::Unknown,
        }
    }
}

/// A simulator or physical device known to the toolchain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    /// Unique device identifier
    pub udid: String,

    /// Human-readable device name
    pub name: String,

    pub kind: DeviceKind,

    pub state: DeviceState,

    /// Runtime description (e.g. "iOS 17.4", "Physical Device")
    pub runtime: String,
}

impl Device {
    pub fn is_booted(&self) -> bool {
        self.state == DeviceState::Booted
    }
}

/// A discovered Xcode project with its DerivedData artifacts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectInfo {
    /// Project name (DerivedData directory name minus the hash suffix)
    pub name: String,

    /// Full DerivedData directory name, including the hash suffix
    pub path: PathBuf,

    /// DerivedData root this project was found under
    pub derived_data_dir: PathBuf,

    /// Most recent `.xcactivitylog` under `Logs/Build`, if any
    pub last_build_log_path: Option<PathBuf>,

    pub last_modified: DateTime<Local>,
}
