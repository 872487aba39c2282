//! Toolchain availability checking
//!
//! Checks for the external tools the engine shells out to: `xcrun` (device
//! inventory and simulator log access), `xcodebuild` (live builds and scheme
//! listing) and `log` (unified log queries). Run once at startup; queries
//! that need a missing tool fail fast with a clear message instead of a
//! spawn error.

use which::which;

/// Cached availability of the external toolchain
#[derive(Debug, Clone, Default)]
pub struct ToolAvailability {
    /// Whether `xcrun` is on PATH (macOS with Xcode command line tools)
    pub xcrun: bool,

    /// Whether `xcodebuild` is on PATH
    pub xcodebuild: bool,

    /// Whether the unified-log `log` command is on PATH
    pub log_command: bool,
}

impl ToolAvailability {
    /// Check tool availability (run once at startup)
    pub fn check() -> Self {
        Self {
            xcrun: which("xcrun").is_ok(),
            xcodebuild: which("xcodebuild").is_ok(),
            log_command: which("log").is_ok(),
        }
    }

    /// Whether device inventory and simulator logs can work at all.
    pub fn devices_available(&self) -> bool {
        self.xcrun
    }

    /// Whether live builds can be launched.
    pub fn builds_available(&self) -> bool {
        self.xcodebuild
    }

    /// Whether unified-log queries (`log show` / `log stream`) can work.
    pub fn unified_log_available(&self) -> bool {
        self.log_command
    }

    /// Get user-friendly message for missing device tooling
    pub fn devices_unavailable_message(&self) -> Option<&'static str> {
        if self.xcrun {
            None
        } else {
            Some("xcrun not found. Install the Xcode command line tools to list devices.")
        }
    }

    /// Get user-friendly message for missing build tooling
    pub fn builds_unavailable_message(&self) -> Option<&'static str> {
        if self.xcodebuild {
            None
        } else {
            Some("xcodebuild not found. Install Xcode to run live builds.")
        }
    }
}
