//! # xcmon-daemon - Subprocess Supervision and Log Streaming
//!
//! Manages the external toolchain processes xcmon shells out to: one-shot
//! commands (`xcodebuild -list`, `simctl list`, `log show`) and long-lived
//! streams (`log stream`, `xcodebuild build`).
//!
//! Depends on [`xcmon_core`] for domain types and error handling.
//!
//! ## Public API
//!
//! ### Process Management
//! - [`StreamProcess`] - Spawn and supervise a streaming subprocess
//! - [`capture_output()`] - Run a one-shot command under a timeout
//!
//! ### Live Builds
//! - [`LiveBuildRunner`] - Single-flight `xcodebuild build` per project
//! - [`list_schemes()`] - Scheme listing via `xcodebuild -list`
//! - [`BusyPolicy`] - Reject or wait when a project is already building
//!
//! ### Log Monitoring
//! - [`MonitorHandle`] - A running `log stream` session with a retained window
//! - [`MonitorSpec`] - What to stream and how much to retain
//!
//! ### Devices
//! - [`list_devices()`] - Merged simulator + physical device inventory
//! - [`device_logs()`], [`device_debug_logs()`] - One-shot device log capture
//!
//! ### Toolchain
//! - [`ToolAvailability`] - Check for xcrun, xcodebuild and `log`

pub mod devices;
pub mod live_build;
pub mod monitor;
pub mod process;
pub mod tools;

// Public API re-exports
pub use devices::{
    app_predicate, device_debug_logs, device_logs, list_devices, list_devices_with_timeout,
    DeviceInventory, DEBUG_CAPTURE_WINDOW,
};
pub use live_build::{
    list_schemes, BusyPolicy, LiveBuildReport, LiveBuildRequest, LiveBuildRunner,
};
pub use monitor::{
    MonitorHandle, MonitorSpec, MonitorStatus, DEFAULT_DIAGNOSTIC_CAPACITY, DEFAULT_LINE_CAPACITY,
    XCODE_PROCESSES,
};
pub use process::{capture_output, CommandOutput, ProcessEvent, StreamProcess};
pub use tools::ToolAvailability;
