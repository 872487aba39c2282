//! # xcmon-engine - Query Facade and Session Management
//!
//! Composition layer over [`xcmon_core`] and [`xcmon_daemon`]: static
//! build-log scanning with an idempotence cache, the monitor session
//! registry, project analysis, settings, and the [`Engine`] facade a
//! dispatch layer calls.
//!
//! ## Public API
//!
//! - [`Engine`] - The query surface (projects, diagnostics, logs, sessions)
//! - [`BuildLogScanner`] - Cached static build-log scanning
//! - [`MonitorRegistry`] - Monitor sessions keyed by [`SessionId`]
//! - [`Settings`] - TOML configuration with defaults
//! - [`analyze()`] / [`AnalysisReport`] - Static project analysis

pub mod analysis;
pub mod engine;
pub mod registry;
pub mod scanner;
pub mod settings;

pub use analysis::{analyze, AnalysisReport, BuildHealth, FileDiagnosticCount};
pub use engine::Engine;
pub use registry::{MonitorRegistry, SessionId, SessionSummary};
pub use scanner::{dedupe, BuildLogScanner};
pub use settings::Settings;
