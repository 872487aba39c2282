//! # xcmon-core - Core Domain Types
//!
//! Foundation crate for xcmon. Provides domain types, error handling,
//! diagnostic extraction, activity-log decoding, unified-log line parsing,
//! and build-artifact discovery.
//!
//! This crate has **zero internal dependencies** -- it only depends on
//! external crates (serde, chrono, thiserror, regex, flate2, tracing).
//!
//! ## Public API
//!
//! ### Domain Types (`types`, `diag`)
//! - [`Diagnostic`] - A canonical compiler/linker/code-signing diagnostic
//! - [`Severity`], [`SourceKind`] - Diagnostic classification
//! - [`LogLine`], [`LogLevel`] - A parsed unified-log line
//! - [`Device`], [`DeviceKind`], [`DeviceState`] - Known devices
//! - [`ProjectInfo`] - A discovered project and its newest build log
//!
//! ### Extraction (`extract`)
//! - [`parse_line()`] - Match one line against the diagnostic pattern table
//! - [`DiagnosticParser`] - Stateful parser with continuation merging
//!
//! ### Log Decoding (`activity_log`, `unified`)
//! - [`activity_log::read()`] - Decode a build log (SLF0 container or text)
//! - [`unified::parse_line()`] - Parse a syslog-style unified-log line
//!
//! ### Discovery (`locator`)
//! - [`ProjectLocator`] - Scan DerivedData roots for build artifacts
//!
//! ## Prelude
//!
//! Import commonly used types with:
//! ```rust
//! use xcmon_core::prelude::*;
//! ```

pub mod activity_log;
pub mod buffer;
pub mod diag;
pub mod error;
pub mod extract;
pub mod locator;
pub mod logging;
pub mod types;
pub mod unified;

/// Prelude for common imports used throughout all xcmon crates
pub mod prelude {
    pub use super::error::{Error, Result, ResultExt};
    pub use tracing::{debug, error, info, instrument, trace, warn};
}

// Re-export commonly used types at crate root for convenience
pub use activity_log::{LogFormat, LogLines};
pub use buffer::RingBuffer;
pub use diag::{Diagnostic, DiagnosticKey, Severity, SourceKind};
pub use error::{Error, Result, ResultExt};
pub use extract::{parse_line, Component, DiagnosticParser, ParseContext};
pub use locator::{DiscoveryReport, LocatorConfig, ProjectLocator, DEFAULT_MAX_DEPTH};
pub use types::{Device, DeviceKind, DeviceState, LogLevel, LogLine, ProjectInfo};
