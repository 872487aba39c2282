//! Application error types with rich context

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Application error types organized by layer/domain
#[derive(Debug, Error)]
pub enum Error {
    // ─────────────────────────────────────────────────────────────
    // Common/Infrastructure Errors
    // ─────────────────────────────────────────────────────────────
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    // ─────────────────────────────────────────────────────────────
    // Lookup Errors
    // ─────────────────────────────────────────────────────────────
    #[error("Project not found: {name}")]
    ProjectNotFound { name: String },

    #[error("Device not found: {udid}")]
    DeviceNotFound { udid: String },

    #[error("Build log not found for project: {project}")]
    BuildLogNotFound { project: String },

    #[error("Monitor session not found: {id}")]
    SessionNotFound { id: u64 },

    // ─────────────────────────────────────────────────────────────
    // Log Decoding Errors
    // ─────────────────────────────────────────────────────────────
    #[error("Unsupported log format in {path}: {reason}")]
    UnsupportedFormat { path: PathBuf, reason: String },

    // ─────────────────────────────────────────────────────────────
    // Process/Timeout Errors
    // ─────────────────────────────────────────────────────────────
    #[error("Operation timed out after {limit:?}: {operation}")]
    Timeout { operation: String, limit: Duration },

    #[error("A live build is already running for project: {project}")]
    Busy { project: String },

    #[error("Process '{command}' failed with exit code {code:?}: {stderr}")]
    ProcessFailure {
        command: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("Failed to spawn '{command}': {reason}")]
    ProcessSpawn { command: String, reason: String },

    #[error("OS log access denied: {context}")]
    PermissionDenied { context: String },

    #[error("Required tool not found on PATH: {tool}")]
    ToolNotFound { tool: String },

    // ─────────────────────────────────────────────────────────────
    // Configuration Errors
    // ─────────────────────────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    // ─────────────────────────────────────────────────────────────
    // Channel/Communication Errors
    // ─────────────────────────────────────────────────────────────
    #[error("Channel closed unexpectedly")]
    ChannelClosed,
}

// ─────────────────────────────────────────────────────────────────
// Convenience Constructors
// ─────────────────────────────────────────────────────────────────

impl Error {
    pub fn project_not_found(name: impl Into<String>) -> Self {
        Self::ProjectNotFound { name: name.into() }
    }

    pub fn device_not_found(udid: impl Into<String>) -> Self {
        Self::DeviceNotFound { udid: udid.into() }
    }

    pub fn build_log_not_found(project: impl Into<String>) -> Self {
        Self::BuildLogNotFound {
            project: project.into(),
        }
    }

    pub fn unsupported_format(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::UnsupportedFormat {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn timeout(operation: impl Into<String>, limit: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            limit,
        }
    }

    pub fn busy(project: impl Into<String>) -> Self {
        Self::Busy {
            project: project.into(),
        }
    }

    pub fn process_failure(
        command: impl Into<String>,
        code: Option<i32>,
        stderr: impl Into<String>,
    ) -> Self {
        Self::ProcessFailure {
            command: command.into(),
            code,
            stderr: stderr.into(),
        }
    }

    pub fn process_spawn(command: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ProcessSpawn {
            command: command.into(),
            reason: reason.into(),
        }
    }

    pub fn permission_denied(context: impl Into<String>) -> Self {
        Self::PermissionDenied {
            context: context.into(),
        }
    }

    pub fn tool_not_found(tool: impl Into<String>) -> Self {
        Self::ToolNotFound { tool: tool.into() }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Check if this is a recoverable error.
    ///
    /// Recoverable errors degrade a single query or session; the engine
    /// itself keeps running.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Error::ToolNotFound { .. } | Error::Config { .. })
    }

    /// True for errors caused by a conflicting concurrent operation.
    pub fn is_busy(&self) -> bool {
        matches!(self, Error::Busy { .. })
    }
}

// ─────────────────────────────────────────────────────────────────
// Error Context Extensions
// ─────────────────────────────────────────────────────────────────

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context with a closure (lazy evaluation)
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T, E: Into<Error>> ResultExt<T> for std::result::Result<T, E> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| {
            let err = e.into();
            tracing::error!("{}: {:?}", context.into(), err);
            err
        })
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| {
            let err = e.into();
            tracing::error!("{}: {:?}", f(), err);
            err
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_messages() {
        let err = Error::device_not_found("ABCD-1234");
        assert_eq!(err.to_string(), "Device not found: ABCD-1234");

        let err = Error::busy("MyApp");
        assert!(err.to_string().contains("MyApp"));
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_timeout_carries_limit() {
        let err = Error::timeout("xcodebuild build", Duration::from_secs(30));
        assert!(err.to_string().contains("xcodebuild build"));
        assert!(err.to_string().contains("30"));
    }

    #[test]
    fn test_unsupported_format_carries_path() {
        let err = Error::unsupported_format("/tmp/bad.xcactivitylog", "no gzip header");
        assert!(err.to_string().contains("/tmp/bad.xcactivitylog"));
        assert!(err.to_string().contains("no gzip header"));
    }

    #[test]
    fn test_error_is_recoverable() {
        assert!(Error::busy("MyApp").is_recoverable());
        assert!(Error::device_not_found("x").is_recoverable());
        assert!(!Error::tool_not_found("xcrun").is_recoverable());
        assert!(!Error::config("bad toml").is_recoverable());
    }

    #[test]
    fn test_is_busy() {
        assert!(Error::busy("MyApp").is_busy());
        assert!(!Error::project_not_found("MyApp").is_busy());
    }
}
