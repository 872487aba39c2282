//! Canonical diagnostic records extracted from build and console output

use std::path::PathBuf;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

/// Normalized diagnostic severity.
///
/// Tool-specific spellings ("fatal error", "ERROR", "remark") are collapsed
/// into this set; unrecognized spellings default to [`Severity::Note`] with
/// the raw spelling preserved in [`Diagnostic::raw_context`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Note,
    Warning,
    Error,
    Fault,
}

impl Severity {
    /// Normalize a tool-specific severity spelling.
    pub fn normalize(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "error" | "fatal error" | "fatal" => Severity::Error,
            "warning" => Severity::Warning,
            "fault" => Severity::Fault,
            "note" | "remark" | "info" => Severity::Note,
            _ => Severity::Note,
        }
    }
}

/// Where a diagnostic was extracted from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    BuildLog,
    LiveBuild,
    Console,
    Device,
}

/// A single compiler/linker/code-signing diagnostic
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// Sequence number within the parse pass that produced this diagnostic.
    /// Deterministic for identical input, so repeated parses of the same
    /// log yield byte-identical records.
    pub id: u64,

    pub severity: Severity,

    pub message: String,

    pub file_path: Option<PathBuf>,

    /// 1-based line number
    pub line: Option<u32>,

    /// 1-based column number
    pub column: Option<u32>,

    pub source_kind: SourceKind,

    pub project_name: String,

    pub timestamp: DateTime<Local>,

    /// The raw line(s) this diagnostic was extracted from
    pub raw_context: String,
}

impl Diagnostic {
    /// Identity key used for deduplication within a retained window.
    pub fn identity_key(&self) -> DiagnosticKey {
        DiagnosticKey {
            file_path: self.file_path.clone(),
            line: self.line,
            column: self.column,
            message: self.message.clone(),
            source_kind: self.source_kind,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self.severity, Severity::Error | Severity::Fault)
    }
}

/// Deduplication key: `(file_path, line, column, message, source_kind)`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DiagnosticKey {
    pub file_path: Option<PathBuf>,
    pub line: Option<u32>,
    pub column: Option<u32>,
    pub message: String,
    pub source_kind: SourceKind,
}
