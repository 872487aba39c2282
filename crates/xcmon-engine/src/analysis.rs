//! Static project analysis built on scanner output.

use std::collections::HashMap;
use std::path::PathBuf;

use chrono::{DateTime, Local};
use serde::Serialize;

use xcmon_core::{Diagnostic, Severity};

/// How many hot files the report lists
const HOT_FILE_LIMIT: usize = 5;

/// Overall health of the latest build
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildHealth {
    /// No errors or warnings
    Healthy,
    /// Warnings only
    Warnings,
    /// At least one error or fault
    Failing,
}

/// Per-file diagnostic tally
#[derive(Debug, Clone, Serialize)]
pub struct FileDiagnosticCount {
    pub file: PathBuf,
    pub errors: usize,
    pub warnings: usize,
}

/// Summary of a project's latest build log
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisReport {
    pub project: String,

    /// When the analyzed log was produced
    pub build_time: DateTime<Local>,

    pub error_count: usize,
    pub warning_count: usize,
    pub note_count: usize,

    /// Files with the most diagnostics, worst first
    pub hot_files: Vec<FileDiagnosticCount>,

    pub health: BuildHealth,
}

/// Summarize a deduplicated diagnostic set.
pub fn analyze(
    project: &str,
    build_time: DateTime<Local>,
    diagnostics: &[Diagnostic],
) -> AnalysisReport {
    let mut error_count = 0;
    let mut warning_count = 0;
    let mut note_count = 0;
    let mut per_file: HashMap<PathBuf, (usize, usize)> = HashMap::new();

    for diag in diagnostics {
        match diag.severity {
            Severity::Error | Severity::Fault => error_count += 1,
            Severity::Warning => warning_count += 1,
            Severity::Note => note_count += 1,
        }

        if let Some(path) = &diag.file_path {
            let counts = per_file.entry(path.clone()).or_default();
            if diag.is_error() {
                counts.0 += 1;
            } else if diag.severity == Severity::Warning {
                counts.1 += 1;
            }
        }
    }

    let mut hot_files: Vec<FileDiagnosticCount> = per_file
        .into_iter()
        .filter(|(_, (errors, warnings))| errors + warnings > 0)
        .map(|(file, (errors, warnings))| FileDiagnosticCount {
            file,
            errors,
            warnings,
        })
        .collect();
    // Worst first: errors dominate, warnings break ties, then path for
    // stable output.
    hot_files.sort_by(|a, b| {
        b.errors
            .cmp(&a.errors)
            .then(b.warnings.cmp(&a.warnings))
            .then(a.file.cmp(&b.file))
    });
    hot_files.truncate(HOT_FILE_LIMIT);

    let health = if error_count > 0 {
        BuildHealth::Failing
    } else if warning_count > 0 {
        BuildHealth::Warnings
    } else {
        BuildHealth::Healthy
    };

    AnalysisReport {
        project: project.to_string(),
        build_time,
        error_count,
        warning_count,
        note_count,
        hot_files,
        health,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use xcmon_core::extract::{DiagnosticParser, ParseContext};
    use xcmon_core::SourceKind;

    fn diags_from(lines: &[&str]) -> Vec<Diagnostic> {
        let ctx = ParseContext::new("MyApp", SourceKind::BuildLog, Local::now());
        DiagnosticParser::parse_all(lines.iter().copied(), ctx)
    }

    #[test]
    fn test_analyze_counts_and_health() {
        let diags = diags_from(&[
            "/src/a.swift:1:1: error: one",
            "/src/a.swift:2:1: error: two",
            "/src/b.swift:3:1: warning: three",
            "note: build system note",
        ]);

        let report = analyze("MyApp", Local::now(), &diags);
        assert_eq!(report.error_count, 2);
        assert_eq!(report.warning_count, 1);
        assert_eq!(report.note_count, 1);
        assert_eq!(report.health, BuildHealth::Failing);
    }

    #[test]
    fn test_hot_files_worst_first() {
        let diags = diags_from(&[
            "/src/messy.swift:1:1: error: a",
            "/src/messy.swift:2:1: error: b",
            "/src/messy.swift:3:1: warning: c",
            "/src/minor.swift:1:1: warning: d",
        ]);

        let report = analyze("MyApp", Local::now(), &diags);
        assert_eq!(report.hot_files.len(), 2);
        assert_eq!(report.hot_files[0].file, PathBuf::from("/src/messy.swift"));
        assert_eq!(report.hot_files[0].errors, 2);
        assert_eq!(report.hot_files[0].warnings, 1);
        assert_eq!(report.hot_files[1].errors, 0);
    }

    #[test]
    fn test_healthy_and_warning_states() {
        let report = analyze("MyApp", Local::now(), &[]);
        assert_eq!(report.health, BuildHealth::Healthy);
        assert!(report.hot_files.is_empty());

        let diags = diags_from(&["/src/a.swift:1:1: warning: only warning"]);
        let report = analyze("MyApp", Local::now(), &diags);
        assert_eq!(report.health, BuildHealth::Warnings);
    }

    #[test]
    fn test_notes_do_not_make_files_hot() {
        let diags = diags_from(&["/src/quiet.swift:1:1: note: fyi"]);
        let report = analyze("MyApp", Local::now(), &diags);
        assert_eq!(report.note_count, 1);
        assert!(report.hot_files.is_empty());
    }
}
