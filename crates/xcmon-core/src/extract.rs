//! Diagnostic extraction from toolchain output.
//!
//! Provides a pattern table with one entry per toolchain component (Swift
//! compiler, C/Objective-C compiler, linker, code signing) plus a stateful
//! line-by-line parser that merges multi-line diagnostic messages.

use std::path::PathBuf;
use std::sync::LazyLock;

use regex::Regex;

use crate::diag::{Diagnostic, Severity, SourceKind};

/// Toolchain component a pattern belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Component {
    Swift,
    Clang,
    Linker,
    CodeSign,
    Other,
}

/// Context for a parse pass.
///
/// The timestamp is supplied by the caller (file mtime for static logs,
/// build start time for live output) so that repeated parses of identical
/// input produce byte-identical diagnostic sets.
#[derive(Debug, Clone)]
pub struct ParseContext {
    pub project_name: String,
    pub source_kind: SourceKind,
    pub timestamp: chrono::DateTime<chrono::Local>,
}

impl ParseContext {
    pub fn new(
        project_name: impl Into<String>,
        source_kind: SourceKind,
        timestamp: chrono::DateTime<chrono::Local>,
    ) -> Self {
        Self {
            project_name: project_name.into(),
            source_kind,
            timestamp,
        }
    }
}

/// A single pattern table entry.
///
/// `literal_prefix` is the fixed leading text the pattern requires; when
/// several patterns match the same line, the longest literal prefix wins
/// (ties resolved by table order, which is fixed).
struct Pattern {
    component: Component,
    regex: Regex,
    literal_prefix: &'static str,
    /// Severity forced by the pattern itself (fixed-prefix error forms);
    /// `None` means the severity is captured from the line.
    fixed_severity: Option<Severity>,
}

/// The start-of-diagnostic pattern table.
///
/// Located patterns capture `path`, `line`, `col`, `sev`, `msg`; fixed-prefix
/// patterns capture only `msg`.
static PATTERNS: LazyLock<Vec<Pattern>> = LazyLock::new(|| {
    vec![
        Pattern {
            component: Component::Swift,
            regex: Regex::new(
                r"^(?P<path>[^:\s][^:]*\.swift):(?P<line>\d+):(?P<col>\d+): (?P<sev>[A-Za-z][A-Za-z ]*?): (?P<msg>.+)$",
            )
            .expect("swift pattern"),
            literal_prefix: "",
            fixed_severity: None,
        },
        Pattern {
            component: Component::Clang,
            regex: Regex::new(
                r"^(?P<path>[^:\s][^:]*\.(?:c|cc|cpp|cxx|m|mm|h|hpp)):(?P<line>\d+):(?P<col>\d+): (?P<sev>[A-Za-z][A-Za-z ]*?): (?P<msg>.+)$",
            )
            .expect("clang pattern"),
            literal_prefix: "",
            fixed_severity: None,
        },
        Pattern {
            component: Component::Clang,
            regex: Regex::new(r"^clang: error: (?P<msg>.+)$").expect("clang driver pattern"),
            literal_prefix: "clang: error: ",
            fixed_severity: Some(Severity::Error),
        },
        Pattern {
            component: Component::Linker,
            regex: Regex::new(r"^ld: warning: (?P<msg>.+)$").expect("ld warning pattern"),
            literal_prefix: "ld: warning: ",
            fixed_severity: Some(Severity::Warning),
        },
        // Only ld lines that actually report an error; status chatter like
        // "ld: building for iOS Simulator" stays out of the diagnostic set.
        Pattern {
            component: Component::Linker,
            regex: Regex::new(r"^ld: (?P<msg>.*\berror\b.*)$").expect("ld error pattern"),
            literal_prefix: "ld: ",
            fixed_severity: Some(Severity::Error),
        },
        Pattern {
            component: Component::CodeSign,
            regex: Regex::new(r"^Code Signing Error: (?P<msg>.+)$").expect("codesign pattern"),
            literal_prefix: "Code Signing Error: ",
            fixed_severity: Some(Severity::Error),
        },
        // Located diagnostic with an unrecognized file extension
        Pattern {
            component: Component::Other,
            regex: Regex::new(
                r"^(?P<path>[^:\s][^:]*):(?P<line>\d+):(?P<col>\d+): (?P<sev>[A-Za-z][A-Za-z ]*?): (?P<msg>.+)$",
            )
            .expect("located pattern"),
            literal_prefix: "",
            fixed_severity: None,
        },
        // Bare diagnostics without a source location
        Pattern {
            component: Component::Other,
            regex: Regex::new(r"^error: (?P<msg>.+)$").expect("bare error pattern"),
            literal_prefix: "error: ",
            fixed_severity: Some(Severity::Error),
        },
        Pattern {
            component: Component::Other,
            regex: Regex::new(r"^warning: (?P<msg>.+)$").expect("bare warning pattern"),
            literal_prefix: "warning: ",
            fixed_severity: Some(Severity::Warning),
        },
        Pattern {
            component: Component::Other,
            regex: Regex::new(r"^note: (?P<msg>.+)$").expect("bare note pattern"),
            literal_prefix: "note: ",
            fixed_severity: Some(Severity::Note),
        },
    ]
});

/// A matched diagnostic start line, before it becomes a full record
struct StartMatch {
    severity: Severity,
    message: String,
    file_path: Option<PathBuf>,
    line: Option<u32>,
    column: Option<u32>,
}

/// Match a line against the pattern table.
///
/// When multiple patterns match, the one with the longest literal matched
/// prefix wins; ties fall back to table order.
fn match_start(line: &str) -> Option<StartMatch> {
    let mut best: Option<(&Pattern, regex::Captures)> = None;

    for pattern in PATTERNS.iter() {
        if let Some(caps) = pattern.regex.captures(line) {
            let replace = match &best {
                Some((current, _)) => {
                    pattern.literal_prefix.len() > current.literal_prefix.len()
                }
                None => true,
            };
            if replace {
                best = Some((pattern, caps));
            }
        }
    }

    let (pattern, caps) = best?;
    tracing::trace!("diagnostic start matched by {:?}", pattern.component);

    let severity = match pattern.fixed_severity {
        Some(sev) => sev,
        None => Severity::normalize(caps.name("sev").map(|m| m.as_str()).unwrap_or("note")),
    };

    // Line/column are 1-based; a zero from a malformed line is dropped.
    let parse_pos = |name: &str| -> Option<u32> {
        caps.name(name)
            .and_then(|m| m.as_str().parse::<u32>().ok())
            .filter(|n| *n >= 1)
    };

    Some(StartMatch {
        severity,
        message: caps
            .name("msg")
            .map(|m| m.as_str().to_string())
            .unwrap_or_default(),
        file_path: caps.name("path").map(|m| PathBuf::from(m.as_str())),
        line: parse_pos("line"),
        column: parse_pos("col"),
    })
}

/// Parse a single line without continuation state.
///
/// Returns `None` when the line does not start a diagnostic. The returned
/// record has `id = 0`; sequence ids are assigned by [`DiagnosticParser`].
pub fn parse_line(line: &str, ctx: &ParseContext) -> Option<Diagnostic> {
    let start = match_start(line)?;
    Some(Diagnostic {
        id: 0,
        severity: start.severity,
        message: start.message,
        file_path: start.file_path,
        line: start.line,
        column: start.column,
        source_kind: ctx.source_kind,
        project_name: ctx.project_name.clone(),
        timestamp: ctx.timestamp,
        raw_context: line.to_string(),
    })
}

/// Stateful line-by-line diagnostic parser.
///
/// Continuation rule: a non-empty line that matches no start pattern and
/// immediately follows an open diagnostic is appended to that diagnostic's
/// message, newline-joined. An empty line (or end of input) closes the open
/// diagnostic.
#[derive(Debug)]
pub struct DiagnosticParser {
    ctx: ParseContext,
    open: Option<Diagnostic>,
    next_id: u64,
}

impl DiagnosticParser {
    pub fn new(ctx: ParseContext) -> Self {
        Self {
            ctx,
            open: None,
            next_id: 1,
        }
    }

    /// Feed one line. Returns a diagnostic when one is completed by this line.
    pub fn feed(&mut self, line: &str) -> Option<Diagnostic> {
        if let Some(mut diag) = parse_line(line, &self.ctx) {
            diag.id = self.next_id;
            self.next_id += 1;
            return self.open.replace(diag);
        }

        let trimmed = line.trim_end();
        if trimmed.trim().is_empty() {
            return self.open.take();
        }

        if let Some(open) = self.open.as_mut() {
            open.message.push('\n');
            open.message.push_str(trimmed);
            open.raw_context.push('\n');
            open.raw_context.push_str(line);
        }
        None
    }

    /// Close and return the trailing open diagnostic, if any.
    pub fn finish(&mut self) -> Option<Diagnostic> {
        self.open.take()
    }

    /// Parse a complete line sequence in one pass.
    pub fn parse_all<I, S>(lines: I, ctx: ParseContext) -> Vec<Diagnostic>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut parser = Self::new(ctx);
        let mut out = Vec::new();
        for line in lines {
            if let Some(diag) = parser.feed(line.as_ref()) {
                out.push(diag);
            }
        }
        if let Some(diag) = parser.finish() {
            out.push(diag);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Local;

    fn ctx() -> ParseContext {
        ParseContext::new("MyApp", SourceKind::BuildLog, Local::now())
    }

    #[test]
    fn test_swift_error_line() {
        let line = "/Users/me/App/ViewController.swift:42:13: error: cannot find 'foo' in scope";
        let diag = parse_line(line, &ctx()).expect("should match");

        assert_eq!(diag.severity, Severity::Error);
        assert_eq!(
            diag.file_path.as_deref(),
            Some(std::path::Path::new("/Users/me/App/ViewController.swift"))
        );
        assert_eq!(diag.line, Some(42));
        assert_eq!(diag.column, Some(13));
        assert_eq!(diag.message, "cannot find 'foo' in scope");
    }

    #[test]
    fn test_clang_warning_line() {
        let line = "/Users/me/App/Bridge.m:7:1: warning: unused variable 'tmp'";
        let diag = parse_line(line, &ctx()).expect("should match");
        assert_eq!(diag.severity, Severity::Warning);
        assert_eq!(diag.line, Some(7));
    }

    #[test]
    fn test_linker_error_line() {
        let line = "ld: symbol(s) not found for architecture arm64 error";
        let diag = parse_line(line, &ctx()).expect("should match");
        assert_eq!(diag.severity, Severity::Error);
        assert!(diag.message.contains("symbol(s) not found"));
        assert!(diag.file_path.is_none());
    }

    #[test]
    fn test_benign_linker_chatter_ignored() {
        assert!(parse_line(
            "ld: building for iOS Simulator, but linking in object file",
            &ctx()
        )
        .is_none());
        assert!(parse_line("ld: note: using modern linker", &ctx()).is_none());
    }

    #[test]
    fn test_linker_warning_wins_over_error_form() {
        // "ld: warning: ..." matches both ld patterns; the longer literal
        // prefix must win.
        let line = "ld: warning: directory not found for option '-L/missing'";
        let diag = parse_line(line, &ctx()).expect("should match");
        assert_eq!(diag.severity, Severity::Warning);
        assert_eq!(
            diag.message,
            "directory not found for option '-L/missing'"
        );
    }

    #[test]
    fn test_code_signing_error() {
        let line = "Code Signing Error: No signing certificate \"iOS Development\" found";
        let diag = parse_line(line, &ctx()).expect("should match");
        assert_eq!(diag.severity, Severity::Error);
        assert!(diag.message.starts_with("No signing certificate"));
    }

    #[test]
    fn test_unknown_severity_defaults_to_note() {
        let line = "/src/thing.swift:1:1: remarkable: something odd";
        let diag = parse_line(line, &ctx()).expect("should match located form");
        assert_eq!(diag.severity, Severity::Note);
        // Raw spelling survives in raw_context
        assert!(diag.raw_context.contains("remarkable"));
    }

    #[test]
    fn test_zero_line_number_dropped() {
        let line = "/src/thing.swift:0:0: error: boom";
        let diag = parse_line(line, &ctx()).expect("should match");
        assert_eq!(diag.line, None);
        assert_eq!(diag.column, None);
    }

    #[test]
    fn test_non_diagnostic_line() {
        assert!(parse_line("CompileSwift normal arm64", &ctx()).is_none());
        assert!(parse_line("", &ctx()).is_none());
    }

    #[test]
    fn test_continuation_merge_three_lines() {
        let lines = [
            "/src/main.swift:10:5: error: cannot convert value",
            "        let x: Int = \"hello\"",
            "                     ^~~~~~~",
            "",
        ];
        let diags = DiagnosticParser::parse_all(lines, ctx());

        assert_eq!(diags.len(), 1);
        let msg_lines: Vec<&str> = diags[0].message.lines().collect();
        assert_eq!(msg_lines.len(), 3);
        assert_eq!(msg_lines[0], "cannot convert value");
        assert!(msg_lines[1].contains("let x: Int"));
        assert!(msg_lines[2].contains('^'));
    }

    #[test]
    fn test_empty_line_closes_diagnostic() {
        let lines = [
            "/src/main.swift:10:5: error: first",
            "",
            "stray line that must not be appended",
        ];
        let diags = DiagnosticParser::parse_all(lines, ctx());
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].message, "first");
    }

    #[test]
    fn test_new_start_closes_previous() {
        let lines = [
            "/src/a.swift:1:1: error: one",
            "/src/b.swift:2:2: warning: two",
        ];
        let diags = DiagnosticParser::parse_all(lines, ctx());
        assert_eq!(diags.len(), 2);
        assert_eq!(diags[0].message, "one");
        assert_eq!(diags[1].message, "two");
        assert_eq!(diags[0].id, 1);
        assert_eq!(diags[1].id, 2);
    }

    #[test]
    fn test_n_wellformed_lines_yield_n_diagnostics() {
        let lines: Vec<String> = (1..=25)
            .map(|i| format!("/src/file{i}.swift:{i}:1: error: problem {i}"))
            .collect();
        let diags = DiagnosticParser::parse_all(&lines, ctx());
        assert_eq!(diags.len(), 25);
        for (i, diag) in diags.iter().enumerate() {
            assert_eq!(diag.line, Some((i + 1) as u32));
            assert_eq!(diag.severity, Severity::Error);
        }
    }

    #[test]
    fn test_parse_is_deterministic() {
        let lines = [
            "/src/a.swift:1:1: error: one",
            "  detail line",
            "",
            "ld: framework not found UIKit",
            "warning: build system note",
        ];
        let stamp = Local::now();
        let make_ctx = || ParseContext::new("MyApp", SourceKind::BuildLog, stamp);

        let first = DiagnosticParser::parse_all(lines, make_ctx());
        let second = DiagnosticParser::parse_all(lines, make_ctx());
        assert_eq!(first, second);
    }
}
