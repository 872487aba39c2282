//! Static build-log scanning with an idempotence cache.
//!
//! Resolves a project's newest activity log, decodes it, runs the
//! diagnostic extractor over the stream and dedupes the result. A content
//! hash is cached per file path so re-scanning an unchanged log returns the
//! previous result without re-parsing. Scans of the same path are
//! serialized; distinct paths run in parallel.

use std::collections::hash_map::DefaultHasher;
use std::collections::{HashMap, HashSet};
use std::hash::Hasher;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Local};
use tokio::sync::Mutex;

use xcmon_core::activity_log;
use xcmon_core::extract::{DiagnosticParser, ParseContext};
use xcmon_core::prelude::*;
use xcmon_core::types::ProjectInfo;
use xcmon_core::{Diagnostic, SourceKind};

#[derive(Debug, Clone)]
struct CacheEntry {
    content_hash: u64,
    diagnostics: Arc<Vec<Diagnostic>>,
}

/// Scans static build logs, caching per-path results by content hash
#[derive(Debug, Default)]
pub struct BuildLogScanner {
    cache: std::sync::Mutex<HashMap<PathBuf, CacheEntry>>,
    locks: std::sync::Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>,
}

impl BuildLogScanner {
    pub fn new() -> Self {
        Self::default()
    }

    /// All diagnostics from a project's newest build log, deduplicated.
    pub async fn static_diagnostics(&self, project: &ProjectInfo) -> Result<Arc<Vec<Diagnostic>>> {
        let log_path = project
            .last_build_log_path
            .as_ref()
            .ok_or_else(|| Error::build_log_not_found(&project.name))?;

        self.scan_path(log_path, &project.name).await
    }

    /// Scan one log file, serialized per path.
    pub async fn scan_path(&self, path: &Path, project_name: &str) -> Result<Arc<Vec<Diagnostic>>> {
        let lock = self.path_lock(path);
        let _guard = lock.lock().await;

        let bytes = std::fs::read(path)
            .with_context(|| format!("reading build log {}", path.display()))?;
        let content_hash = hash_bytes(&bytes);

        if let Some(cached) = self.cached(path, content_hash) {
            debug!("Scan cache hit for {}", path.display());
            return Ok(cached);
        }

        let timestamp = file_mtime(path);
        let ctx = ParseContext::new(project_name, SourceKind::BuildLog, timestamp);
        let lines = activity_log::read(path)?;
        let diagnostics = Arc::new(dedupe(DiagnosticParser::parse_all(lines, ctx)));

        info!(
            "Scanned {}: {} diagnostics",
            path.display(),
            diagnostics.len()
        );

        let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
        cache.insert(
            path.to_path_buf(),
            CacheEntry {
                content_hash,
                diagnostics: Arc::clone(&diagnostics),
            },
        );
        Ok(diagnostics)
    }

    fn cached(&self, path: &Path, content_hash: u64) -> Option<Arc<Vec<Diagnostic>>> {
        let cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
        cache
            .get(path)
            .filter(|entry| entry.content_hash == content_hash)
            .map(|entry| Arc::clone(&entry.diagnostics))
    }

    fn path_lock(&self, path: &Path) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        Arc::clone(locks.entry(path.to_path_buf()).or_default())
    }
}

/// Drop later duplicates of the same identity key, keeping first occurrence
/// order.
pub fn dedupe(diagnostics: Vec<Diagnostic>) -> Vec<Diagnostic> {
    let mut seen = HashSet::new();
    diagnostics
        .into_iter()
        .filter(|diag| seen.insert(diag.identity_key()))
        .collect()
}

fn hash_bytes(bytes: &[u8]) -> u64 {
    let mut hasher = DefaultHasher::new();
    hasher.write(bytes);
    hasher.finish()
}

fn file_mtime(path: &Path) -> DateTime<Local> {
    std::fs::metadata(path)
        .and_then(|m| m.modified())
        .map(DateTime::<Local>::from)
        .unwrap_or_else(|_| Local::now())
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    /// Minimal SLF0 container holding the given payload strings.
    fn slf_fixture(strings: &[&str]) -> Vec<u8> {
        let mut payload = Vec::new();
        payload.extend_from_slice(b"SLF0");
        payload.extend_from_slice(b"11#");
        payload.extend_from_slice(b"21%IDEActivityLogSection");
        for s in strings {
            payload.extend_from_slice(b"1@");
            payload.extend_from_slice(format!("{}\"", s.len()).as_bytes());
            payload.extend_from_slice(s.as_bytes());
        }

        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&payload).expect("compress");
        encoder.finish().expect("finish")
    }

    fn write_log(dir: &Path, name: &str, strings: &[&str]) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, slf_fixture(strings)).expect("write log");
        path
    }

    #[tokio::test]
    async fn test_scan_extracts_and_dedupes() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = write_log(
            dir.path(),
            "build.xcactivitylog",
            &[
                "/src/main.swift:10:5: error: cannot find 'foo' in scope",
                "/src/main.swift:10:5: error: cannot find 'foo' in scope",
                "/src/other.swift:3:1: warning: unused variable",
            ],
        );

        let scanner = BuildLogScanner::new();
        let diags = scanner.scan_path(&path, "MyApp").await.expect("scan");

        // The duplicate error collapses to one record.
        assert_eq!(diags.len(), 2);
        assert!(diags[0].is_error());
        assert_eq!(diags[0].project_name, "MyApp");
    }

    #[tokio::test]
    async fn test_rescan_unchanged_file_hits_cache() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = write_log(
            dir.path(),
            "build.xcactivitylog",
            &["/src/a.swift:1:1: error: boom"],
        );

        let scanner = BuildLogScanner::new();
        let first = scanner.scan_path(&path, "MyApp").await.expect("first");
        let second = scanner.scan_path(&path, "MyApp").await.expect("second");

        // Same Arc, not merely equal contents.
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn test_changed_file_invalidates_cache() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = write_log(
            dir.path(),
            "build.xcactivitylog",
            &["/src/a.swift:1:1: error: first build"],
        );

        let scanner = BuildLogScanner::new();
        let first = scanner.scan_path(&path, "MyApp").await.expect("first");
        assert_eq!(first.len(), 1);

        std::fs::write(
            &path,
            slf_fixture(&[
                "/src/a.swift:1:1: error: second build",
                "/src/b.swift:2:2: error: another",
            ]),
        )
        .expect("rewrite");

        let second = scanner.scan_path(&path, "MyApp").await.expect("second");
        assert_eq!(second.len(), 2);
        assert!(second[0].message.contains("second build"));
    }

    #[tokio::test]
    async fn test_project_without_log_fails() {
        let project = ProjectInfo {
            name: "NoLogs".to_string(),
            path: PathBuf::from("/tmp/NoLogs-abcd"),
            derived_data_dir: PathBuf::from("/tmp"),
            last_build_log_path: None,
            last_modified: Local::now(),
        };

        let scanner = BuildLogScanner::new();
        let err = scanner
            .static_diagnostics(&project)
            .await
            .expect_err("must fail");
        assert!(matches!(err, Error::BuildLogNotFound { .. }));
    }

    #[test]
    fn test_dedupe_keeps_first_occurrence() {
        let stamp = Local::now();
        let ctx = ParseContext::new("MyApp", SourceKind::BuildLog, stamp);
        let lines = [
            "/src/a.swift:1:1: error: same problem",
            "/src/b.swift:2:2: warning: different",
            "/src/a.swift:1:1: error: same problem",
        ];
        let parsed = DiagnosticParser::parse_all(lines, ctx);
        assert_eq!(parsed.len(), 3);

        let deduped = dedupe(parsed);
        assert_eq!(deduped.len(), 2);
        assert_eq!(deduped[0].id, 1);
        assert_eq!(deduped[1].id, 2);
    }
}
