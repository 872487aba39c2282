//! Build artifact discovery.
//!
//! Scans DerivedData roots for per-project build directories and resolves
//! each project's most recent activity log. Also locates the matching
//! `.xcodeproj`/`.xcworkspace` bundle under configured workspace roots so a
//! live build can be launched.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, Local};
use serde::Serialize;

use crate::types::ProjectInfo;

/// Default maximum search depth for project bundles
pub const DEFAULT_MAX_DEPTH: usize = 3;

/// DerivedData subdirectories that are not project build dirs
const SKIP_DIRECTORIES: &[&str] = &["ModuleCache.noindex", "SymbolCache", "Index.noindex"];

/// Directories to skip while searching workspace roots
const SKIP_SEARCH_DIRECTORIES: &[&str] = &[
    "node_modules",
    "build",
    "DerivedData",
    ".git",
    ".build",
    "Pods",
    "Carthage",
    "target",
];

/// Where to look for artifacts and project bundles
#[derive(Debug, Clone)]
pub struct LocatorConfig {
    /// DerivedData roots holding per-project build directories
    pub derived_data_roots: Vec<PathBuf>,

    /// Roots searched for `.xcodeproj` / `.xcworkspace` bundles
    pub workspace_roots: Vec<PathBuf>,

    pub max_depth: usize,
}

impl Default for LocatorConfig {
    fn default() -> Self {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        Self {
            derived_data_roots: vec![home
                .join("Library")
                .join("Developer")
                .join("Xcode")
                .join("DerivedData")],
            workspace_roots: vec![
                home.join("Desktop"),
                home.join("Documents"),
                home.join("Developer"),
            ],
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

/// Result of a discovery scan
#[derive(Debug, Default, Serialize)]
pub struct DiscoveryReport {
    /// Discovered projects, sorted by last-modified descending
    pub projects: Vec<ProjectInfo>,

    /// Non-fatal problems hit during the scan (missing roots, unreadable dirs)
    pub warnings: Vec<String>,
}

/// Discovers build targets and their most recent build artifacts
#[derive(Debug, Clone)]
pub struct ProjectLocator {
    config: LocatorConfig,
}

impl ProjectLocator {
    pub fn new(config: LocatorConfig) -> Self {
        Self { config }
    }

    /// Scan all configured DerivedData roots.
    ///
    /// A missing root degrades the result with a warning instead of failing.
    pub fn discover(&self) -> DiscoveryReport {
        let mut report = DiscoveryReport::default();

        for root in &self.config.derived_data_roots {
            if !root.is_dir() {
                report
                    .warnings
                    .push(format!("DerivedData root not found: {}", root.display()));
                continue;
            }

            let entries = match fs::read_dir(root) {
                Ok(entries) => entries,
                Err(err) => {
                    report
                        .warnings
                        .push(format!("cannot read {}: {}", root.display(), err));
                    continue;
                }
            };

            for entry in entries.flatten() {
                let path = entry.path();
                if !path.is_dir() {
                    continue;
                }
                let dir_name = entry.file_name().to_string_lossy().to_string();
                if dir_name.starts_with('.') || SKIP_DIRECTORIES.contains(&dir_name.as_str()) {
                    continue;
                }

                let last_modified = modified_time(&path);
                report.projects.push(ProjectInfo {
                    name: project_name(&dir_name),
                    path: path.clone(),
                    derived_data_dir: root.clone(),
                    last_build_log_path: newest_build_log(&path),
                    last_modified,
                });
            }
        }

        report
            .projects
            .sort_by(|a, b| b.last_modified.cmp(&a.last_modified));
        report
    }

    /// Find a discovered project by name (case-insensitive).
    pub fn find_project(&self, name: &str) -> Option<ProjectInfo> {
        let lower = name.to_lowercase();
        self.discover()
            .projects
            .into_iter()
            .find(|p| p.name.to_lowercase() == lower)
    }

    /// The most recently modified project, if any.
    pub fn most_recent(&self) -> Option<ProjectInfo> {
        self.discover().projects.into_iter().next()
    }

    /// Locate the `.xcworkspace` (preferred) or `.xcodeproj` bundle for a
    /// project by searching the configured workspace roots.
    pub fn find_project_file(&self, name: &str) -> Option<PathBuf> {
        for ext in ["xcworkspace", "xcodeproj"] {
            let bundle = format!("{name}.{ext}");
            for root in &self.config.workspace_roots {
                if let Some(found) = search_bundle(root, &bundle, self.config.max_depth) {
                    return Some(found);
                }
            }
        }
        None
    }

    pub fn config(&self) -> &LocatorConfig {
        &self.config
    }
}

/// Strip the build-hash suffix from a DerivedData directory name
/// (`MyApp-abcdefgh` → `MyApp`). Names without a suffix pass through.
fn project_name(dir_name: &str) -> String {
    match dir_name.rsplit_once('-') {
        Some((name, hash)) if !name.is_empty() && hash.chars().all(char::is_alphanumeric) => {
            name.to_string()
        }
        _ => dir_name.to_string(),
    }
}

/// Newest `.xcactivitylog` under `<project>/Logs/Build`, by mtime.
fn newest_build_log(project_dir: &Path) -> Option<PathBuf> {
    let logs_dir = project_dir.join("Logs").join("Build");
    let entries = fs::read_dir(&logs_dir).ok()?;

    entries
        .flatten()
        .map(|e| e.path())
        .filter(|p| {
            p.extension()
                .map(|ext| ext == "xcactivitylog")
                .unwrap_or(false)
        })
        .max_by_key(|p| {
            fs::metadata(p)
                .and_then(|m| m.modified())
                .unwrap_or(SystemTime::UNIX_EPOCH)
        })
}

fn modified_time(path: &Path) -> DateTime<Local> {
    fs::metadata(path)
        .and_then(|m| m.modified())
        .map(DateTime::<Local>::from)
        .unwrap_or_else(|_| Local::now())
}

/// Depth-bounded search for a named bundle directory.
fn search_bundle(root: &Path, bundle: &str, depth: usize) -> Option<PathBuf> {
    let candidate = root.join(bundle);
    if candidate.exists() {
        return Some(candidate);
    }
    if depth == 0 {
        return None;
    }

    let entries = fs::read_dir(root).ok()?;
    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().to_string();
        if name.starts_with('.') || SKIP_SEARCH_DIRECTORIES.contains(&name.as_str()) {
            continue;
        }
        if let Some(found) = search_bundle(&path, bundle, depth - 1) {
            return Some(found);
        }
    }
    None
}
