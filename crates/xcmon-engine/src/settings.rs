//! Engine configuration.
//!
//! Loaded from `~/.config/xcmon/config.toml` (or a path given with
//! `--config`). Every field has a default, so a missing file means default
//! behavior, while an explicitly named file that is missing or malformed is
//! a configuration error.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use xcmon_core::locator::{LocatorConfig, DEFAULT_MAX_DEPTH};
use xcmon_core::prelude::*;

use xcmon_daemon::monitor::{DEFAULT_DIAGNOSTIC_CAPACITY, DEFAULT_LINE_CAPACITY};
use xcmon_daemon::BusyPolicy;

/// Default wall-clock limit for a live build
pub const DEFAULT_BUILD_TIMEOUT_SECS: u64 = 600;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// DerivedData roots to scan; empty means the standard Xcode location
    pub derived_data_roots: Vec<PathBuf>,

    /// Roots searched for project bundles; empty means the standard set
    pub workspace_roots: Vec<PathBuf>,

    /// Maximum depth when searching workspace roots
    pub search_depth: usize,

    /// Wall-clock limit for a live build, in seconds
    pub build_timeout_secs: u64,

    /// When set, a busy project waits up to this long instead of being
    /// rejected outright
    pub busy_wait_secs: Option<u64>,

    /// Retained lines per monitor session
    pub line_buffer_capacity: usize,

    /// Retained diagnostics per monitor session
    pub diagnostic_buffer_capacity: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            derived_data_roots: Vec::new(),
            workspace_roots: Vec::new(),
            search_depth: DEFAULT_MAX_DEPTH,
            build_timeout_secs: DEFAULT_BUILD_TIMEOUT_SECS,
            busy_wait_secs: None,
            line_buffer_capacity: DEFAULT_LINE_CAPACITY,
            diagnostic_buffer_capacity: DEFAULT_DIAGNOSTIC_CAPACITY,
        }
    }
}

impl Settings {
    /// Load settings.
    ///
    /// An explicit path must exist and parse. Without one, the default
    /// config path is tried; absence there just yields defaults.
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        let (path, required) = match explicit_path {
            Some(path) => (path.to_path_buf(), true),
            None => match default_path() {
                Some(path) => (path, false),
                None => return Ok(Self::default()),
            },
        };

        if !path.is_file() {
            if required {
                return Err(Error::config(format!(
                    "config file not found: {}",
                    path.display()
                )));
            }
            return Ok(Self::default());
        }

        let text = std::fs::read_to_string(&path)
            .map_err(|e| Error::config(format!("cannot read {}: {e}", path.display())))?;
        let settings: Settings = toml::from_str(&text)
            .map_err(|e| Error::config(format!("invalid config {}: {e}", path.display())))?;

        debug!("Loaded settings from {}", path.display());
        Ok(settings)
    }

    /// Translate the configured roots into a locator config, falling back
    /// to the standard locations for any empty list.
    pub fn locator_config(&self) -> LocatorConfig {
        let defaults = LocatorConfig::default();
        LocatorConfig {
            derived_data_roots: if self.derived_data_roots.is_empty() {
                defaults.derived_data_roots
            } else {
                self.derived_data_roots.clone()
            },
            workspace_roots: if self.workspace_roots.is_empty() {
                defaults.workspace_roots
            } else {
                self.workspace_roots.clone()
            },
            max_depth: self.search_depth,
        }
    }

    pub fn build_timeout(&self) -> Duration {
        Duration::from_secs(self.build_timeout_secs)
    }

    pub fn busy_policy(&self) -> BusyPolicy {
        match self.busy_wait_secs {
            Some(secs) => BusyPolicy::Wait(Duration::from_secs(secs)),
            None => BusyPolicy::Reject,
        }
    }
}

/// Standard config file location: `~/.config/xcmon/config.toml`
pub fn default_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("xcmon").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.build_timeout_secs, DEFAULT_BUILD_TIMEOUT_SECS);
        assert_eq!(settings.busy_policy(), BusyPolicy::Reject);
        assert!(!settings.locator_config().derived_data_roots.is_empty());
    }

    #[test]
    fn test_load_explicit_file() {
        let mut file = tempfile::NamedTempFile::new().expect("tempfile");
        writeln!(
            file,
            "derived_data_roots = [\"/custom/derived\"]\n\
             build_timeout_secs = 120\n\
             busy_wait_secs = 30\n"
        )
        .expect("write");

        let settings = Settings::load(Some(file.path())).expect("load");
        assert_eq!(settings.build_timeout_secs, 120);
        assert_eq!(
            settings.busy_policy(),
            BusyPolicy::Wait(Duration::from_secs(30))
        );
        assert_eq!(
            settings.locator_config().derived_data_roots,
            vec![PathBuf::from("/custom/derived")]
        );
        // Unset fields keep their defaults.
        assert_eq!(settings.line_buffer_capacity, DEFAULT_LINE_CAPACITY);
    }

    #[test]
    fn test_load_missing_explicit_file_is_error() {
        let err = Settings::load(Some(Path::new("/nonexistent/xcmon.toml")))
            .expect_err("must fail");
        assert!(matches!(err, Error::Config { .. }));
    }

    #[test]
    fn test_load_invalid_toml_is_error() {
        let mut file = tempfile::NamedTempFile::new().expect("tempfile");
        writeln!(file, "build_timeout_secs = \"not a number\"").expect("write");

        let err = Settings::load(Some(file.path())).expect_err("must fail");
        assert!(matches!(err, Error::Config { .. }));
    }

    #[test]
    fn test_roundtrip_serialization() {
        let settings = Settings {
            busy_wait_secs: Some(15),
            ..Settings::default()
        };
        let text = toml::to_string(&settings).expect("serialize");
        let back: Settings = toml::from_str(&text).expect("deserialize");
        assert_eq!(back.busy_wait_secs, Some(15));
    }
}
