//! Feed configuration.
//!
//! A [`FeedConfig`] is immutable per repository instance. It can be built
//! programmatically (tests do this) or loaded from a TOML file; unspecified
//! keys take their defaults, and `NUFEED_*` environment variables override
//! keys from the file.
//!
//! ## Example configuration file
//!
//! ```toml
//! package_root = "/srv/feed/packages"
//! allow_override_existing_package_on_push = false
//! enable_delisting = true
//! initial_cache_rebuild_after_seconds = 15
//! ```
//!
//! ## Environment overrides
//!
//! Every recognized option has an environment variable named after it:
//! `NUFEED_PACKAGE_ROOT`, `NUFEED_ENABLE_DELISTING`,
//! `NUFEED_INITIAL_CACHE_REBUILD_AFTER_SECONDS`, and so on. Boolean values
//! accept `true`/`false`/`1`/`0`; an unparseable value is logged and
//! ignored.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::{Error, Result};

const fn default_true() -> bool {
    true
}

const fn default_rebuild_delay() -> u64 {
    15
}

/// Immutable per-instance feed settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    /// Root directory of the package store, the drop folder, and the
    /// snapshot file.
    pub package_root: PathBuf,

    /// Allow a push to overwrite an existing identity. When false, pushing
    /// a duplicate identity fails.
    #[serde(default = "default_true")]
    pub allow_override_existing_package_on_push: bool,

    /// Reject symbols packages on push.
    #[serde(default)]
    pub ignore_symbols_packages: bool,

    /// Removals unlist instead of deleting. Unlisted packages are excluded
    /// from search results but stay findable by id and version.
    #[serde(default)]
    pub enable_delisting: bool,

    /// Apply the framework compatibility filter in search.
    #[serde(default)]
    pub enable_framework_filtering: bool,

    /// Bind the filesystem watcher after the first package query.
    #[serde(default = "default_true")]
    pub enable_file_system_monitoring: bool,

    /// Start the background persist and rebuild timers for this instance.
    #[serde(default = "default_true")]
    pub enable_background_tasks: bool,

    /// Delay before the first background rebuild, in seconds.
    #[serde(default = "default_rebuild_delay")]
    pub initial_cache_rebuild_after_seconds: u64,
}

fn parse_bool_var(key: &str, value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        other => {
            warn!(key, value = other, "Ignoring non-boolean environment override");
            None
        },
    }
}

impl FeedConfig {
    /// Config with defaults for every option, rooted at `package_root`.
    #[must_use]
    pub fn new(package_root: PathBuf) -> Self {
        Self {
            package_root,
            allow_override_existing_package_on_push: true,
            ignore_symbols_packages: false,
            enable_delisting: false,
            enable_framework_filtering: false,
            enable_file_system_monitoring: true,
            enable_background_tasks: true,
            initial_cache_rebuild_after_seconds: default_rebuild_delay(),
        }
    }

    /// Load configuration from a TOML file, then apply `NUFEED_*`
    /// environment overrides.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read {}: {e}", path.display())))?;
        let mut config: Self = toml::from_str(&contents)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Override recognized options from `NUFEED_*` environment variables.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// The override body, parameterized over the variable source so tests
    /// need not mutate the process environment.
    fn apply_overrides(&mut self, get: impl Fn(&str) -> Option<String>) {
        if let Some(value) = get("NUFEED_PACKAGE_ROOT") {
            let trimmed = value.trim();
            if !trimmed.is_empty() {
                self.package_root = PathBuf::from(trimmed);
            }
        }

        let bool_overrides: [(&str, &mut bool); 6] = [
            (
                "NUFEED_ALLOW_OVERRIDE_EXISTING_PACKAGE_ON_PUSH",
                &mut self.allow_override_existing_package_on_push,
            ),
            (
                "NUFEED_IGNORE_SYMBOLS_PACKAGES",
                &mut self.ignore_symbols_packages,
            ),
            ("NUFEED_ENABLE_DELISTING", &mut self.enable_delisting),
            (
                "NUFEED_ENABLE_FRAMEWORK_FILTERING",
                &mut self.enable_framework_filtering,
            ),
            (
                "NUFEED_ENABLE_FILE_SYSTEM_MONITORING",
                &mut self.enable_file_system_monitoring,
            ),
            (
                "NUFEED_ENABLE_BACKGROUND_TASKS",
                &mut self.enable_background_tasks,
            ),
        ];
        for (key, field) in bool_overrides {
            if let Some(value) = get(key) {
                if let Some(parsed) = parse_bool_var(key, &value) {
                    *field = parsed;
                }
            }
        }

        if let Some(value) = get("NUFEED_INITIAL_CACHE_REBUILD_AFTER_SECONDS") {
            match value.trim().parse() {
                Ok(seconds) => self.initial_cache_rebuild_after_seconds = seconds,
                Err(_) => warn!(
                    key = "NUFEED_INITIAL_CACHE_REBUILD_AFTER_SECONDS",
                    value,
                    "Ignoring non-numeric environment override"
                ),
            }
        }
    }
}
