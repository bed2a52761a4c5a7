use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{MedGuardError, Result};

/// Shortest accepted reconcile interval.
pub const MIN_RECONCILE_INTERVAL_SECS: u64 = 1;

/// Longest accepted reconcile interval (one hour).
pub const MAX_RECONCILE_INTERVAL_SECS: u64 = 3600;

/// Service configuration, loaded from `medguard.toml`.
///
/// Every field has a sensible default so medguard works out-of-the-box
/// without any config file at all.  Key material is never read from
/// this file; it comes from the environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    /// SQLite database holding users and medications.
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,

    /// SQLite database holding the notification log.
    #[serde(default = "default_audit_path")]
    pub audit_path: PathBuf,

    /// Seconds between reconciler passes (default: 60).
    #[serde(default = "default_reconcile_interval_secs")]
    pub reconcile_interval_secs: u64,

    /// When false, missed doses are still recorded but no alert is sent.
    #[serde(default = "default_notifications_enabled")]
    pub notifications_enabled: bool,
}

// ── Serde default helpers ────────────────────────────────────────────

fn default_database_path() -> PathBuf {
    PathBuf::from("medguard.db")
}

fn default_audit_path() -> PathBuf {
    PathBuf::from("medguard-notifications.db")
}

fn default_reconcile_interval_secs() -> u64 {
    60
}

fn default_notifications_enabled() -> bool {
    true
}

// ── Implementation ───────────────────────────────────────────────────

impl Default for Settings {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            audit_path: default_audit_path(),
            reconcile_interval_secs: default_reconcile_interval_secs(),
            notifications_enabled: default_notifications_enabled(),
        }
    }
}

impl Settings {
    /// Name of the config file we look for in the working directory.
    pub const FILE_NAME: &'static str = "medguard.toml";

    /// Load settings from `<dir>/medguard.toml`.
    ///
    /// If the file does not exist, sensible defaults are returned.
    pub fn load(dir: &Path) -> Result<Self> {
        Self::load_file(&dir.join(Self::FILE_NAME), false)
    }

    /// Load settings from an explicit path.
    ///
    /// With `required = true` a missing file is an error; otherwise
    /// defaults are returned.  A file that exists but does not parse or
    /// validate is always an error.
    pub fn load_file(path: &Path, required: bool) -> Result<Self> {
        if !path.exists() {
            if required {
                return Err(MedGuardError::ConfigError(format!(
                    "config file {} not found",
                    path.display()
                )));
            }
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path)?;

        let settings: Settings = toml::from_str(&contents).map_err(|e| {
            MedGuardError::ConfigError(format!("Failed to parse {}: {e}", path.display()))
        })?;

        settings.validate()?;
        Ok(settings)
    }

    /// Check value ranges.
    pub fn validate(&self) -> Result<()> {
        let secs = self.reconcile_interval_secs;
        if !(MIN_RECONCILE_INTERVAL_SECS..=MAX_RECONCILE_INTERVAL_SECS).contains(&secs) {
            return Err(MedGuardError::ConfigError(format!(
                "reconcile_interval_secs ({secs}) must be between \
                 {MIN_RECONCILE_INTERVAL_SECS} and {MAX_RECONCILE_INTERVAL_SECS}"
            )));
        }
        Ok(())
    }

    /// The reconcile interval as a `Duration`.
    pub fn reconcile_interval(&self) -> Duration {
        Duration::from_secs(self.reconcile_interval_secs)
    }
}

// ── Tests ────────────────────────────────────────────────────────────
