//! CLI module: Clap argument parser, output helpers, and command implementations.

pub mod commands;
pub mod output;

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;

use crate::audit::NotificationLog;
use crate::config::Settings;
use crate::crypto::CipherKeys;
use crate::errors::Result;
use crate::notify::{DisabledDispatcher, LogDispatcher, NotificationDispatcher};
use crate::reconciler::Reconciler;
use crate::store::SqliteStore;

/// MedGuard CLI: encrypted medication tracking with missed-dose alerts.
#[derive(Parser)]
#[command(
    name = "medguard",
    about = "Encrypted medication tracking with missed-dose alerts",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Settings file (default: ./medguard.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Database file, overrides `database_path` from the settings
    #[arg(long, global = true, env = "MEDGUARD_DB")]
    pub db: Option<PathBuf>,
}

/// All available subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Generate a fresh cipher key and MAC key
    Keygen,

    /// Run the reconciler until interrupted (Ctrl-C)
    Run,

    /// Run one reconciler pass now
    Reconcile {
        /// Compare against this time of day instead of the clock (e.g. 21:30)
        #[arg(long)]
        at: Option<String>,
    },

    /// Manage medications
    Med {
        #[command(subcommand)]
        action: MedAction,
    },

    /// Manage patients, caregivers and assignments
    User {
        #[command(subcommand)]
        action: UserAction,
    },

    /// View the missed-dose notification log
    Notifications {
        /// Number of entries to show (default: 50)
        #[arg(long, default_value = "50")]
        last: usize,
        /// Only show entries for this patient
        #[arg(long)]
        patient: Option<String>,
    },

    /// Generate shell completion scripts
    Completions {
        /// Shell to generate completions for (bash, zsh, fish, powershell)
        shell: String,
    },
}

/// Medication subcommands.
#[derive(clap::Subcommand)]
pub enum MedAction {
    /// Add a medication for a patient
    Add {
        /// Patient the medication belongs to
        #[arg(long)]
        user: String,
        /// Medication name
        #[arg(long)]
        name: String,
        /// Dosage, e.g. "500mg"
        #[arg(long, default_value = "")]
        dosage: String,
        /// Frequency, e.g. "daily"
        #[arg(long, default_value = "daily")]
        frequency: String,
        /// Scheduled time of day, e.g. "08:00 AM" or "20:30"
        #[arg(long)]
        time: String,
        /// Free-text instructions
        #[arg(long, default_value = "")]
        instructions: String,
        /// Next refill date
        #[arg(long)]
        refill_date: Option<String>,
        /// Flag the supply as running low
        #[arg(long)]
        low_supply: bool,
        /// Enable reminders for this medication
        #[arg(long)]
        notify: bool,
        /// Initial status (upcoming, taken, missed)
        #[arg(long, default_value = "upcoming")]
        status: String,
    },

    /// List a patient's medications
    List {
        #[arg(long)]
        user: String,
        /// Only show this status (upcoming, taken, missed)
        #[arg(long)]
        status: Option<String>,
    },

    /// Show one medication with every field decrypted
    Show {
        /// Medication id
        id: String,
    },

    /// Mark a medication as taken
    Take {
        #[arg(long)]
        user: String,
        /// Medication id
        id: String,
    },

    /// Delete every missed medication of a patient
    Purge {
        #[arg(long)]
        user: String,
        /// Skip confirmation prompt
        #[arg(short, long)]
        force: bool,
    },
}

/// User subcommands.
#[derive(clap::Subcommand)]
pub enum UserAction {
    /// Register a patient or caregiver
    Add {
        /// User id
        id: String,
        #[arg(long)]
        name: String,
        /// patient or caregiver
        #[arg(long, default_value = "patient")]
        role: String,
        /// Push recipient token (caregivers)
        #[arg(long)]
        fcm_token: Option<String>,
        /// Profile as JSON; every leaf is stored encrypted
        #[arg(long)]
        profile_json: Option<String>,
    },

    /// Show a user with the profile decrypted
    Show {
        /// User id
        id: String,
    },

    /// Assign a caregiver to a patient
    Assign {
        #[arg(long)]
        caregiver: String,
        #[arg(long)]
        patient: String,
    },
}

// ---------------------------------------------------------------------------
// Shared helpers used by multiple commands
// ---------------------------------------------------------------------------

/// Load settings from `--config`, or `./medguard.toml` if present, then
/// apply `--db`.
pub fn load_settings(cli: &Cli) -> Result<Settings> {
    let mut settings = match &cli.config {
        Some(path) => Settings::load_file(path, true)?,
        None => Settings::load(&std::env::current_dir()?)?,
    };
    if let Some(db) = &cli.db {
        settings.database_path = db.clone();
    }
    Ok(settings)
}

/// Open the medication database named by the settings.
pub fn open_store(settings: &Settings) -> Result<SqliteStore> {
    SqliteStore::open(&settings.database_path)
}

/// Load key material from the environment.
pub fn load_keys() -> Result<CipherKeys> {
    CipherKeys::from_env()
}

/// Build a reconciler wired to the configured dispatcher and
/// notification log.
pub fn build_reconciler(
    settings: &Settings,
    store: Arc<SqliteStore>,
    keys: Arc<CipherKeys>,
) -> Reconciler {
    let dispatcher: Arc<dyn NotificationDispatcher> = if settings.notifications_enabled {
        Arc::new(LogDispatcher)
    } else {
        Arc::new(DisabledDispatcher)
    };

    let reconciler = Reconciler::new(store, keys, dispatcher);
    match NotificationLog::open(&settings.audit_path) {
        Some(log) => reconciler.with_notification_log(Arc::new(log)),
        None => {
            output::warning(&format!(
                "notification log at {} unavailable; alerts will not be recorded",
                settings.audit_path.display()
            ));
            reconciler
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_med_add() {
        let cli = Cli::try_parse_from([
            "medguard", "med", "add", "--user", "p1", "--name", "Aspirin", "--time", "08:00 AM",
        ])
        .unwrap();
        match cli.command {
            Commands::Med {
                action:
                    MedAction::Add {
                        user,
                        time,
                        notify,
                        status,
                        ..
                    },
            } => {
                assert_eq!(user, "p1");
                assert_eq!(time, "08:00 AM");
                assert!(!notify);
                assert_eq!(status, "upcoming");
            }
            _ => panic!("expected med add"),
        }
    }

    #[test]
    fn parses_med_add_with_status_and_notify() {
        let cli = Cli::try_parse_from([
            "medguard", "med", "add", "--user", "p1", "--name", "Aspirin", "--time", "08:00 AM",
            "--status", "missed", "--notify",
        ])
        .unwrap();
        match cli.command {
            Commands::Med {
                action: MedAction::Add { notify, status, .. },
            } => {
                assert!(notify);
                assert_eq!(status, "missed");
            }
            _ => panic!("expected med add"),
        }
    }

    #[test]
    fn db_flag_overrides_settings() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = dir.path().join("custom.toml");
        std::fs::write(&config, "database_path = \"from-file.db\"\n").unwrap();

        let cli = Cli::try_parse_from([
            "medguard",
            "--config",
            config.to_str().unwrap(),
            "--db",
            "override.db",
            "keygen",
        ])
        .unwrap();
        let settings = load_settings(&cli).unwrap();
        assert_eq!(settings.database_path, PathBuf::from("override.db"));
    }

    #[test]
    fn missing_explicit_config_is_an_error() {
        let cli = Cli::try_parse_from([
            "medguard",
            "--config",
            "/nonexistent/medguard.toml",
            "keygen",
        ])
        .unwrap();
        assert!(load_settings(&cli).is_err());
    }
}
