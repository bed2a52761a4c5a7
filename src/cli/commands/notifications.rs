//! `medguard notifications`: display the missed-dose notification log.
//!
//! Usage:
//!   medguard notifications                  # last 50 entries
//!   medguard notifications --patient p1     # one patient's alerts

use crate::audit::NotificationLog;
use crate::cli::{load_settings, output, Cli};
use crate::errors::{MedGuardError, Result};

/// Execute the `notifications` command.
pub fn execute(cli: &Cli, last: usize, patient: Option<&str>) -> Result<()> {
    let settings = load_settings(cli)?;

    let log = NotificationLog::open(&settings.audit_path).ok_or_else(|| {
        MedGuardError::AuditError(format!(
            "failed to open notification log at {}",
            settings.audit_path.display()
        ))
    })?;

    let entries = log.query(last, patient)?;
    if entries.is_empty() {
        output::info("No notifications recorded.");
        return Ok(());
    }

    output::print_notifications_table(&entries);
    Ok(())
}
