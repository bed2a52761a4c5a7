//! `medguard med`: add, list, show, take and purge medications.

use dialoguer::Confirm;

use crate::cli::output::{self, MedicationRow};
use crate::cli::{load_keys, load_settings, open_store, Cli};
use crate::crypto::CipherKeys;
use crate::errors::{MedGuardError, Result};
use crate::medication::{NewMedication, Status, StoredMedication};
use crate::store::{MedicationStore, TakenOutcome};

/// Execute `med add`.
pub fn execute_add(cli: &Cli, user: &str, new: &NewMedication) -> Result<()> {
    let settings = load_settings(cli)?;
    let keys = load_keys()?;
    let store = open_store(&settings)?;

    let med = StoredMedication::seal(&keys, user, new)?;
    store.insert(&med)?;

    output::success(&format!("Added medication {}", med.id));
    output::tip(&format!("'{}' for {user}, daily at {}", new.name, new.time));
    Ok(())
}

/// Execute `med list`.
pub fn execute_list(cli: &Cli, user: &str, status: Option<&str>) -> Result<()> {
    let status = status.map(str::parse::<Status>).transpose()?;

    let settings = load_settings(cli)?;
    let keys = load_keys()?;
    let store = open_store(&settings)?;

    let meds = store.list_for_user(user, status)?;
    let rows: Vec<MedicationRow> = meds.iter().map(|m| to_row(&keys, m)).collect();

    output::info(&format!("{user}: {} medication(s)", rows.len()));
    output::print_medications_table(&rows);
    Ok(())
}

/// Execute `med show`.
pub fn execute_show(cli: &Cli, id: &str) -> Result<()> {
    let settings = load_settings(cli)?;
    let keys = load_keys()?;
    let store = open_store(&settings)?;

    let med = store
        .get(id)?
        .ok_or_else(|| MedGuardError::MedicationNotFound(id.to_string()))?;
    let record = med.decrypt(&keys);

    output::print_record(record.value());
    for failure in record.failures() {
        output::warning(&format!(
            "field '{}' could not be decrypted ({:?})",
            failure.path, failure.kind
        ));
    }
    Ok(())
}

/// Execute `med take`.
pub fn execute_take(cli: &Cli, user: &str, id: &str) -> Result<()> {
    let settings = load_settings(cli)?;
    let store = open_store(&settings)?;

    match store.mark_taken(user, id)? {
        TakenOutcome::Applied => output::success(&format!("Marked {id} as taken")),
        TakenOutcome::AlreadyTaken => output::info(&format!("{id} was already taken")),
    }
    Ok(())
}

/// Execute `med purge`.
pub fn execute_purge(cli: &Cli, user: &str, force: bool) -> Result<()> {
    if !force {
        let confirmed = Confirm::new()
            .with_prompt(format!("Delete every missed medication of '{user}'?"))
            .default(false)
            .interact()
            .map_err(|e| MedGuardError::CommandFailed(format!("confirm prompt: {e}")))?;

        if !confirmed {
            output::info("Cancelled.");
            return Ok(());
        }
    }

    let settings = load_settings(cli)?;
    let store = open_store(&settings)?;

    let removed = store.purge_missed(user)?;
    if removed.is_empty() {
        output::info(&format!("{user} has no missed medications."));
    } else {
        output::success(&format!(
            "Deleted {} missed medication(s) of {user}",
            removed.len()
        ));
    }
    Ok(())
}

/// Decrypt the display fields of one entry.  Failed fields show as `-`.
fn to_row(keys: &CipherKeys, med: &StoredMedication) -> MedicationRow {
    let record = med.decrypt(keys);
    let failed = |name: &str| record.failures().iter().any(|f| f.path == name);
    let field = |name: &str| {
        if failed(name) {
            "-".to_string()
        } else {
            output::cell(record.value().get(name))
        }
    };

    MedicationRow {
        id: med.id.clone(),
        name: field("name"),
        dosage: field("dosage"),
        time: field("time"),
        status: med.status,
        partial: !record.is_complete(),
    }
}
