//! `medguard user`: register users, show them, link caregivers.

use serde_json::Value;

use crate::cli::{load_keys, load_settings, open_store, output, Cli};
use crate::crypto::codec;
use crate::errors::{MedGuardError, Result};
use crate::store::{MedicationStore, Role, User};

/// Execute `user add`.
pub fn execute_add(
    cli: &Cli,
    id: &str,
    name: &str,
    role: &str,
    fcm_token: Option<&str>,
    profile_json: Option<&str>,
) -> Result<()> {
    let role: Role = role.parse()?;

    let profile = match profile_json {
        Some(text) => {
            let plain: Value = serde_json::from_str(text)
                .map_err(|e| MedGuardError::InvalidRecord(format!("--profile-json: {e}")))?;
            codec::encrypt_record(&load_keys()?, &plain)?
        }
        None => Value::Null,
    };

    let settings = load_settings(cli)?;
    let store = open_store(&settings)?;
    store.add_user(&User {
        id: id.to_string(),
        name: name.to_string(),
        role,
        fcm_token: fcm_token.filter(|t| !t.is_empty()).map(String::from),
        profile,
    })?;

    output::success(&format!("Added {role} '{id}' ({name})"));
    if role == Role::Caregiver && fcm_token.is_none() {
        output::tip("Caregivers without --fcm-token receive no missed-dose alerts.");
    }
    Ok(())
}

/// Execute `user show`.
pub fn execute_show(cli: &Cli, id: &str) -> Result<()> {
    let settings = load_settings(cli)?;
    let store = open_store(&settings)?;
    let user = store
        .get_user(id)?
        .ok_or_else(|| MedGuardError::UserNotFound(id.to_string()))?;

    output::info(&format!("{} ({}, {})", user.name, user.id, user.role));
    if user.profile.is_null() {
        return Ok(());
    }

    let record = codec::decrypt_record(&load_keys()?, &user.profile);
    output::print_record(record.value());
    for failure in record.failures() {
        output::warning(&format!(
            "profile field '{}' could not be decrypted ({:?})",
            failure.path, failure.kind
        ));
    }
    Ok(())
}

/// Execute `user assign`.
pub fn execute_assign(cli: &Cli, caregiver: &str, patient: &str) -> Result<()> {
    let settings = load_settings(cli)?;
    let store = open_store(&settings)?;
    store.assign_caregiver(caregiver, patient)?;
    output::success(&format!("{caregiver} now receives alerts for {patient}"));
    Ok(())
}
