//! Storage collaborator for medications, users and caregiver links.
//!
//! The reconciler only needs `find_by_status`, `bulk_set_status` and
//! `find_assigned_notifiee`; the rest backs the user-facing commands.
//! `SqliteStore` is the bundled implementation.

pub mod sqlite;

use std::fmt;
use std::str::FromStr;

use serde_json::Value;

use crate::errors::{MedGuardError, Result};
use crate::medication::{Status, StoredMedication};

pub use sqlite::SqliteStore;

/// One conditional status change: applied only if the row is still `from`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusTransition {
    pub id: String,
    pub from: Status,
    pub to: Status,
}

/// Result of an explicit "mark taken" action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TakenOutcome {
    /// The entry moved to `taken` from the given state.
    Applied,
    /// The entry was already `taken`; nothing was written.
    AlreadyTaken,
}

/// Who to tell when a patient misses a dose.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notifiee {
    pub caregiver_id: String,
    /// Push recipient token of the caregiver.
    pub token: String,
    pub patient_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Patient,
    Caregiver,
}

impl Role {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Patient => "patient",
            Self::Caregiver => "caregiver",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = MedGuardError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "patient" => Ok(Self::Patient),
            "caregiver" => Ok(Self::Caregiver),
            other => Err(MedGuardError::InvalidRecord(format!(
                "role '{other}' is not one of patient, caregiver"
            ))),
        }
    }
}

/// A registered user.  `profile` holds codec output (or `null`).
#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub id: String,
    pub name: String,
    pub role: Role,
    pub fcm_token: Option<String>,
    pub profile: Value,
}

/// Persistence operations the core depends on.
///
/// Every status write is conditional so that concurrent writers cannot
/// move an entry out of `taken`.
pub trait MedicationStore: Send + Sync {
    /// All medications currently in `status`, oldest first.
    fn find_by_status(&self, status: Status) -> Result<Vec<StoredMedication>>;

    /// Apply each transition independently; returns the ids that changed.
    fn bulk_set_status(&self, transitions: &[StatusTransition]) -> Result<Vec<String>>;

    /// The caregiver (with a push token) assigned to the medication's owner.
    fn find_assigned_notifiee(&self, medication: &StoredMedication) -> Result<Option<Notifiee>>;

    fn insert(&self, medication: &StoredMedication) -> Result<()>;

    fn get(&self, id: &str) -> Result<Option<StoredMedication>>;

    /// A user's medications, optionally filtered by status.
    fn list_for_user(&self, user_id: &str, status: Option<Status>)
        -> Result<Vec<StoredMedication>>;

    /// Set `taken` unless already `taken`.  Unknown ids are an error.
    fn mark_taken(&self, user_id: &str, id: &str) -> Result<TakenOutcome>;

    /// Delete every `missed` entry of `user_id`, returning what was removed.
    fn purge_missed(&self, user_id: &str) -> Result<Vec<StoredMedication>>;

    fn add_user(&self, user: &User) -> Result<()>;

    fn get_user(&self, id: &str) -> Result<Option<User>>;

    fn assign_caregiver(&self, caregiver_id: &str, patient_id: &str) -> Result<()>;
}
