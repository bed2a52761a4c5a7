//! Medication records as entered by a user and as stored (encrypted).
//!
//! `id`, `user_id` and `status` stay in plaintext so the store can filter
//! and update on them; every other field goes through the codec.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::schedule;
use crate::crypto::codec::{self, DecryptedRecord};
use crate::crypto::CipherKeys;
use crate::errors::{MedGuardError, Result};

/// Fields never passed through the codec.
pub const EXEMPT_FIELDS: &[&str] = &["id", "user_id", "status"];

/// Lifecycle state of a medication entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Upcoming,
    Taken,
    Missed,
}

impl Status {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Upcoming => "upcoming",
            Self::Taken => "taken",
            Self::Missed => "missed",
        }
    }

    /// `taken` is absorbing: nothing moves an entry out of it.
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Taken)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = MedGuardError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "upcoming" => Ok(Self::Upcoming),
            "taken" => Ok(Self::Taken),
            "missed" => Ok(Self::Missed),
            other => Err(MedGuardError::InvalidRecord(format!(
                "status '{other}' is not one of upcoming, taken, missed"
            ))),
        }
    }
}

fn default_status() -> Status {
    Status::Upcoming
}

/// A medication as submitted by the user, before encryption.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewMedication {
    pub name: String,
    pub dosage: String,
    pub frequency: String,
    /// Scheduled time of day, e.g. `08:00 AM`.
    pub time: String,
    pub instructions: String,
    #[serde(default = "default_status", skip_serializing)]
    pub status: Status,
    #[serde(default)]
    pub refill_date: Option<String>,
    #[serde(default)]
    pub low_supply: bool,
    #[serde(default)]
    pub notification: bool,
}

impl NewMedication {
    /// Check the fields the reconciler depends on.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(MedGuardError::InvalidRecord(
                "medication name cannot be empty".into(),
            ));
        }
        schedule::parse_time(&self.time)?;
        Ok(())
    }
}

/// A medication as persisted: plaintext keys plus encrypted fields.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredMedication {
    pub id: String,
    pub user_id: String,
    pub status: Status,
    /// Codec output for every non-exempt field.
    pub fields: Map<String, Value>,
    pub created_at: DateTime<Utc>,
}

impl StoredMedication {
    /// Validate and encrypt a new medication for `user_id`.
    pub fn seal(keys: &CipherKeys, user_id: &str, new: &NewMedication) -> Result<Self> {
        new.validate()?;

        let plain = serde_json::to_value(new)
            .map_err(|e| MedGuardError::SerializationError(format!("medication: {e}")))?;
        let Value::Object(plain) = plain else {
            return Err(MedGuardError::SerializationError(
                "medication did not serialize to an object".into(),
            ));
        };

        let fields = codec::encrypt_fields(keys, &plain, EXEMPT_FIELDS)?;

        Ok(Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            status: new.status,
            fields,
            created_at: Utc::now(),
        })
    }

    /// Decrypt one field.  Missing fields are an `InvalidRecord` error.
    pub fn decrypt_field(&self, keys: &CipherKeys, name: &str) -> Result<Value> {
        match self.fields.get(name) {
            Some(Value::String(blob)) => codec::decrypt_leaf(keys, blob),
            Some(Value::Null) | None => Err(MedGuardError::InvalidRecord(format!(
                "medication {} has no '{name}' field",
                self.id
            ))),
            Some(other) => Ok(other.clone()),
        }
    }

    /// Decrypt one field and render it as text.
    pub fn decrypt_text(&self, keys: &CipherKeys, name: &str) -> Result<String> {
        Ok(match self.decrypt_field(keys, name)? {
            Value::String(s) => s,
            other => other.to_string(),
        })
    }

    /// Decrypt the whole entry, with the plaintext keys merged back in.
    pub fn decrypt(&self, keys: &CipherKeys) -> DecryptedRecord {
        let mut record = self.fields.clone();
        record.insert("id".into(), Value::String(self.id.clone()));
        record.insert("user_id".into(), Value::String(self.user_id.clone()));
        record.insert("status".into(), Value::String(self.status.to_string()));
        codec::decrypt_fields(keys, &record, EXEMPT_FIELDS)
    }
}
