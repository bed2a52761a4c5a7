//! SQLite-backed `MedicationStore`.
//!
//! Medications keep `id`, `user_id` and `status` as columns and the
//! encrypted fields as one JSON text column.  The connection sits behind
//! a mutex so the store can be shared with the background reconciler.

use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, Params, Row};
use serde_json::{Map, Value};
use tracing::warn;

use super::{MedicationStore, Notifiee, Role, StatusTransition, TakenOutcome, User};
use crate::errors::{MedGuardError, Result};
use crate::medication::{Status, StoredMedication};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS users (
    id          TEXT PRIMARY KEY,
    name        TEXT NOT NULL,
    role        TEXT NOT NULL CHECK (role IN ('patient', 'caregiver')),
    fcm_token   TEXT,
    profile     TEXT
);
CREATE TABLE IF NOT EXISTS caregiver_assignments (
    caregiver_id TEXT NOT NULL REFERENCES users(id),
    patient_id   TEXT NOT NULL REFERENCES users(id),
    PRIMARY KEY (caregiver_id, patient_id)
);
CREATE TABLE IF NOT EXISTS medications (
    id          TEXT PRIMARY KEY,
    user_id     TEXT NOT NULL,
    status      TEXT NOT NULL CHECK (status IN ('upcoming', 'taken', 'missed')),
    fields      TEXT NOT NULL,
    created_at  TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_medications_status ON medications(status);
CREATE INDEX IF NOT EXISTS idx_medications_user ON medications(user_id, status);
";

const SELECT_MEDICATION: &str = "SELECT id, user_id, status, fields, created_at FROM medications";

/// How long a writer waits on a locked database file before giving up.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) the database file at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;

        // Owner-only: the file holds ciphertext, but also plaintext ids.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o600);
            let _ = std::fs::set_permissions(path, perms);
        }

        Self::init(conn)
    }

    /// A private in-memory database, for tests and dry runs.
    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

struct MedicationRow {
    id: String,
    user_id: String,
    status: String,
    fields: String,
    created_at: String,
}

impl MedicationRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            user_id: row.get(1)?,
            status: row.get(2)?,
            fields: row.get(3)?,
            created_at: row.get(4)?,
        })
    }

    fn into_medication(self) -> Result<StoredMedication> {
        let fields: Map<String, Value> = serde_json::from_str(&self.fields).map_err(|e| {
            MedGuardError::InvalidRecord(format!("medication {} fields: {e}", self.id))
        })?;
        let created_at = match DateTime::parse_from_rfc3339(&self.created_at) {
            Ok(dt) => dt.with_timezone(&Utc),
            Err(e) => {
                warn!(
                    medication_id = %self.id,
                    raw = %self.created_at,
                    error = %e,
                    "unreadable created_at; using the current time"
                );
                Utc::now()
            }
        };

        Ok(StoredMedication {
            status: self.status.parse()?,
            id: self.id,
            user_id: self.user_id,
            fields,
            created_at,
        })
    }
}

/// Run a medication query.  Rows whose stored content cannot be parsed are
/// logged and left out so one corrupt entry cannot hide the others; errors
/// reading from SQLite itself still propagate.
fn query_medications<P: Params>(
    conn: &Connection,
    sql: &str,
    params: P,
) -> Result<Vec<StoredMedication>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params, MedicationRow::read)?;

    let mut out = Vec::new();
    for row in rows {
        match row?.into_medication() {
            Ok(med) => out.push(med),
            Err(e) => warn!(error = %e, "skipping unreadable medication row"),
        }
    }
    Ok(out)
}

type UserRow = (String, String, String, Option<String>, Option<String>);

fn read_user(row: &Row<'_>) -> rusqlite::Result<UserRow> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
}

// ---------------------------------------------------------------------------
// MedicationStore
// ---------------------------------------------------------------------------

impl MedicationStore for SqliteStore {
    fn find_by_status(&self, status: Status) -> Result<Vec<StoredMedication>> {
        let conn = self.conn.lock();
        query_medications(
            &conn,
            &format!("{SELECT_MEDICATION} WHERE status = ?1 ORDER BY created_at, id"),
            params![status.as_str()],
        )
    }

    fn bulk_set_status(&self, transitions: &[StatusTransition]) -> Result<Vec<String>> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let mut applied = Vec::with_capacity(transitions.len());
        {
            let mut stmt =
                tx.prepare("UPDATE medications SET status = ?1 WHERE id = ?2 AND status = ?3")?;
            for t in transitions {
                if t.from.is_terminal() || t.from == t.to {
                    continue;
                }
                if stmt.execute(params![t.to.as_str(), t.id, t.from.as_str()])? == 1 {
                    applied.push(t.id.clone());
                }
            }
        }
        tx.commit()?;
        Ok(applied)
    }

    fn find_assigned_notifiee(&self, medication: &StoredMedication) -> Result<Option<Notifiee>> {
        let conn = self.conn.lock();
        let found = conn
            .query_row(
                "SELECT c.id, c.fcm_token, p.name
                 FROM users p
                 JOIN caregiver_assignments a ON a.patient_id = p.id
                 JOIN users c ON c.id = a.caregiver_id
                 WHERE p.id = ?1
                   AND p.role = 'patient'
                   AND c.role = 'caregiver'
                   AND c.fcm_token IS NOT NULL
                   AND c.fcm_token != ''
                 ORDER BY a.rowid
                 LIMIT 1",
                params![medication.user_id],
                |row| {
                    Ok(Notifiee {
                        caregiver_id: row.get(0)?,
                        token: row.get(1)?,
                        patient_name: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(found)
    }

    fn insert(&self, medication: &StoredMedication) -> Result<()> {
        let fields = serde_json::to_string(&medication.fields)
            .map_err(|e| MedGuardError::SerializationError(format!("medication fields: {e}")))?;
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO medications (id, user_id, status, fields, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                medication.id,
                medication.user_id,
                medication.status.as_str(),
                fields,
                medication.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn get(&self, id: &str) -> Result<Option<StoredMedication>> {
        let conn = self.conn.lock();
        let row = conn
            .query_row(
                &format!("{SELECT_MEDICATION} WHERE id = ?1"),
                params![id],
                MedicationRow::read,
            )
            .optional()?;
        row.map(MedicationRow::into_medication).transpose()
    }

    fn list_for_user(
        &self,
        user_id: &str,
        status: Option<Status>,
    ) -> Result<Vec<StoredMedication>> {
        let conn = self.conn.lock();
        match status {
            Some(s) => query_medications(
                &conn,
                &format!(
                    "{SELECT_MEDICATION} WHERE user_id = ?1 AND status = ?2 ORDER BY created_at, id"
                ),
                params![user_id, s.as_str()],
            ),
            None => query_medications(
                &conn,
                &format!("{SELECT_MEDICATION} WHERE user_id = ?1 ORDER BY created_at, id"),
                params![user_id],
            ),
        }
    }

    fn mark_taken(&self, user_id: &str, id: &str) -> Result<TakenOutcome> {
        let conn = self.conn.lock();
        let changed = conn.execute(
            "UPDATE medications SET status = 'taken'
             WHERE id = ?1 AND user_id = ?2 AND status != 'taken'",
            params![id, user_id],
        )?;
        if changed == 1 {
            return Ok(TakenOutcome::Applied);
        }

        let exists: Option<String> = conn
            .query_row(
                "SELECT status FROM medications WHERE id = ?1 AND user_id = ?2",
                params![id, user_id],
                |row| row.get(0),
            )
            .optional()?;
        match exists {
            Some(_) => Ok(TakenOutcome::AlreadyTaken),
            None => Err(MedGuardError::MedicationNotFound(id.to_string())),
        }
    }

    fn purge_missed(&self, user_id: &str) -> Result<Vec<StoredMedication>> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let removed = query_medications(
            &tx,
            &format!(
                "{SELECT_MEDICATION} WHERE user_id = ?1 AND status = 'missed' \
                 ORDER BY created_at, id"
            ),
            params![user_id],
        )?;
        tx.execute(
            "DELETE FROM medications WHERE user_id = ?1 AND status = 'missed'",
            params![user_id],
        )?;
        tx.commit()?;
        Ok(removed)
    }

    fn add_user(&self, user: &User) -> Result<()> {
        let profile = match &user.profile {
            Value::Null => None,
            other => Some(serde_json::to_string(other).map_err(|e| {
                MedGuardError::SerializationError(format!("user profile: {e}"))
            })?),
        };
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO users (id, name, role, fcm_token, profile) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![user.id, user.name, user.role.as_str(), user.fcm_token, profile],
        )?;
        Ok(())
    }

    fn get_user(&self, id: &str) -> Result<Option<User>> {
        let conn = self.conn.lock();
        let row = conn
            .query_row(
                "SELECT id, name, role, fcm_token, profile FROM users WHERE id = ?1",
                params![id],
                read_user,
            )
            .optional()?;

        let Some((id, name, role, fcm_token, profile)) = row else {
            return Ok(None);
        };
        let profile = match profile {
            Some(text) => serde_json::from_str(&text).map_err(|e| {
                MedGuardError::InvalidRecord(format!("user {id} profile: {e}"))
            })?,
            None => Value::Null,
        };
        Ok(Some(User {
            role: role.parse()?,
            id,
            name,
            fcm_token,
            profile,
        }))
    }

    fn assign_caregiver(&self, caregiver_id: &str, patient_id: &str) -> Result<()> {
        let caregiver = self
            .get_user(caregiver_id)?
            .ok_or_else(|| MedGuardError::UserNotFound(caregiver_id.to_string()))?;
        let patient = self
            .get_user(patient_id)?
            .ok_or_else(|| MedGuardError::UserNotFound(patient_id.to_string()))?;

        if caregiver.role != Role::Caregiver || patient.role != Role::Patient {
            return Err(MedGuardError::InvalidRecord(format!(
                "cannot assign {} '{}' to {} '{}'",
                caregiver.role, caregiver.id, patient.role, patient.id
            )));
        }

        let conn = self.conn.lock();
        conn.execute(
            "INSERT OR IGNORE INTO caregiver_assignments (caregiver_id, patient_id)
             VALUES (?1, ?2)",
            params![caregiver_id, patient_id],
        )?;
        Ok(())
    }
}
