//! Notification log: SQLite history of every missed-dose alert.
//!
//! Each dispatch attempt (sent or failed) is recorded with the patient,
//! caregiver, medication name and message text at `audit_path`.
//!
//! Designed for graceful degradation: if the database can't be opened or
//! written to, the reconciler continues without recording.

use std::path::Path;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::Connection;
use tracing::warn;

use crate::errors::{MedGuardError, Result};

/// A single notification log entry.
#[derive(Debug, Clone)]
pub struct NotificationEntry {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub patient_id: String,
    pub caregiver_id: Option<String>,
    pub medication_name: String,
    pub title: String,
    pub body: String,
    pub status: String,
}

/// Data for a new entry; `id` and `timestamp` are assigned on insert.
#[derive(Debug, Clone, Copy)]
pub struct NewNotification<'a> {
    pub patient_id: &'a str,
    pub caregiver_id: Option<&'a str>,
    pub medication_name: &'a str,
    pub title: &'a str,
    pub body: &'a str,
    pub status: &'a str,
}

/// SQLite-backed notification log.
pub struct NotificationLog {
    conn: Mutex<Connection>,
}

impl NotificationLog {
    /// Open (or create) the log database at `path`.
    ///
    /// Returns `None` if the database can't be opened: callers should
    /// treat this as "notification log unavailable" and continue normally.
    pub fn open(path: &Path) -> Option<Self> {
        let conn = Connection::open(path).ok()?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o600);
            let _ = std::fs::set_permissions(path, perms);
        }

        Self::init(conn)
    }

    /// A private in-memory log.
    pub fn open_in_memory() -> Option<Self> {
        Self::init(Connection::open_in_memory().ok()?)
    }

    fn init(conn: Connection) -> Option<Self> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS notifications (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp       TEXT NOT NULL,
                patient_id      TEXT NOT NULL,
                caregiver_id    TEXT,
                medication_name TEXT NOT NULL,
                title           TEXT NOT NULL,
                body            TEXT NOT NULL,
                status          TEXT NOT NULL
            );",
        )
        .ok()?;

        Some(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Record an attempt. A failed write is logged and otherwise ignored.
    pub fn record(&self, entry: &NewNotification<'_>) {
        let now = Utc::now().to_rfc3339();
        let written = self.conn.lock().execute(
            "INSERT INTO notifications
                (timestamp, patient_id, caregiver_id, medication_name, title, body, status)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            rusqlite::params![
                now,
                entry.patient_id,
                entry.caregiver_id,
                entry.medication_name,
                entry.title,
                entry.body,
                entry.status
            ],
        );
        if let Err(e) = written {
            warn!(
                patient_id = %entry.patient_id,
                medication = %entry.medication_name,
                error = %e,
                "failed to record notification"
            );
        }
    }

    /// Query recent entries, most recent first.
    ///
    /// - `limit`: maximum number of entries to return.
    /// - `patient_id`: if provided, only that patient's entries.
    pub fn query(&self, limit: usize, patient_id: Option<&str>) -> Result<Vec<NotificationEntry>> {
        let limit_i64 = i64::try_from(limit).unwrap_or(i64::MAX);
        let conn = self.conn.lock();

        let mut stmt = conn
            .prepare(
                "SELECT id, timestamp, patient_id, caregiver_id, medication_name,
                        title, body, status
                 FROM notifications
                 WHERE ?1 IS NULL OR patient_id = ?1
                 ORDER BY id DESC
                 LIMIT ?2",
            )
            .map_err(|e| MedGuardError::AuditError(format!("query prepare: {e}")))?;

        let rows = stmt
            .query_map(rusqlite::params![patient_id, limit_i64], |row| {
                let ts_str: String = row.get(1)?;
                let timestamp = DateTime::parse_from_rfc3339(&ts_str)
                    .map_or_else(|_| Utc::now(), |dt| dt.with_timezone(&Utc));

                Ok(NotificationEntry {
                    id: row.get(0)?,
                    timestamp,
                    patient_id: row.get(2)?,
                    caregiver_id: row.get(3)?,
                    medication_name: row.get(4)?,
                    title: row.get(5)?,
                    body: row.get(6)?,
                    status: row.get(7)?,
                })
            })
            .map_err(|e| MedGuardError::AuditError(format!("query exec: {e}")))?;

        let mut entries = Vec::new();
        for row in rows {
            entries.push(row.map_err(|e| MedGuardError::AuditError(format!("row parse: {e}")))?);
        }

        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn entry<'a>(patient: &'a str, med: &'a str, status: &'a str) -> NewNotification<'a> {
        NewNotification {
            patient_id: patient,
            caregiver_id: Some("c1"),
            medication_name: med,
            title: "t",
            body: "b",
            status,
        }
    }

    #[test]
    fn open_creates_database() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("notifications.db");
        assert!(NotificationLog::open(&path).is_some());
        assert!(path.exists());
    }

    #[test]
    fn record_and_query_roundtrip() {
        let log = NotificationLog::open_in_memory().unwrap();
        log.record(&entry("p1", "Aspirin", "sent"));
        log.record(&entry("p1", "Insulin", "failed"));
        log.record(&entry("p2", "Warfarin", "sent"));

        let all = log.query(10, None).unwrap();
        assert_eq!(all.len(), 3);
        // Most recent first.
        assert_eq!(all[0].medication_name, "Warfarin");

        let p1 = log.query(10, Some("p1")).unwrap();
        assert_eq!(p1.len(), 2);
        assert_eq!(p1[0].status, "failed");
        assert_eq!(p1[0].caregiver_id.as_deref(), Some("c1"));
    }

    #[test]
    fn record_survives_write_failure() {
        let log = NotificationLog::open_in_memory().unwrap();
        log.conn
            .lock()
            .execute_batch("DROP TABLE notifications")
            .unwrap();

        log.record(&entry("p1", "Aspirin", "sent"));
        assert!(log.query(10, None).is_err());
    }

    #[test]
    fn query_with_limit() {
        let log = NotificationLog::open_in_memory().unwrap();
        for _ in 0..5 {
            log.record(&entry("p1", "Aspirin", "sent"));
        }
        assert_eq!(log.query(2, None).unwrap().len(), 2);
    }

    #[test]
    fn open_returns_none_on_bad_path() {
        let result = NotificationLog::open(Path::new("/nonexistent/dir/notifications.db"));
        assert!(result.is_none());
    }

    #[cfg(unix)]
    #[test]
    fn log_db_has_restrictive_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("notifications.db");
        let _log = NotificationLog::open(&path).unwrap();

        let perms = std::fs::metadata(&path).unwrap().permissions();
        assert_eq!(perms.mode() & 0o777, 0o600);
    }
}
