//! Medication module: the records the reconciler works on.
//!
//! This module provides:
//! - `Status`, `NewMedication` and `StoredMedication` (`entry`)
//! - Scheduled-time parsing and overdue comparison (`schedule`)

pub mod entry;
pub mod schedule;

pub use entry::{NewMedication, Status, StoredMedication, EXEMPT_FIELDS};
