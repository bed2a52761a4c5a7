//! Colored terminal output helpers.
//!
//! All user-facing output goes through these functions so we get
//! consistent styling across every command.  Diagnostics from the
//! library go through `tracing` instead.

use comfy_table::{ContentArrangement, Table};
use console::style;
use serde_json::Value;

use crate::audit::NotificationEntry;
use crate::medication::Status;

/// Print a green success message: "check_mark {msg}"
pub fn success(msg: &str) {
    println!("{} {}", style("\u{2713}").green().bold(), msg);
}

/// Print a red error message: "x_mark {msg}"
pub fn error(msg: &str) {
    eprintln!("{} {}", style("\u{2717}").red().bold(), msg);
}

/// Print a yellow warning: "warning_sign {msg}"
pub fn warning(msg: &str) {
    eprintln!("{} {}", style("\u{26a0}").yellow().bold(), msg);
}

/// Print a blue info message: "info_sign {msg}"
pub fn info(msg: &str) {
    println!("{} {}", style("\u{2139}").blue().bold(), msg);
}

/// Print a dim tip/hint: "arrow {msg}"
pub fn tip(msg: &str) {
    println!("{} {}", style("\u{2192}").dim(), style(msg).dim());
}

/// One decrypted medication, flattened for display.
#[derive(Debug, Clone)]
pub struct MedicationRow {
    pub id: String,
    pub name: String,
    pub dosage: String,
    pub time: String,
    pub status: Status,
    /// `true` if any field stayed encrypted.
    pub partial: bool,
}

/// Print a table of medications (Id, Name, Dosage, Time, Status).
pub fn print_medications_table(rows: &[MedicationRow]) {
    if rows.is_empty() {
        info("No medications found.");
        tip("Run `medguard med add --user <ID> --name <NAME> --time <TIME>` to add one.");
        return;
    }

    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["Id", "Name", "Dosage", "Time", "Status"]);

    for r in rows {
        let name = if r.partial {
            format!("{} {}", r.name, style("(partial)").yellow())
        } else {
            r.name.clone()
        };
        table.add_row(vec![
            r.id.clone(),
            name,
            r.dosage.clone(),
            r.time.clone(),
            colorize_status(r.status),
        ]);
    }

    println!("{table}");
}

/// Print a table of notification log entries, most recent first.
pub fn print_notifications_table(entries: &[NotificationEntry]) {
    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["Time", "Patient", "Caregiver", "Medication", "Status"]);

    for e in entries {
        let status = match e.status.as_str() {
            "sent" => style(&e.status).green().to_string(),
            _ => style(&e.status).red().to_string(),
        };
        table.add_row(vec![
            e.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
            e.patient_id.clone(),
            e.caregiver_id.clone().unwrap_or_else(|| "-".into()),
            e.medication_name.clone(),
            status,
        ]);
    }

    println!(
        "{}",
        style(format!("{} notification(s):", entries.len())).bold()
    );
    println!("{table}");
}

/// Print a JSON value as indented key/value pairs.
pub fn print_record(value: &Value) {
    match serde_json::to_string_pretty(value) {
        Ok(text) => println!("{text}"),
        Err(_) => println!("{value}"),
    }
}

fn colorize_status(status: Status) -> String {
    match status {
        Status::Upcoming => style(status.as_str()).blue().to_string(),
        Status::Taken => style(status.as_str()).green().to_string(),
        Status::Missed => style(status.as_str()).red().to_string(),
    }
}

/// Render a decrypted scalar for a table cell.
pub fn cell(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => "-".into(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}
