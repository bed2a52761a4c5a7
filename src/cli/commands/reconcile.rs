//! `medguard reconcile`: run one reconciler pass and report.
//!
//! Usage:
//!   medguard reconcile              # compare against the local clock
//!   medguard reconcile --at 21:30   # pretend it is 21:30

use std::sync::Arc;

use crate::cli::{build_reconciler, load_keys, load_settings, open_store, output, Cli};
use crate::errors::Result;
use crate::medication::schedule;
use crate::reconciler::{FixedClock, PassOutcome, PassReport};

/// Execute the `reconcile` command.
pub fn execute(cli: &Cli, at: Option<&str>) -> Result<()> {
    let settings = load_settings(cli)?;
    let keys = Arc::new(load_keys()?);
    let store = Arc::new(open_store(&settings)?);

    let mut reconciler = build_reconciler(&settings, store, keys);
    if let Some(at) = at {
        let time = schedule::parse_time(at)?;
        reconciler = reconciler.with_clock(Arc::new(FixedClock::new(time)));
    }

    match reconciler.run_pass()? {
        PassOutcome::Completed(report) => print_report(&report),
        PassOutcome::Skipped => output::info("A pass is already running."),
    }
    Ok(())
}

fn print_report(report: &PassReport) {
    if report.transitioned == 0 {
        output::success(&format!(
            "Checked {} upcoming medication(s); none missed",
            report.scanned
        ));
    } else {
        output::success(&format!(
            "Marked {} of {} upcoming medication(s) as missed",
            report.transitioned, report.scanned
        ));
        output::info(&format!(
            "Alerts: {} sent, {} failed, {} without a caregiver",
            report.notified, report.notify_failed, report.no_notifiee
        ));
    }
    if report.skipped > 0 {
        output::warning(&format!(
            "{} medication(s) skipped: scheduled time could not be read",
            report.skipped
        ));
    }
}
