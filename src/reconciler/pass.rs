//! One reconciler pass: find overdue `upcoming` doses, flip them to
//! `missed`, alert the assigned caregiver.
//!
//! Per-entry problems (unreadable time, failed dispatch) are logged and
//! skipped.  A storage error while loading or writing aborts the pass;
//! the next tick starts over from whatever is still `upcoming`.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::NaiveTime;
use tracing::{debug, info, instrument, warn};

use super::clock::{Clock, LocalClock};
use crate::audit::{NewNotification, NotificationLog};
use crate::crypto::CipherKeys;
use crate::errors::Result;
use crate::medication::{schedule, Status, StoredMedication};
use crate::notify::{self, NotificationDispatcher};
use crate::store::{MedicationStore, Notifiee, StatusTransition};

/// Counters from one completed pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassReport {
    /// `upcoming` entries loaded.
    pub scanned: usize,
    /// Entries whose scheduled time had passed.
    pub due: usize,
    /// Entries actually moved to `missed`.
    pub transitioned: usize,
    /// Entries skipped because their time could not be read.
    pub skipped: usize,
    /// Alerts reported as sent.
    pub notified: usize,
    /// Alerts that failed (lookup or delivery).
    pub notify_failed: usize,
    /// Newly missed entries with no caregiver to alert.
    pub no_notifiee: usize,
}

/// What `run_pass` did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PassOutcome {
    Completed(PassReport),
    /// Another pass was still running; nothing was done.
    Skipped,
}

/// The missed-dose reconciler.  Cheap to share behind an `Arc`.
pub struct Reconciler {
    store: Arc<dyn MedicationStore>,
    keys: Arc<CipherKeys>,
    dispatcher: Arc<dyn NotificationDispatcher>,
    clock: Arc<dyn Clock>,
    log: Option<Arc<NotificationLog>>,
    in_flight: AtomicBool,
}

impl Reconciler {
    pub fn new(
        store: Arc<dyn MedicationStore>,
        keys: Arc<CipherKeys>,
        dispatcher: Arc<dyn NotificationDispatcher>,
    ) -> Self {
        Self {
            store,
            keys,
            dispatcher,
            clock: Arc::new(LocalClock),
            log: None,
            in_flight: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Record every dispatch attempt in `log`.
    #[must_use]
    pub fn with_notification_log(mut self, log: Arc<NotificationLog>) -> Self {
        self.log = Some(log);
        self
    }

    /// Run one pass unless another is already in flight.
    pub fn run_pass(&self) -> Result<PassOutcome> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("reconciler pass already in flight; skipping");
            return Ok(PassOutcome::Skipped);
        }
        let _guard = InFlight(&self.in_flight);

        self.pass().map(PassOutcome::Completed)
    }

    #[instrument(skip(self), name = "reconcile")]
    fn pass(&self) -> Result<PassReport> {
        let now = self.clock.now_time();
        let upcoming = self.store.find_by_status(Status::Upcoming)?;

        let mut report = PassReport {
            scanned: upcoming.len(),
            ..PassReport::default()
        };

        let mut due = Vec::new();
        for med in upcoming {
            match self.scheduled_time(&med) {
                Ok(at) if schedule::is_overdue(at, now) => due.push(med),
                Ok(_) => {}
                Err(e) => {
                    warn!(
                        medication_id = %med.id,
                        kind = ?e.kind(),
                        error = %e,
                        "skipping medication with unreadable scheduled time"
                    );
                    report.skipped += 1;
                }
            }
        }
        report.due = due.len();

        if due.is_empty() {
            debug!(scanned = report.scanned, skipped = report.skipped, "nothing overdue");
            return Ok(report);
        }

        let transitions: Vec<StatusTransition> = due
            .iter()
            .map(|med| StatusTransition {
                id: med.id.clone(),
                from: Status::Upcoming,
                to: Status::Missed,
            })
            .collect();
        let applied: HashSet<String> = self
            .store
            .bulk_set_status(&transitions)?
            .into_iter()
            .collect();
        report.transitioned = applied.len();

        for med in due.iter().filter(|m| applied.contains(&m.id)) {
            debug!(medication_id = %med.id, user_id = %med.user_id, "marked missed");
            self.notify_missed(med, &mut report);
        }

        info!(
            scanned = report.scanned,
            missed = report.transitioned,
            skipped = report.skipped,
            notified = report.notified,
            notify_failed = report.notify_failed,
            "reconciler pass complete"
        );
        Ok(report)
    }

    fn scheduled_time(&self, med: &StoredMedication) -> Result<NaiveTime> {
        let raw = med.decrypt_text(&self.keys, "time")?;
        schedule::parse_time(&raw)
    }

    /// Best effort: nothing here can undo the `missed` transition.
    fn notify_missed(&self, med: &StoredMedication, report: &mut PassReport) {
        let notifiee = match self.store.find_assigned_notifiee(med) {
            Ok(Some(n)) => n,
            Ok(None) => {
                info!(user_id = %med.user_id, "no caregiver with a push token; alert not sent");
                report.no_notifiee += 1;
                return;
            }
            Err(e) => {
                warn!(
                    medication_id = %med.id,
                    error = %e,
                    "caregiver lookup failed; alert not sent"
                );
                report.notify_failed += 1;
                return;
            }
        };

        let medication_name = med.decrypt_text(&self.keys, "name").unwrap_or_else(|e| {
            warn!(medication_id = %med.id, error = %e, "medication name unreadable");
            "a medication".to_string()
        });

        self.send(med, &notifiee, &medication_name, report);
    }

    fn send(
        &self,
        med: &StoredMedication,
        notifiee: &Notifiee,
        medication_name: &str,
        report: &mut PassReport,
    ) {
        let title = notify::missed_title(medication_name, &notifiee.patient_name);
        let body = notify::missed_body(medication_name, &notifiee.patient_name, &med.user_id);

        let outcome = self.dispatcher.dispatch(&notifiee.token, &title, &body);
        if outcome.is_sent() {
            report.notified += 1;
        } else {
            warn!(
                medication_id = %med.id,
                caregiver_id = %notifiee.caregiver_id,
                %outcome,
                "missed-dose alert not delivered"
            );
            report.notify_failed += 1;
        }

        if let Some(log) = &self.log {
            log.record(&NewNotification {
                patient_id: &med.user_id,
                caregiver_id: Some(&notifiee.caregiver_id),
                medication_name,
                title: &title,
                body: &body,
                status: outcome.as_str(),
            });
        }
    }
}

/// Clears the in-flight flag on drop, including on early return.
struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::MedGuardError;
    use crate::medication::NewMedication;
    use crate::notify::DeliveryOutcome;
    use crate::reconciler::clock::FixedClock;
    use crate::store::{Role, SqliteStore, TakenOutcome, User};
    use parking_lot::Mutex;
    use serde_json::Value;

    #[derive(Default)]
    struct RecordingDispatcher {
        sent: Mutex<Vec<(String, String, String)>>,
        fail: bool,
    }

    impl NotificationDispatcher for RecordingDispatcher {
        fn dispatch(&self, token: &str, title: &str, body: &str) -> DeliveryOutcome {
            self.sent
                .lock()
                .push((token.to_string(), title.to_string(), body.to_string()));
            if self.fail {
                DeliveryOutcome::Failed("push service down".into())
            } else {
                DeliveryOutcome::Sent
            }
        }
    }

    struct Fixture {
        store: Arc<SqliteStore>,
        keys: Arc<CipherKeys>,
        dispatcher: Arc<RecordingDispatcher>,
        clock: Arc<FixedClock>,
        log: Arc<NotificationLog>,
    }

    impl Fixture {
        fn new(fail_dispatch: bool) -> Self {
            let store = Arc::new(SqliteStore::open_in_memory().unwrap());
            for (id, name, role, token) in [
                ("p1", "Rosa", Role::Patient, None),
                ("c1", "Tom", Role::Caregiver, Some("tok-c1")),
            ] {
                store
                    .add_user(&User {
                        id: id.into(),
                        name: name.into(),
                        role,
                        fcm_token: token.map(String::from),
                        profile: Value::Null,
                    })
                    .unwrap();
            }
            store.assign_caregiver("c1", "p1").unwrap();

            Self {
                store,
                keys: Arc::new(CipherKeys::new(&[0x51; 32], &[0x52; 32]).unwrap()),
                dispatcher: Arc::new(RecordingDispatcher {
                    fail: fail_dispatch,
                    ..RecordingDispatcher::default()
                }),
                clock: Arc::new(FixedClock::at(9, 0)),
                log: Arc::new(NotificationLog::open_in_memory().unwrap()),
            }
        }

        fn reconciler(&self) -> Reconciler {
            Reconciler::new(self.store.clone(), self.keys.clone(), self.dispatcher.clone())
                .with_clock(self.clock.clone())
                .with_notification_log(self.log.clone())
        }

        fn add(&self, user: &str, name: &str, time: &str) -> StoredMedication {
            let new = NewMedication {
                name: name.into(),
                dosage: "1 tablet".into(),
                frequency: "daily".into(),
                time: time.into(),
                instructions: "".into(),
                status: Status::Upcoming,
                refill_date: None,
                low_supply: false,
                notification: true,
            };
            let med = StoredMedication::seal(&self.keys, user, &new).unwrap();
            self.store.insert(&med).unwrap();
            med
        }

        fn status(&self, id: &str) -> Status {
            self.store.get(id).unwrap().unwrap().status
        }
    }

    fn completed(outcome: PassOutcome) -> PassReport {
        match outcome {
            PassOutcome::Completed(r) => r,
            PassOutcome::Skipped => panic!("pass was skipped"),
        }
    }

    #[test]
    fn overdue_entry_becomes_missed_and_alerts_once() {
        let fx = Fixture::new(false);
        let med = fx.add("p1", "Metformin", "08:00 AM");

        let report = completed(fx.reconciler().run_pass().unwrap());
        assert_eq!(report.scanned, 1);
        assert_eq!(report.transitioned, 1);
        assert_eq!(report.notified, 1);
        assert_eq!(fx.status(&med.id), Status::Missed);

        let sent = fx.dispatcher.sent.lock();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "tok-c1");
        assert_eq!(sent[0].1, "Missed Medication Alert: Metformin for Rosa");
        assert!(sent[0].2.contains("(Patient ID: p1)"));
    }

    #[test]
    fn future_entry_stays_upcoming() {
        let fx = Fixture::new(false);
        let med = fx.add("p1", "Insulin", "23:00");

        let report = completed(fx.reconciler().run_pass().unwrap());
        assert_eq!(report.due, 0);
        assert_eq!(fx.status(&med.id), Status::Upcoming);
        assert!(fx.dispatcher.sent.lock().is_empty());
    }

    #[test]
    fn same_minute_is_not_overdue() {
        let fx = Fixture::new(false);
        let med = fx.add("p1", "Insulin", "09:00 AM");
        completed(fx.reconciler().run_pass().unwrap());
        assert_eq!(fx.status(&med.id), Status::Upcoming);
    }

    #[test]
    fn second_pass_is_a_no_op() {
        let fx = Fixture::new(false);
        fx.add("p1", "Metformin", "08:00 AM");
        let reconciler = fx.reconciler();

        completed(reconciler.run_pass().unwrap());
        let second = completed(reconciler.run_pass().unwrap());

        assert_eq!(second, PassReport::default());
        assert_eq!(fx.dispatcher.sent.lock().len(), 1);
    }

    #[test]
    fn failed_dispatch_keeps_missed_and_is_logged() {
        let fx = Fixture::new(true);
        let med = fx.add("p1", "Metformin", "08:00 AM");

        let report = completed(fx.reconciler().run_pass().unwrap());
        assert_eq!(report.notify_failed, 1);
        assert_eq!(fx.status(&med.id), Status::Missed);

        let logged = fx.log.query(10, Some("p1")).unwrap();
        assert_eq!(logged.len(), 1);
        assert_eq!(logged[0].status, "failed");
        assert_eq!(logged[0].medication_name, "Metformin");
    }

    #[test]
    fn unreadable_time_is_skipped_not_fatal() {
        let fx = Fixture::new(false);
        let good = fx.add("p1", "Metformin", "08:00 AM");

        let mut bad = fx.add("p1", "Aspirin", "07:00 AM");
        bad.fields.insert("time".into(), Value::String("tampered".into()));
        bad.id = "bad-entry".into();
        fx.store.insert(&bad).unwrap();

        let report = completed(fx.reconciler().run_pass().unwrap());
        assert_eq!(report.skipped, 1);
        assert_eq!(fx.status(&good.id), Status::Missed);
        assert_eq!(fx.status("bad-entry"), Status::Upcoming);
    }

    #[test]
    fn patient_without_caregiver_still_transitions() {
        let fx = Fixture::new(false);
        let med = fx.add("p-unassigned", "Metformin", "08:00 AM");

        let report = completed(fx.reconciler().run_pass().unwrap());
        assert_eq!(report.no_notifiee, 1);
        assert_eq!(fx.status(&med.id), Status::Missed);
        assert!(fx.dispatcher.sent.lock().is_empty());
    }

    #[test]
    fn taken_after_missed_wins_and_is_never_revisited() {
        let fx = Fixture::new(false);
        let med = fx.add("p1", "Metformin", "08:00 AM");
        let reconciler = fx.reconciler();

        completed(reconciler.run_pass().unwrap());
        assert_eq!(fx.store.mark_taken("p1", &med.id).unwrap(), TakenOutcome::Applied);

        fx.clock.set(NaiveTime::from_hms_opt(23, 59, 0).unwrap());
        completed(reconciler.run_pass().unwrap());
        assert_eq!(fx.status(&med.id), Status::Taken);
    }

    struct DownStore;

    impl MedicationStore for DownStore {
        fn find_by_status(&self, _: Status) -> Result<Vec<StoredMedication>> {
            Err(MedGuardError::TransientStorageError("database is locked".into()))
        }
        fn bulk_set_status(&self, _: &[StatusTransition]) -> Result<Vec<String>> {
            unreachable!()
        }
        fn find_assigned_notifiee(&self, _: &StoredMedication) -> Result<Option<Notifiee>> {
            unreachable!()
        }
        fn insert(&self, _: &StoredMedication) -> Result<()> {
            unreachable!()
        }
        fn get(&self, _: &str) -> Result<Option<StoredMedication>> {
            unreachable!()
        }
        fn list_for_user(&self, _: &str, _: Option<Status>) -> Result<Vec<StoredMedication>> {
            unreachable!()
        }
        fn mark_taken(&self, _: &str, _: &str) -> Result<TakenOutcome> {
            unreachable!()
        }
        fn purge_missed(&self, _: &str) -> Result<Vec<StoredMedication>> {
            unreachable!()
        }
        fn add_user(&self, _: &User) -> Result<()> {
            unreachable!()
        }
        fn get_user(&self, _: &str) -> Result<Option<User>> {
            unreachable!()
        }
        fn assign_caregiver(&self, _: &str, _: &str) -> Result<()> {
            unreachable!()
        }
    }

    #[test]
    fn storage_error_aborts_the_pass_and_releases_the_guard() {
        let keys = Arc::new(CipherKeys::new(&[1; 32], &[2; 32]).unwrap());
        let reconciler = Reconciler::new(
            Arc::new(DownStore),
            keys,
            Arc::new(RecordingDispatcher::default()),
        );

        for _ in 0..2 {
            let err = reconciler.run_pass().unwrap_err();
            assert!(matches!(err, MedGuardError::TransientStorageError(_)));
        }
    }
}
