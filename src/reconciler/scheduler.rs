//! Periodic driver for the reconciler.
//!
//! Runs a pass on every tick of a tokio interval.  The pass itself is
//! synchronous (SQLite, crypto) and runs on the blocking pool; the loop
//! awaits it, so ticks never overlap.  Ticks missed while a slow pass
//! runs are dropped rather than replayed.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use super::pass::{PassOutcome, Reconciler};

/// Handle to a running reconciler task.
///
/// Dropping the handle also stops the task after its current pass.
pub struct ReconcilerHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl ReconcilerHandle {
    /// Ask the task to stop and wait for it to finish its current pass.
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            error!(error = %e, "reconciler task ended abnormally");
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

/// Start the reconciler on the current tokio runtime.  The first pass
/// runs immediately.
pub fn spawn(reconciler: Arc<Reconciler>, interval: Duration) -> ReconcilerHandle {
    let (shutdown, mut stop_rx) = watch::channel(false);

    let task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(interval_secs = interval.as_secs_f64(), "reconciler started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                // Fires on stop() and when the handle is dropped.
                _ = stop_rx.changed() => break,
            }

            let r = Arc::clone(&reconciler);
            match tokio::task::spawn_blocking(move || r.run_pass()).await {
                Ok(Ok(PassOutcome::Completed(_))) => {}
                Ok(Ok(PassOutcome::Skipped)) => debug!("tick skipped; pass still running"),
                Ok(Err(e)) => warn!(kind = ?e.kind(), error = %e, "reconciler pass aborted"),
                Err(e) => error!(error = %e, "reconciler pass panicked"),
            }

            if *stop_rx.borrow() {
                break;
            }
        }

        info!("reconciler stopped");
    });

    ReconcilerHandle { shutdown, task }
}
