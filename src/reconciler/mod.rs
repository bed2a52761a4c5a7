//! Missed-dose reconciliation.
//!
//! - `pass`: one synchronous scan-transition-notify pass
//! - `scheduler`: the tokio task that runs passes on an interval
//! - `clock`: the time source passes compare against

pub mod clock;
pub mod pass;
pub mod scheduler;

pub use clock::{Clock, FixedClock, LocalClock};
pub use pass::{PassOutcome, PassReport, Reconciler};
pub use scheduler::{spawn, ReconcilerHandle};
