//! Wall-clock source for the reconciler.

use chrono::{Local, NaiveTime};
use parking_lot::Mutex;

/// Supplies the current time of day.
pub trait Clock: Send + Sync {
    fn now_time(&self) -> NaiveTime;
}

/// The host's local wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalClock;

impl Clock for LocalClock {
    fn now_time(&self) -> NaiveTime {
        Local::now().time()
    }
}

/// A clock that reads whatever it was last set to.
#[derive(Debug)]
pub struct FixedClock {
    time: Mutex<NaiveTime>,
}

impl FixedClock {
    pub fn new(time: NaiveTime) -> Self {
        Self {
            time: Mutex::new(time),
        }
    }

    /// Build from hour and minute; out-of-range values clamp to 23:59.
    pub fn at(hour: u32, minute: u32) -> Self {
        let time =
            NaiveTime::from_hms_opt(hour.min(23), minute.min(59), 0).unwrap_or(NaiveTime::MIN);
        Self::new(time)
    }

    pub fn set(&self, time: NaiveTime) {
        *self.time.lock() = time;
    }
}

impl Clock for FixedClock {
    fn now_time(&self) -> NaiveTime {
        *self.time.lock()
    }
}
