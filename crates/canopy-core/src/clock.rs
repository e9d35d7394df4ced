//! Injectable time source.
//!
//! The refresh scheduler computes its next wall-clock trigger from a
//! [`Clock`] rather than calling `chrono` directly, so trigger-time
//! computation is testable without real sleeps or timezone games.

use chrono::{DateTime, Local, NaiveDateTime, Utc};
use std::sync::{Mutex, PoisonError};

/// A source of the current time.
pub trait Clock: Send + Sync + 'static {
    /// Current instant in UTC. Used for record timestamps.
    fn now_utc(&self) -> DateTime<Utc>;

    /// Current local wall-clock time. Used for daily trigger computation.
    fn now_local(&self) -> NaiveDateTime;
}

/// The real system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_utc(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn now_local(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

/// A manually advanced clock for tests.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<NaiveDateTime>,
}

impl ManualClock {
    /// Creates a clock frozen at the given local time.
    #[must_use]
    pub fn at(now: NaiveDateTime) -> Self {
        Self { now: Mutex::new(now) }
    }

    /// Moves the clock to a new local time.
    pub fn set(&self, now: NaiveDateTime) {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner) = now;
    }

    /// Advances the clock by a duration.
    pub fn advance(&self, by: chrono::Duration) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now_utc(&self) -> DateTime<Utc> {
        let now = *self.now.lock().unwrap_or_else(PoisonError::into_inner);
        now.and_utc()
    }

    fn now_local(&self) -> NaiveDateTime {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};

    fn local(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 6, 1)
            .expect("valid date")
            .and_hms_opt(h, m, 0)
            .expect("valid time")
    }

    #[test]
    fn manual_clock_is_frozen() {
        let clock = ManualClock::at(local(6, 15));
        assert_eq!(clock.now_local(), local(6, 15));
        assert_eq!(clock.now_local(), local(6, 15));
    }

    #[test]
    fn manual_clock_advances() {
        let clock = ManualClock::at(local(6, 15));
        clock.advance(Duration::minutes(45));
        assert_eq!(clock.now_local(), local(7, 0));
    }

    #[test]
    fn system_clock_is_monotonic_enough() {
        let clock = SystemClock;
        let a = clock.now_utc();
        let b = clock.now_utc();
        assert!(b >= a);
    }
}
