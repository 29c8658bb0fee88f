use chrono::{NaiveDate, NaiveDateTime, Utc};
use chrono_tz::Europe::London;

/// Abstraction over "current time" so the time-window rules stay
/// deterministic in tests.
pub trait Clock: Send + Sync {
    /// Current wall-clock time in the service timezone (Europe/London).
    fn now(&self) -> NaiveDateTime;

    fn today(&self) -> NaiveDate {
        self.now().date()
    }
}

/// System clock expressed as Europe/London wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct LondonClock;

impl Clock for LondonClock {
    fn now(&self) -> NaiveDateTime {
        Utc::now().with_timezone(&London).naive_local()
    }
}

/// Clock frozen at a fixed instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock {
    now: NaiveDateTime,
}

impl FixedClock {
    pub fn new(now: NaiveDateTime) -> Self {
        Self { now }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> NaiveDateTime {
        self.now
    }
}
