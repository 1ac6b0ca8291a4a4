use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Local, NaiveDate, TimeZone};

/// `YYYY-MM-DD` key of a local calendar day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DayKey(NaiveDate);

impl DayKey {
    /// Today's key from the device's local clock, not UTC.
    pub fn today() -> Self {
        Self(Local::now().date_naive())
    }

    pub fn date(&self) -> NaiveDate {
        self.0
    }
}

impl From<NaiveDate> for DayKey {
    fn from(date: NaiveDate) -> Self {
        Self(date)
    }
}

impl fmt::Display for DayKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d"))
    }
}

/// Source of the current day key and of the wait until it next changes.
pub trait DayClock: fmt::Debug + Send + Sync {
    fn today(&self) -> DayKey;

    /// How long to sleep before checking [`DayClock::today`] again.
    fn until_rollover(&self) -> Duration;
}

/// The device's local wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalClock;

impl DayClock for LocalClock {
    fn today(&self) -> DayKey {
        DayKey::today()
    }

    fn until_rollover(&self) -> Duration {
        until_next_midnight()
    }
}

/// Time left until the local calendar day changes.
pub fn until_next_midnight() -> Duration {
    until_midnight_after(Local::now())
}

fn until_midnight_after<Tz: TimeZone>(now: DateTime<Tz>) -> Duration {
    let tz = now.timezone();
    let next_day = now.date_naive().succ_opt().unwrap_or(NaiveDate::MAX);
    let midnight = next_day.and_hms_opt(0, 0, 0).unwrap_or_default();

    // DST gaps can swallow midnight; fall back to a one-hour recheck.
    match tz.from_local_datetime(&midnight).earliest() {
        Some(at) => (at - now)
            .to_std()
            .unwrap_or(Duration::ZERO)
            .max(Duration::from_secs(1)),
        None => Duration::from_secs(3600),
    }
}
