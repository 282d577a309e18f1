//! Wall-clock access and the timestamp format stored in list records.
//!
//! Record timestamps are local, timezone-less date-times, so everything here
//! works in `NaiveDateTime`.

use chrono::{DateTime, Local, NaiveDate, NaiveDateTime};
use parking_lot::Mutex;
use std::sync::Arc;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6f";
const SECONDS_PER_DAY: i64 = 86_400;

/// Source of the current local time
pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> NaiveDateTime;
}

/// Local system time
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

/// Manually driven clock for tests and replays
#[derive(Debug, Clone)]
pub struct FixedClock {
    now: Arc<Mutex<NaiveDateTime>>,
}

impl FixedClock {
    pub fn new(now: NaiveDateTime) -> Self {
        FixedClock {
            now: Arc::new(Mutex::new(now)),
        }
    }

    /// Midnight of the given date
    pub fn at_date(year: i32, month: u32, day: u32) -> Option<Self> {
        let date = NaiveDate::from_ymd_opt(year, month, day)?;
        Some(FixedClock::new(date.and_hms_opt(0, 0, 0)?))
    }

    pub fn set(&self, now: NaiveDateTime) {
        *self.now.lock() = now;
    }

    pub fn advance(&self, by: chrono::Duration) {
        let mut now = self.now.lock();
        *now += by;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> NaiveDateTime {
        *self.now.lock()
    }
}

impl<C: Clock> Clock for Arc<C> {
    fn now(&self) -> NaiveDateTime {
        (**self).now()
    }
}

/// Timestamp text for a record created now
pub fn sheet_time(clock: &dyn Clock) -> String {
    format_timestamp(clock.now())
}

pub fn format_timestamp(at: NaiveDateTime) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

/// Parse a record timestamp. Accepts `YYYY-MM-DDTHH:MM[:SS[.ffffff]]` with a
/// `T` or space separator, a bare `YYYY-MM-DD`, and RFC 3339 with an offset
/// (converted to local time).
pub fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    for format in [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M",
    ] {
        if let Ok(at) = NaiveDateTime::parse_from_str(s, format) {
            return Some(at);
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0);
    }
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|at| at.with_timezone(&Local).naive_local())
}

/// Whole days from `then` to `now`, rounded down. Negative for future
/// timestamps.
pub fn age_in_days(now: NaiveDateTime, then: NaiveDateTime) -> i64 {
    (now - then).num_seconds().div_euclid(SECONDS_PER_DAY)
}
