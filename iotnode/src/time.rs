//! Wall-clock helpers.
//!
//! Schedules are expressed in local wall-clock time (`NaiveDateTime`), while
//! timers and file timestamps use `std::time` types. This module provides the
//! [`Clock`] abstraction used by the schedulers and the conversions between
//! the two representations.

use std::sync::Mutex;
use std::time::{Duration, SystemTime};

use chrono::{Datelike, Local, NaiveDate, NaiveDateTime, TimeDelta, Timelike};

/// Persisted timestamp format for event start times.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// Accepted input format; the fractional part is optional.
const TIMESTAMP_PARSE_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

/// Source of the current wall-clock time.
pub trait Clock: Send + Sync {
    /// Current local time.
    fn now(&self) -> NaiveDateTime;
}

/// Clock backed by the system's local time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

/// Manually driven clock for deterministic tests and simulations.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<NaiveDateTime>,
}

impl ManualClock {
    pub fn new(now: NaiveDateTime) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    /// Starts at the current local time, truncated to whole seconds.
    pub fn starting_now() -> Self {
        let now = Local::now().naive_local();
        Self::new(now.with_nanosecond(0).unwrap_or(now))
    }

    pub fn set(&self, now: NaiveDateTime) {
        *self.now.lock().unwrap_or_else(|e| e.into_inner()) = now;
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now = after(*now, by);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> NaiveDateTime {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Convert a `std` duration to a chrono delta, saturating on overflow.
fn to_delta(duration: Duration) -> TimeDelta {
    TimeDelta::from_std(duration).unwrap_or(TimeDelta::MAX)
}

/// `at` plus `duration`, clamped to the last instant the persisted timestamp
/// format can express.
pub fn after(at: NaiveDateTime, duration: Duration) -> NaiveDateTime {
    at.checked_add_signed(to_delta(duration))
        .filter(|t| t.year() <= 9999)
        .unwrap_or_else(latest)
}

fn latest() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(9999, 12, 31)
        .and_then(|d| d.and_hms_opt(23, 59, 59))
        .unwrap_or(NaiveDateTime::MAX)
}

/// Time from `now` until `then`, or `None` if `then` is not in the future.
pub fn until(now: NaiveDateTime, then: NaiveDateTime) -> Option<Duration> {
    (then - now).to_std().ok().filter(|d| !d.is_zero())
}

/// Absolute distance between two timestamps.
pub fn distance(a: NaiveDateTime, b: NaiveDateTime) -> Duration {
    (a - b).abs().to_std().unwrap_or_default()
}

/// Format a timestamp the way it is persisted.
pub fn format_timestamp(value: NaiveDateTime) -> String {
    value.format(TIMESTAMP_FORMAT).to_string()
}

/// Parse a persisted or user-supplied timestamp (`YYYY-MM-DD HH:MM:SS[.fff]`).
pub fn parse_timestamp(value: &str) -> Result<NaiveDateTime, chrono::ParseError> {
    NaiveDateTime::parse_from_str(value.trim(), TIMESTAMP_PARSE_FORMAT)
}

/// Convert a local wall-clock time to a `SystemTime`.
///
/// Ambiguous or skipped local times (DST transitions) fall back to treating
/// the value as UTC.
pub fn local_to_system_time(value: NaiveDateTime) -> SystemTime {
    value
        .and_local_timezone(Local)
        .earliest()
        .map(SystemTime::from)
        .unwrap_or_else(|| SystemTime::from(value.and_utc()))
}
