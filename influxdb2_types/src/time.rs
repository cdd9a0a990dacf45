//! Wall clock abstraction used to assign default timestamps.

use chrono::{DateTime, TimeZone, Utc};
use parking_lot::RwLock;
use std::time::Duration;

/// A UTC timestamp returned by a [`TimeProvider`], held as nanoseconds since
/// the epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Time(i64);

impl Time {
    /// Makes a new `Time` from the number of non-leap nanoseconds
    /// since January 1, 1970 0:00:00 UTC.
    pub fn from_timestamp_nanos(nanos: i64) -> Self {
        Self(nanos)
    }

    /// Makes a new `Time` from the provided [`DateTime<Utc>`], saturating
    /// outside the range representable in nanoseconds.
    pub fn from_date_time(time: DateTime<Utc>) -> Self {
        let nanos = time.timestamp_nanos_opt().unwrap_or(if time.timestamp() < 0 {
            i64::MIN
        } else {
            i64::MAX
        });
        Self(nanos)
    }

    /// Returns the number of non-leap-nanoseconds since January 1, 1970 UTC
    pub fn timestamp_nanos(&self) -> i64 {
        self.0
    }

    /// Returns `Time` as a [`DateTime<Utc>`]
    pub fn date_time(&self) -> DateTime<Utc> {
        Utc.timestamp_nanos(self.0)
    }

    /// Adds the given [`Duration`], returning [`None`] on overflow.
    pub fn checked_add(&self, duration: Duration) -> Option<Self> {
        let nanos = i64::try_from(duration.as_nanos()).ok()?;
        self.0.checked_add(nanos).map(Self)
    }
}

impl std::fmt::Display for Time {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.date_time().to_rfc3339())
    }
}

pub trait TimeProvider: std::fmt::Debug + Send + Sync + 'static {
    /// Returns the current `Time`. No guarantees are made about monotonicity
    fn now(&self) -> Time;
}

/// A [`TimeProvider`] that uses [`Utc::now`] as a clock source
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemProvider;

impl SystemProvider {
    pub fn new() -> Self {
        Self
    }
}

impl TimeProvider for SystemProvider {
    fn now(&self) -> Time {
        Time::from_date_time(Utc::now())
    }
}

/// A [`TimeProvider`] that returns a fixed `Time` that can be set by [`MockProvider::set`]
#[derive(Debug)]
pub struct MockProvider {
    time: RwLock<Time>,
}

impl MockProvider {
    pub fn new(start: Time) -> Self {
        Self {
            time: RwLock::new(start),
        }
    }

    pub fn set(&self, time: Time) {
        *self.time.write() = time
    }

    /// Advance the clock, saturating at the maximum representable time.
    pub fn inc(&self, duration: Duration) -> Time {
        let mut time = self.time.write();
        *time = time.checked_add(duration).unwrap_or(Time(i64::MAX));
        *time
    }
}

impl TimeProvider for MockProvider {
    fn now(&self) -> Time {
        *self.time.read()
    }
}
