//! The millisecond instant every historical cache is indexed by.

use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Milliseconds in one calendar day.
pub const MILLIS_PER_DAY: i64 = 86_400_000;

/// Immutable, totally ordered instant with millisecond resolution (epoch millis, UTC).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TimeKey(i64);

impl TimeKey {
    /// Sentinel below every real key; used to look up the first available key.
    pub const MIN: TimeKey = TimeKey(i64::MIN);
    /// Sentinel above every real key.
    pub const MAX: TimeKey = TimeKey(i64::MAX);

    pub const fn from_millis(millis: i64) -> Self {
        Self(millis)
    }

    pub const fn millis(self) -> i64 {
        self.0
    }

    pub fn from_datetime(datetime: DateTime<Utc>) -> Self {
        Self(datetime.timestamp_millis())
    }

    /// Midnight UTC of `date`.
    pub fn from_date(date: NaiveDate) -> Self {
        Self::from_datetime(Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN)))
    }

    /// `None` for the sentinels and anything else chrono cannot represent.
    pub fn to_datetime(self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.0)
    }

    pub fn plus_millis(self, millis: i64) -> Self {
        Self(self.0.saturating_add(millis))
    }

    pub fn plus_days(self, days: i64) -> Self {
        self.plus_millis(days.saturating_mul(MILLIS_PER_DAY))
    }

    /// Signed distance `self - earlier` in milliseconds.
    pub fn millis_since(self, earlier: TimeKey) -> i64 {
        self.0.saturating_sub(earlier.0)
    }

    pub fn is_before(self, other: TimeKey) -> bool {
        self < other
    }

    pub fn is_after(self, other: TimeKey) -> bool {
        self > other
    }

    pub fn is_before_or_equal(self, other: TimeKey) -> bool {
        self <= other
    }

    pub fn is_after_or_equal(self, other: TimeKey) -> bool {
        self >= other
    }
}

impl From<NaiveDate> for TimeKey {
    fn from(date: NaiveDate) -> Self {
        Self::from_date(date)
    }
}

impl From<DateTime<Utc>> for TimeKey {
    fn from(datetime: DateTime<Utc>) -> Self {
        Self::from_datetime(datetime)
    }
}

impl fmt::Display for TimeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            TimeKey::MIN => write!(f, "MIN"),
            TimeKey::MAX => write!(f, "MAX"),
            _ => match self.to_datetime() {
                Some(dt) => write!(f, "{}", dt.format("%Y-%m-%dT%H:%M:%S%.3fZ")),
                None => write!(f, "TimeKey({})", self.0),
            },
        }
    }
}
