//! Bucket discriminators for time-partitioned cache keys
//!
//! A bucket discriminator is a string derived from the current time and a
//! granularity. Two calls inside the same bucket always produce the same
//! string, so cache keys built from it stay stable until the bucket rolls over.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Discriminator used by [`BucketMode::None`]. Entries under it never expire by time.
pub const STATIC_BUCKET: &str = "static";

/// Granularity at which cached values are considered fresh
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BucketMode {
    /// Never rolls over; only an explicit overwrite replaces the value
    None,
    /// Calendar hour
    Hour,
    /// Calendar date
    Date,
    /// ISO week
    Week,
}

/// Error returned when a bucket mode name is not recognized
#[derive(Debug, Error, PartialEq, Eq)]
#[error("Invalid bucket mode: '{0}'. Valid modes: none, hour, date, week")]
pub struct ParseBucketModeError(pub String);

type Discriminator = fn(DateTime<FixedOffset>) -> String;

fn static_bucket(_: DateTime<FixedOffset>) -> String {
    STATIC_BUCKET.to_string()
}

fn hour_bucket(now: DateTime<FixedOffset>) -> String {
    now.format("%Y-%m-%dT%H").to_string()
}

fn date_bucket(now: DateTime<FixedOffset>) -> String {
    now.format("%Y-%m-%d").to_string()
}

fn week_bucket(now: DateTime<FixedOffset>) -> String {
    now.format("%G-W%V").to_string()
}

const DISCRIMINATORS: [(BucketMode, Discriminator); 4] = [
    (BucketMode::None, static_bucket),
    (BucketMode::Hour, hour_bucket),
    (BucketMode::Date, date_bucket),
    (BucketMode::Week, week_bucket),
];

impl BucketMode {
    /// All supported modes
    pub const ALL: [BucketMode; 4] = [
        BucketMode::None,
        BucketMode::Hour,
        BucketMode::Date,
        BucketMode::Week,
    ];

    /// Lowercase name used on the command line and in logs
    pub fn as_str(&self) -> &'static str {
        match self {
            BucketMode::None => "none",
            BucketMode::Hour => "hour",
            BucketMode::Date => "date",
            BucketMode::Week => "week",
        }
    }

    fn discriminator(self) -> Discriminator {
        DISCRIMINATORS
            .iter()
            .find(|(mode, _)| *mode == self)
            .map(|(_, f)| *f)
            .unwrap_or(static_bucket)
    }
}

impl fmt::Display for BucketMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BucketMode {
    type Err = ParseBucketModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().to_lowercase();
        BucketMode::ALL
            .into_iter()
            .find(|mode| mode.as_str() == name)
            .ok_or_else(|| ParseBucketModeError(s.to_string()))
    }
}

/// Computes the bucket discriminator for `now` in the given fixed timezone.
///
/// Pure: the result depends only on the arguments.
pub fn compute_bucket(now: DateTime<Utc>, mode: BucketMode, tz: FixedOffset) -> String {
    (mode.discriminator())(now.with_timezone(&tz))
}

/// Source of the current time for the cache
pub trait Clock: Send + Sync {
    /// Returns the current instant
    fn now(&self) -> DateTime<Utc>;
}

/// Clock backed by the system time
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to
#[cfg(test)]
#[derive(Debug, Clone)]
pub(crate) struct ManualClock(std::sync::Arc<std::sync::Mutex<DateTime<Utc>>>);

#[cfg(test)]
impl ManualClock {
    pub(crate) fn at(rfc3339: &str) -> Self {
        let now = DateTime::parse_from_rfc3339(rfc3339)
            .expect("valid RFC 3339 timestamp")
            .with_timezone(&Utc);
        Self(std::sync::Arc::new(std::sync::Mutex::new(now)))
    }

    pub(crate) fn set(&self, rfc3339: &str) {
        let now = DateTime::parse_from_rfc3339(rfc3339)
            .expect("valid RFC 3339 timestamp")
            .with_timezone(&Utc);
        *self.0.lock().unwrap() = now;
    }

    pub(crate) fn advance(&self, by: chrono::Duration) {
        let mut now = self.0.lock().unwrap();
        *now += by;
    }
}

#[cfg(test)]
impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.0.lock().unwrap()
    }
}
