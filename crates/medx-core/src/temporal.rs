//! # Temporal Types
//!
//! `Timestamp` is UTC truncated to whole seconds. `RetentionPeriod` is a
//! whole number of seconds. Record age, retention bounds, sweep intervals
//! and erasure eligibility are all computed in that single unit; days and
//! years only appear when reading configuration.
//!
//! Time is read through the [`Clock`] trait so that retention expiry can be
//! exercised deterministically with [`ManualClock`].

use chrono::{DateTime, Timelike, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

const SECS_PER_DAY: u64 = 86_400;
const DAYS_PER_YEAR: u64 = 365;

/// A UTC-only timestamp, truncated to seconds precision.
///
/// Serializes as `YYYY-MM-DDTHH:MM:SSZ`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Current UTC time, truncated to seconds.
    pub fn now() -> Self {
        Self(truncate_to_seconds(Utc::now()))
    }

    /// From a `chrono::DateTime<Utc>`, truncating sub-seconds.
    pub fn from_utc(dt: DateTime<Utc>) -> Self {
        Self(truncate_to_seconds(dt))
    }

    /// Parse an RFC 3339 string with a `Z` suffix. Offsets are rejected.
    pub fn parse(s: &str) -> Result<Self, ValidationError> {
        if !s.ends_with('Z') {
            return Err(ValidationError::InvalidTimestamp {
                value: s.to_string(),
                reason: "must use Z suffix (UTC only)".into(),
            });
        }
        let dt = DateTime::parse_from_rfc3339(s).map_err(|e| ValidationError::InvalidTimestamp {
            value: s.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self(truncate_to_seconds(dt.with_timezone(&Utc))))
    }

    /// From a Unix epoch timestamp in seconds.
    pub fn from_epoch_secs(secs: i64) -> Result<Self, ValidationError> {
        DateTime::from_timestamp(secs, 0)
            .map(Self)
            .ok_or_else(|| ValidationError::InvalidTimestamp {
                value: secs.to_string(),
                reason: "out of range".into(),
            })
    }

    /// Access the inner `DateTime<Utc>`.
    pub fn as_datetime(&self) -> &DateTime<Utc> {
        &self.0
    }

    /// Unix epoch seconds.
    pub fn epoch_secs(&self) -> i64 {
        self.0.timestamp()
    }

    /// Seconds elapsed from `earlier` to `self`. Negative if `earlier` is later.
    pub fn secs_since(&self, earlier: &Timestamp) -> i64 {
        self.epoch_secs() - earlier.epoch_secs()
    }

    /// Shift forward by a number of seconds, saturating at the chrono range.
    pub fn plus_secs(&self, secs: u64) -> Self {
        let delta = chrono::Duration::seconds(i64::try_from(secs).unwrap_or(i64::MAX / 1000));
        Self(self.0.checked_add_signed(delta).unwrap_or(self.0))
    }

    /// ISO8601 with Z suffix.
    pub fn to_iso8601(&self) -> String {
        self.0.format("%Y-%m-%dT%H:%M:%SZ").to_string()
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_iso8601())
    }
}

fn truncate_to_seconds(dt: DateTime<Utc>) -> DateTime<Utc> {
    dt.with_nanosecond(0).unwrap_or(dt)
}

// ---------------------------------------------------------------------------
// RetentionPeriod
// ---------------------------------------------------------------------------

/// A retention duration in whole seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RetentionPeriod(u64);

impl RetentionPeriod {
    /// From seconds.
    pub const fn from_secs(secs: u64) -> Self {
        Self(secs)
    }

    /// From whole days.
    pub const fn from_days(days: u64) -> Self {
        Self(days.saturating_mul(SECS_PER_DAY))
    }

    /// From whole 365-day years.
    pub const fn from_years(years: u64) -> Self {
        Self::from_days(years.saturating_mul(DAYS_PER_YEAR))
    }

    /// Length in seconds.
    pub const fn as_secs(&self) -> u64 {
        self.0
    }

    /// Length in whole days, rounded down.
    pub const fn as_days(&self) -> u64 {
        self.0 / SECS_PER_DAY
    }

    /// Whether a record of the given age (seconds) has outlived this bound.
    ///
    /// A record is expired only once its age strictly exceeds the bound.
    pub fn is_exceeded_by(&self, age_secs: i64) -> bool {
        age_secs > 0 && (age_secs as u64) > self.0
    }
}

impl std::fmt::Display for RetentionPeriod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.0 % SECS_PER_DAY == 0 {
            write!(f, "{}d", self.as_days())
        } else {
            write!(f, "{}s", self.0)
        }
    }
}

// ---------------------------------------------------------------------------
// Clock
// ---------------------------------------------------------------------------

/// Source of the current time.
pub trait Clock: Send + Sync {
    /// The current instant.
    fn now(&self) -> Timestamp;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Timestamp::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<Timestamp>,
}

impl ManualClock {
    /// Start the clock at `start`.
    pub fn at(start: Timestamp) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Move the clock forward.
    pub fn advance_secs(&self, secs: u64) {
        let mut now = self.now.lock();
        *now = now.plus_secs(secs);
    }

    /// Jump to an absolute instant.
    pub fn set(&self, to: Timestamp) {
        *self.now.lock() = to;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        *self.now.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn now_has_no_subseconds() {
        assert_eq!(Timestamp::now().as_datetime().nanosecond(), 0);
    }

    #[test]
    fn from_utc_truncates() {
        let dt = Utc.with_ymd_and_hms(2026, 1, 15, 12, 30, 45).unwrap();
        let ts = Timestamp::from_utc(dt.with_nanosecond(123_456_789).unwrap());
        assert_eq!(ts.to_iso8601(), "2026-01-15T12:30:45Z");
    }

    #[test]
    fn parse_rejects_offsets() {
        assert!(Timestamp::parse("2026-01-15T12:00:00Z").is_ok());
        assert!(Timestamp::parse("2026-01-15T12:00:00+00:00").is_err());
        assert!(Timestamp::parse("yesterday").is_err());
    }

    #[test]
    fn secs_since_and_plus_secs() {
        let t0 = Timestamp::parse("2026-01-15T12:00:00Z").unwrap();
        let t1 = t0.plus_secs(90);
        assert_eq!(t1.secs_since(&t0), 90);
        assert_eq!(t0.secs_since(&t1), -90);
    }

    #[test]
    fn epoch_roundtrip() {
        let ts = Timestamp::parse("2026-03-01T00:00:00Z").unwrap();
        assert_eq!(Timestamp::from_epoch_secs(ts.epoch_secs()).unwrap(), ts);
    }

    #[test]
    fn retention_units() {
        assert_eq!(RetentionPeriod::from_days(1).as_secs(), 86_400);
        assert_eq!(RetentionPeriod::from_years(50).as_days(), 18_250);
        assert_eq!(RetentionPeriod::from_days(7).to_string(), "7d");
        assert_eq!(RetentionPeriod::from_secs(90).to_string(), "90s");
    }

    #[test]
    fn retention_exceeded_is_strict() {
        let r = RetentionPeriod::from_secs(100);
        assert!(!r.is_exceeded_by(0));
        assert!(!r.is_exceeded_by(100));
        assert!(r.is_exceeded_by(101));
        assert!(!r.is_exceeded_by(-5));
    }

    #[test]
    fn manual_clock_advances() {
        let t0 = Timestamp::parse("2026-01-01T00:00:00Z").unwrap();
        let clock = ManualClock::at(t0);
        clock.advance_secs(3600);
        assert_eq!(clock.now().secs_since(&t0), 3600);
        clock.set(t0);
        assert_eq!(clock.now(), t0);
    }
}
