//! Timestamps as stored on disk.
//!
//! Times are microseconds since 1601-01-01 00:00:00 UTC. Schemas older than
//! version 17 counted from the Unix epoch instead; the difference between the
//! two bases is [`EPOCH_DELTA_MICROS`].

use std::ops::{Add, Sub};

use chrono::{DateTime, Duration, Utc};
use rusqlite::types::{FromSql, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};

/// Microseconds between 1601-01-01 and 1970-01-01.
pub const EPOCH_DELTA_MICROS: i64 = 11_644_473_600_000_000;

const MICROS_PER_SECOND: i64 = 1_000_000;
const MICROS_PER_DAY: i64 = 86_400 * MICROS_PER_SECOND;

/// A point in time with microsecond precision. Zero is the null time.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Time(i64);

impl Time {
    /// Build from the raw on-disk value.
    #[must_use]
    pub const fn from_internal_value(value: i64) -> Self {
        Self(value)
    }

    /// Raw on-disk value.
    #[must_use]
    pub const fn to_internal_value(self) -> i64 {
        self.0
    }

    /// Whether this is the null (zero) time.
    #[must_use]
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }

    /// Current wall-clock time.
    #[must_use]
    pub fn now() -> Self {
        Self::from_datetime(Utc::now())
    }

    /// Convert from a UTC date-time.
    #[must_use]
    pub fn from_datetime(datetime: DateTime<Utc>) -> Self {
        Self(datetime.timestamp_micros().saturating_add(EPOCH_DELTA_MICROS))
    }

    /// Convert to a UTC date-time, if representable.
    #[must_use]
    pub fn to_datetime(self) -> Option<DateTime<Utc>> {
        let unix_micros = self.0.checked_sub(EPOCH_DELTA_MICROS)?;
        let secs = unix_micros.div_euclid(MICROS_PER_SECOND);
        let nanos = u32::try_from(unix_micros.rem_euclid(MICROS_PER_SECOND) * 1000).ok()?;
        DateTime::from_timestamp(secs, nanos)
    }

    /// Start of the UTC day containing this time.
    #[must_use]
    pub const fn utc_midnight(self) -> Self {
        Self(self.0.saturating_sub(self.0.rem_euclid(MICROS_PER_DAY)))
    }

    /// Whole days elapsed from `earlier` to `self`, saturating at the `i64`
    /// bounds.
    #[must_use]
    pub const fn days_since(self, earlier: Self) -> i64 {
        self.0.saturating_sub(earlier.0) / MICROS_PER_DAY
    }
}

impl Add<Duration> for Time {
    type Output = Self;

    fn add(self, rhs: Duration) -> Self {
        Self(
            self.0
                .saturating_add(rhs.num_microseconds().unwrap_or(i64::MAX)),
        )
    }
}

impl Sub<Duration> for Time {
    type Output = Self;

    fn sub(self, rhs: Duration) -> Self {
        Self(
            self.0
                .saturating_sub(rhs.num_microseconds().unwrap_or(i64::MAX)),
        )
    }
}

impl ToSql for Time {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.0))
    }
}

impl FromSql for Time {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        i64::column_result(value).map(Self)
    }
}
