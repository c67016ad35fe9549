//! Business dates and clocks
//!
//! The ledger works on calendar dates (`NaiveDate`) in the institution's
//! timezone: a due is overdue once the local date has moved past its due
//! date. Audit stamps stay in UTC.
//!
//! Services never call `Utc::now()` directly for business dates; they ask a
//! [`Clock`], so tests can pin "today".

use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::str::FromStr;
use std::sync::RwLock;
use thiserror::Error;

/// Timezone wrapper for the institution's business calendar
///
/// Wraps chrono_tz::Tz with custom serialization support.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timezone(pub Tz);

impl Serialize for Timezone {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.0.name())
    }
}

impl<'de> Deserialize<'de> for Timezone {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Timezone::parse(&s).map_err(serde::de::Error::custom)
    }
}

impl Timezone {
    pub fn new(tz: Tz) -> Self {
        Self(tz)
    }

    /// Parses an IANA zone name such as `Asia/Colombo`
    pub fn parse(name: &str) -> Result<Self, TemporalError> {
        Tz::from_str(name)
            .map(Timezone)
            .map_err(|_| TemporalError::UnknownTimezone(name.to_string()))
    }

    /// The local calendar date for a UTC instant
    pub fn local_date(&self, utc: DateTime<Utc>) -> NaiveDate {
        utc.with_timezone(&self.0).date_naive()
    }
}

impl Default for Timezone {
    fn default() -> Self {
        Self(chrono_tz::UTC)
    }
}

/// Errors related to temporal operations
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TemporalError {
    #[error("Invalid period: start {start} must not be after end {end}")]
    InvalidPeriod {
        start: String,
        end: String,
    },

    #[error("Unknown timezone: {0}")]
    UnknownTimezone(String),
}

/// Whole days from `from` to `to`; negative when `to` is earlier
pub fn days_between(from: NaiveDate, to: NaiveDate) -> i64 {
    (to - from).num_days()
}

/// Inclusive range of calendar dates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, TemporalError> {
        if start > end {
            return Err(TemporalError::InvalidPeriod {
                start: start.to_string(),
                end: end.to_string(),
            });
        }
        Ok(Self { start, end })
    }

    /// The range `[start, start + days]`
    pub fn following(start: NaiveDate, days: u32) -> Self {
        Self {
            start,
            end: start + chrono::Days::new(days as u64),
        }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }

    /// Number of days covered, counting both ends
    pub fn days(&self) -> i64 {
        days_between(self.start, self.end) + 1
    }
}

/// Source of the current instant and business date
pub trait Clock: Send + Sync {
    /// Current instant, used for audit stamps
    fn now(&self) -> DateTime<Utc>;

    /// Current business date
    fn today(&self) -> NaiveDate;
}

/// Wall clock in a business timezone
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock {
    timezone: Timezone,
}

impl SystemClock {
    pub fn new(timezone: Timezone) -> Self {
        Self { timezone }
    }
}

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn today(&self) -> NaiveDate {
        self.timezone.local_date(Utc::now())
    }
}

/// A clock pinned to a date; can be moved forward by tests and simulations
#[derive(Debug)]
pub struct FixedClock {
    today: RwLock<NaiveDate>,
}

impl FixedClock {
    pub fn new(today: NaiveDate) -> Self {
        Self {
            today: RwLock::new(today),
        }
    }

    pub fn set(&self, today: NaiveDate) {
        let mut guard = self.today.write().unwrap_or_else(|e| e.into_inner());
        *guard = today;
    }

    pub fn advance_days(&self, days: u64) {
        let mut guard = self.today.write().unwrap_or_else(|e| e.into_inner());
        *guard = *guard + chrono::Days::new(days);
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.today()
            .and_hms_opt(12, 0, 0)
            .map(|dt| dt.and_utc())
            .unwrap_or_else(Utc::now)
    }

    fn today(&self) -> NaiveDate {
        *self.today.read().unwrap_or_else(|e| e.into_inner())
    }
}
