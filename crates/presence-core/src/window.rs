//! Calendar-day windows in the organization's fixed UTC offset.
//!
//! Every "today" in the engine (type inference, derived state, org summary)
//! is computed through [`DayWindow`] so the three always agree on where a
//! day starts and ends.

use crate::error::{PresenceError, Result};
use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveDate, NaiveTime, TimeZone, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayWindow {
    date: NaiveDate,
    offset: FixedOffset,
}

impl DayWindow {
    pub fn new(date: NaiveDate, offset: FixedOffset) -> Self {
        Self { date, offset }
    }

    /// The window for the local calendar day that contains `instant`.
    pub fn containing(instant: DateTime<Utc>, offset: FixedOffset) -> Self {
        Self {
            date: instant.with_timezone(&offset).date_naive(),
            offset,
        }
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    /// The UTC instant of local wall-clock `time` on this day.
    pub fn at(&self, time: NaiveTime) -> DateTime<Utc> {
        let local = self.date.and_time(time);
        let utc = local - Duration::seconds(i64::from(self.offset.local_minus_utc()));
        Utc.from_utc_datetime(&utc)
    }

    /// Inclusive start of the window.
    pub fn start(&self) -> DateTime<Utc> {
        self.at(NaiveTime::MIN)
    }

    /// Exclusive end of the window.
    pub fn end(&self) -> DateTime<Utc> {
        self.start() + Duration::days(1)
    }

    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        instant >= self.start() && instant < self.end()
    }
}

pub fn offset_from_minutes(minutes: i32) -> Result<FixedOffset> {
    minutes
        .checked_mul(60)
        .and_then(FixedOffset::east_opt)
        .ok_or(PresenceError::InvalidOffset(minutes))
}

pub fn parse_time_of_day(s: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(s.trim(), "%H:%M")
        .map_err(|_| PresenceError::InvalidTimeOfDay(s.to_string()))
}

/// Years a [`DayWindow`] can be built for without its UTC bounds overflowing.
pub const SUPPORTED_YEARS: std::ops::RangeInclusive<i32> = 1..=9999;

/// Parse `YYYY-MM-DD`, refusing years outside [`SUPPORTED_YEARS`].
pub fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .ok()
        .filter(|d| SUPPORTED_YEARS.contains(&d.year()))
        .ok_or_else(|| PresenceError::InvalidDate(s.to_string()))
}
