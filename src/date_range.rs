use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

use crate::error::ParseError;

pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Point in time attached to a sample. Everything is normalised to UTC
/// before the calendar date is taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timestamp {
    Instant(DateTime<Utc>),
    Date(NaiveDate),
}

impl Timestamp {
    /// Milliseconds since the Unix epoch, as found in `timestampMs`.
    pub fn from_millis(millis: i64) -> Result<Self, ParseError> {
        DateTime::from_timestamp_millis(millis)
            .map(Timestamp::Instant)
            .ok_or_else(|| ParseError::Timestamp(millis.to_string()))
    }

    pub fn parse_millis(raw: &str) -> Result<Self, ParseError> {
        let millis = raw
            .trim()
            .parse::<i64>()
            .map_err(|_| ParseError::Timestamp(raw.to_string()))?;
        Self::from_millis(millis)
    }

    /// ISO-8601 date-time, with or without a trailing offset. Values without
    /// an offset are read as UTC.
    pub fn parse_iso(raw: &str) -> Result<Self, ParseError> {
        let trimmed = raw.trim();
        if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
            return Ok(Timestamp::Instant(dt.with_timezone(&Utc)));
        }
        if let Ok(dt) = DateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S%.f%z") {
            return Ok(Timestamp::Instant(dt.with_timezone(&Utc)));
        }
        trimmed
            .parse::<NaiveDateTime>()
            .map(|naive| Timestamp::Instant(naive.and_utc()))
            .map_err(|_| ParseError::Timestamp(raw.to_string()))
    }

    /// Only the leading `YYYY-MM-DD` of `raw` is looked at.
    pub fn parse_date_prefix(raw: &str) -> Result<Self, ParseError> {
        let trimmed = raw.trim();
        trimmed
            .get(..10)
            .and_then(|prefix| NaiveDate::parse_from_str(prefix, DATE_FORMAT).ok())
            .map(Timestamp::Date)
            .ok_or_else(|| ParseError::Timestamp(raw.to_string()))
    }

    pub fn date(&self) -> NaiveDate {
        match self {
            Timestamp::Instant(dt) => dt.date_naive(),
            Timestamp::Date(date) => *date,
        }
    }
}

/// Inclusive calendar-date window. Both bounds absent means "accept all".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DateRange {
    pub min: Option<NaiveDate>,
    pub max: Option<NaiveDate>,
}

impl DateRange {
    pub fn new(min: Option<NaiveDate>, max: Option<NaiveDate>) -> Self {
        DateRange { min, max }
    }

    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn is_unbounded(&self) -> bool {
        self.min.is_none() && self.max.is_none()
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.min.is_none_or(|min| min <= date) && self.max.is_none_or(|max| date <= max)
    }

    /// Samples without a timestamp only pass an unbounded range.
    pub fn accepts(&self, timestamp: Option<&Timestamp>) -> bool {
        if self.is_unbounded() {
            return true;
        }
        timestamp.is_some_and(|ts| in_range(ts, self))
    }
}

pub fn in_range(timestamp: &Timestamp, range: &DateRange) -> bool {
    range.is_unbounded() || range.contains(timestamp.date())
}

pub fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw.trim(), DATE_FORMAT)
        .map_err(|e| format!("expected YYYY-MM-DD, got {raw:?} ({e})"))
}
