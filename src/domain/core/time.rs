use std::fmt;
use std::ops::Range;
use std::str::FromStr;

use chrono::{NaiveDateTime, Timelike};
use derive_more::{Display, Error};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DisplayFromStr};

/// Wire format of every instant the facility handles.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M";
/// The facility opens at this hour of day.
pub const OPENING_HOUR: u32 = 8;
/// Last hour of day an event may end in.
pub const CLOSING_HOUR: u32 = 23;

/// A calendar instant with minute precision and no timezone.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(NaiveDateTime);

impl Timestamp {
    pub fn new(value: NaiveDateTime) -> Self {
        Self(value)
    }

    pub fn hour(&self) -> u32 {
        self.0.hour()
    }
}

impl FromStr for Timestamp {
    type Err = TimeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NaiveDateTime::parse_from_str(s.trim(), TIMESTAMP_FORMAT)
            .map(Self)
            .map_err(|_| TimeError::Malformed(s.to_owned()))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format(TIMESTAMP_FORMAT))
    }
}

impl From<NaiveDateTime> for Timestamp {
    fn from(value: NaiveDateTime) -> Self {
        Self(value)
    }
}

/// Half-open span `[start, end)` occupied by an event.
#[serde_as]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeRange {
    #[serde_as(as = "DisplayFromStr")]
    start: Timestamp,
    #[serde_as(as = "DisplayFromStr")]
    end: Timestamp,
}

impl TimeRange {
    pub fn new(start: Timestamp, end: Timestamp) -> Result<Self, TimeError> {
        if start >= end {
            return Err(TimeError::EmptyRange { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn parse(start: &str, end: &str) -> Result<Self, TimeError> {
        Self::new(start.parse()?, end.parse()?)
    }

    pub fn start(&self) -> Timestamp {
        self.start
    }

    pub fn end(&self) -> Timestamp {
        self.end
    }

    pub fn as_range(&self) -> Range<NaiveDateTime> {
        self.start.0..self.end.0
    }

    pub fn overlaps(&self, other: &TimeRange) -> bool {
        self.start < other.end && self.end > other.start
    }

    /// Inclusive on both ends, unlike the overlap test.
    pub fn contains(&self, instant: Timestamp) -> bool {
        self.start <= instant && instant <= self.end
    }

    /// Only the hour-of-day of each end is inspected; dates are ignored.
    pub fn is_within_operating_hours(&self) -> bool {
        self.start.hour() >= OPENING_HOUR && self.end.hour() <= CLOSING_HOUR
    }

    /// Difference of the hour-of-day fields, assuming both ends fall on the same day.
    /// Ranges crossing midnight yield zero or a negative value.
    pub fn hour_span(&self) -> i64 {
        i64::from(self.end.hour()) - i64::from(self.start.hour())
    }

    pub fn elapsed_hours(&self) -> i64 {
        (self.end.0 - self.start.0).num_hours()
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {}", self.start, self.end)
    }
}

#[derive(Error, Display, Debug, Clone, PartialEq, Eq)]
pub enum TimeError {
    #[display(fmt = "Invalid time {:?}, expected YYYY-MM-DDTHH:MM", _0)]
    Malformed(#[error(not(source))] String),
    #[display(fmt = "Start {} must be before end {}", start, end)]
    EmptyRange { start: Timestamp, end: Timestamp },
}
