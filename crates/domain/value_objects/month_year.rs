use std::{fmt::Display, str::FromStr};

use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Deserializer, Serialize, Serializer, de};
use thiserror::Error;

/// A calendar month. Wire format is `MM-YYYY`; the day component of any
/// timestamp converted into a `MonthYear` is dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MonthYear(NaiveDate);

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid month-year {0:?}, expected MM-YYYY")]
pub struct MonthYearParseError(String);

impl MonthYear {
    pub fn new(year: i32, month: u32) -> Option<Self> {
        NaiveDate::from_ymd_opt(year, month, 1).map(Self)
    }

    pub fn from_datetime(value: NaiveDateTime) -> Self {
        // Day 1 exists in every month, with_day(1) cannot fail here.
        Self(value.date().with_day(1).unwrap_or(value.date()))
    }

    pub fn to_datetime(self) -> NaiveDateTime {
        self.0.and_time(NaiveTime::MIN)
    }

    pub fn year(self) -> i32 {
        self.0.year()
    }

    pub fn month(self) -> u32 {
        self.0.month()
    }

    /// Number of months from `self` to `end`, both ends included.
    /// Zero or negative when `end` precedes `self`.
    pub fn months_through(self, end: MonthYear) -> i64 {
        i64::from(end.year() - self.year()) * 12 + i64::from(end.month())
            - i64::from(self.month())
            + 1
    }
}

impl Display for MonthYear {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:02}-{:04}", self.month(), self.year())
    }
}

impl FromStr for MonthYear {
    type Err = MonthYearParseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let invalid = || MonthYearParseError(value.to_string());

        let (month, year) = value.trim().split_once('-').ok_or_else(invalid)?;
        if month.len() != 2 || year.len() != 4 {
            return Err(invalid());
        }
        if !month.bytes().chain(year.bytes()).all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }

        let month: u32 = month.parse().map_err(|_| invalid())?;
        let year: i32 = year.parse().map_err(|_| invalid())?;

        MonthYear::new(year, month).ok_or_else(invalid)
    }
}

impl Serialize for MonthYear {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for MonthYear {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(de::Error::custom)
    }
}
