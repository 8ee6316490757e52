// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Shared helpers for date/time formatting and ISO week arithmetic.

use chrono::{DateTime, Datelike, NaiveDate, SecondsFormat, Utc};
use std::fmt;

/// Date format used for archive record dates.
pub const RECORD_DATE_FORMAT: &str = "%Y%m%d";

/// Format a UTC timestamp as RFC3339 using a `Z` suffix.
pub fn format_utc_rfc3339(date: DateTime<Utc>) -> String {
    date.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Parse a `YYYYMMDD` record date.
pub fn parse_record_date(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value, RECORD_DATE_FORMAT).ok()
}

/// Format a date as `YYYYMMDD`.
pub fn format_record_date(date: NaiveDate) -> String {
    date.format(RECORD_DATE_FORMAT).to_string()
}

/// An ISO-8601 (year, week) pair.
///
/// Ordering is chronological: year first, then week.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct IsoWeek {
    pub year: i32,
    pub week: u32,
}

impl IsoWeek {
    pub fn new(year: i32, week: u32) -> Self {
        Self { year, week }
    }

    /// The ISO week containing `date`.
    pub fn of(date: NaiveDate) -> Self {
        let iso = date.iso_week();
        Self {
            year: iso.year(),
            week: iso.week(),
        }
    }
}

impl fmt::Display for IsoWeek {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-W{:02}", self.year, self.week)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_iso_week_of_monday() {
        assert_eq!(IsoWeek::of(date(2023, 1, 2)), IsoWeek::new(2023, 1));
    }

    #[test]
    fn test_iso_week_year_boundary() {
        // Jan 1 2023 is a Sunday and belongs to the last week of 2022.
        assert_eq!(IsoWeek::of(date(2023, 1, 1)), IsoWeek::new(2022, 52));
        // Dec 31 2020 is in 2020-W53.
        assert_eq!(IsoWeek::of(date(2020, 12, 31)), IsoWeek::new(2020, 53));
        // Dec 30 2024 is a Monday in 2025-W01.
        assert_eq!(IsoWeek::of(date(2024, 12, 30)), IsoWeek::new(2025, 1));
    }

    #[test]
    fn test_iso_week_ordering() {
        assert!(IsoWeek::new(2022, 52) < IsoWeek::new(2023, 1));
        assert!(IsoWeek::new(2023, 1) < IsoWeek::new(2023, 2));
    }

    #[test]
    fn test_iso_week_display() {
        assert_eq!(IsoWeek::new(2023, 3).to_string(), "2023-W03");
    }

    #[test]
    fn test_record_date_parse_and_format() {
        let d = parse_record_date("20230102").unwrap();
        assert_eq!(d, date(2023, 1, 2));
        assert_eq!(format_record_date(d), "20230102");
    }

    #[test]
    fn test_record_date_rejects_other_formats() {
        assert!(parse_record_date("2023-01-02").is_none());
        assert!(parse_record_date("").is_none());
    }

    #[test]
    fn test_format_utc_rfc3339_uses_z_suffix() {
        let ts = DateTime::parse_from_rfc3339("2023-01-02T03:04:05+00:00")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(format_utc_rfc3339(ts), "2023-01-02T03:04:05Z");
    }
}
