//! Reporting-date and fiscal-year computation.
//!
//! Reports are grouped by calendar day in [`REPORT_TZ`] (Japan Standard
//! Time), and by a fiscal year that starts on a configurable month/day.

use anyhow::{bail, Result};
use chrono::{Datelike, NaiveDate};
use chrono_tz::Tz;
use serde::Deserialize;

use crate::models::MessageTs;

/// The only supported reporting timezone.
pub const REPORT_TZ: Tz = chrono_tz::Asia::Tokyo;

/// First day of the fiscal year.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct FiscalYearStart {
    pub month: u32,
    pub day: u32,
}

impl FiscalYearStart {
    /// Validate a month/day pair. February 29 is rejected because the
    /// boundary would not exist in most years.
    pub fn new(month: u32, day: u32) -> Result<Self> {
        if !(1..=12).contains(&month) {
            bail!("fiscal year start month must be 1-12, got {}", month);
        }
        if NaiveDate::from_ymd_opt(2001, month, day).is_none() {
            bail!(
                "fiscal year start day {} is not valid for month {}",
                day,
                month
            );
        }
        Ok(Self { month, day })
    }

    /// Fiscal year a date belongs to, named after the calendar year it
    /// starts in. The boundary day itself opens the new fiscal year.
    pub fn fiscal_year(&self, date: NaiveDate) -> i32 {
        if (date.month(), date.day()) >= (self.month, self.day) {
            date.year()
        } else {
            date.year() - 1
        }
    }
}

impl Default for FiscalYearStart {
    fn default() -> Self {
        Self { month: 4, day: 1 }
    }
}

/// Calendar date of a message in [`REPORT_TZ`].
pub fn report_date(ts: MessageTs) -> Option<NaiveDate> {
    ts.to_datetime()
        .map(|dt| dt.with_timezone(&REPORT_TZ).date_naive())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_april_boundary() {
        let start = FiscalYearStart::default();
        assert_eq!(start.fiscal_year(d(2025, 3, 31)), 2024);
        assert_eq!(start.fiscal_year(d(2025, 4, 1)), 2025);
        assert_eq!(start.fiscal_year(d(2025, 12, 31)), 2025);
        assert_eq!(start.fiscal_year(d(2026, 1, 1)), 2025);
    }

    #[test]
    fn test_mid_month_boundary_uses_day() {
        let start = FiscalYearStart::new(10, 15).unwrap();
        assert_eq!(start.fiscal_year(d(2025, 10, 14)), 2024);
        assert_eq!(start.fiscal_year(d(2025, 10, 15)), 2025);
    }

    #[test]
    fn test_january_start_is_calendar_year() {
        let start = FiscalYearStart::new(1, 1).unwrap();
        assert_eq!(start.fiscal_year(d(2025, 1, 1)), 2025);
        assert_eq!(start.fiscal_year(d(2024, 12, 31)), 2024);
    }

    #[test]
    fn test_rejects_invalid_start() {
        assert!(FiscalYearStart::new(0, 1).is_err());
        assert!(FiscalYearStart::new(13, 1).is_err());
        assert!(FiscalYearStart::new(4, 31).is_err());
        assert!(FiscalYearStart::new(2, 29).is_err());
    }

    #[test]
    fn test_report_date_is_jst() {
        // 2025-03-31T15:00:00Z is 2025-04-01T00:00:00+09:00.
        let ts = MessageTs::new(1_743_433_200, 0);
        assert_eq!(report_date(ts), Some(d(2025, 4, 1)));
        let just_before = MessageTs::new(1_743_433_199, 999_999);
        assert_eq!(report_date(just_before), Some(d(2025, 3, 31)));
    }
}
