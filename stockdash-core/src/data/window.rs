//! Trailing date windows.
//!
//! Windows are always resolved to explicit calendar dates before they reach a
//! provider. Relative period tokens ("1y") are not used because some upstream
//! deployments interpret them inconsistently.

use chrono::{NaiveDate, TimeDelta};
use serde::{Deserialize, Serialize};

/// Default trailing window length in calendar days.
pub const DEFAULT_WINDOW_DAYS: u32 = 365;

/// Inclusive calendar-date range `start..=end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateWindow {
    /// Window of `days` calendar days ending at `end`: `start = end - days`.
    ///
    /// `None` when the start date falls outside the representable calendar.
    pub fn trailing(end: NaiveDate, days: u32) -> Option<Self> {
        let span = TimeDelta::try_days(i64::from(days))?;
        Some(Self {
            start: end.checked_sub_signed(span)?,
            end,
        })
    }

    /// Trailing window ending at today's local date.
    pub fn trailing_from_today(days: u32) -> Option<Self> {
        Self::trailing(chrono::Local::now().date_naive(), days)
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    /// Length in calendar days (`end - start`).
    pub fn days(&self) -> i64 {
        (self.end - self.start).num_days()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn trailing_year_crosses_leap_day() {
        let w = DateWindow::trailing(d(2024, 6, 30), DEFAULT_WINDOW_DAYS).unwrap();
        assert_eq!(w.start, d(2023, 7, 1));
        assert_eq!(w.end, d(2024, 6, 30));
        assert_eq!(w.days(), 365);
    }

    #[test]
    fn contains_is_inclusive() {
        let w = DateWindow::trailing(d(2024, 1, 10), 5).unwrap();
        assert!(w.contains(d(2024, 1, 5)));
        assert!(w.contains(d(2024, 1, 10)));
        assert!(!w.contains(d(2024, 1, 4)));
        assert!(!w.contains(d(2024, 1, 11)));
    }

    #[test]
    fn window_beyond_calendar_range_is_none() {
        assert_eq!(DateWindow::trailing(d(2024, 1, 1), u32::MAX), None);
        assert!(DateWindow::trailing_from_today(u32::MAX).is_none());
        assert!(DateWindow::trailing(NaiveDate::MIN, 1).is_none());
    }
}
