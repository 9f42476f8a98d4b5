//! Holiday calendar and business-day metadata

use chrono::{Datelike, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use watchhamster_common::{Error, Result};

/// Compact date format used for file names and CLI arguments
pub const DATE_FORMAT: &str = "%Y%m%d";

/// How far the previous/next business day search walks
pub const SEARCH_WINDOW_DAYS: u32 = 10;

/// Korean public holidays for 2025
const KR_HOLIDAYS_2025: &[(&str, &str)] = &[
    ("20250101", "New Year's Day"),
    ("20250127", "Seollal holidays"),
    ("20250128", "Seollal"),
    ("20250129", "Seollal holidays"),
    ("20250301", "Independence Movement Day"),
    ("20250505", "Children's Day"),
    ("20250506", "Children's Day (substitute)"),
    ("20250515", "Buddha's Birthday"),
    ("20250606", "Memorial Day"),
    ("20250815", "Liberation Day"),
    ("20250929", "Chuseok holidays"),
    ("20250930", "Chuseok"),
    ("20251001", "Chuseok holidays"),
    ("20251003", "National Foundation Day"),
    ("20251009", "Hangul Day"),
    ("20251225", "Christmas"),
];

/// Parse `YYYYMMDD` or `YYYY-MM-DD`.
pub fn parse_date(input: &str) -> Result<NaiveDate> {
    let trimmed = input.trim();
    let format = if trimmed.contains('-') {
        "%Y-%m-%d"
    } else {
        DATE_FORMAT
    };

    if trimmed.is_empty() {
        return Err(Error::invalid_date(input, "empty date"));
    }

    NaiveDate::parse_from_str(trimmed, format)
        .map_err(|e| Error::invalid_date(input, e.to_string()))
}

/// Format a date as `YYYYMMDD`.
pub fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

/// Holiday entry as it appears in configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HolidayEntry {
    pub date: String,
    pub name: String,
}

/// Fixed lookup table of public holidays
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HolidayCalendar {
    holidays: BTreeMap<NaiveDate, String>,
}

impl HolidayCalendar {
    /// Calendar without any holidays (weekends only)
    pub fn empty() -> Self {
        Self {
            holidays: BTreeMap::new(),
        }
    }

    /// Built-in 2025 Korean holiday table
    pub fn korea_2025() -> Self {
        let holidays = KR_HOLIDAYS_2025
            .iter()
            .filter_map(|(date, name)| {
                NaiveDate::parse_from_str(date, DATE_FORMAT)
                    .ok()
                    .map(|d| (d, name.to_string()))
            })
            .collect();
        Self { holidays }
    }

    /// Build a calendar from configured entries. Any unparsable date rejects
    /// the whole table.
    pub fn from_entries(entries: &[HolidayEntry]) -> Result<Self> {
        let mut holidays = BTreeMap::new();
        for entry in entries {
            let date = parse_date(&entry.date)?;
            holidays.insert(date, entry.name.clone());
        }
        Ok(Self { holidays })
    }

    pub fn len(&self) -> usize {
        self.holidays.len()
    }

    pub fn is_empty(&self) -> bool {
        self.holidays.is_empty()
    }

    pub fn holidays(&self) -> impl Iterator<Item = (&NaiveDate, &String)> {
        self.holidays.iter()
    }

    pub fn is_holiday(&self, date: NaiveDate) -> bool {
        self.holidays.contains_key(&date)
    }

    pub fn holiday_name(&self, date: NaiveDate) -> Option<&str> {
        self.holidays.get(&date).map(String::as_str)
    }

    pub fn is_weekend(date: NaiveDate) -> bool {
        matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
    }

    pub fn is_business_day(&self, date: NaiveDate) -> bool {
        !Self::is_weekend(date) && !self.is_holiday(date)
    }

    /// Closest earlier business day within the search window
    pub fn previous_business_day(&self, date: NaiveDate) -> Option<NaiveDate> {
        let mut candidate = date;
        for _ in 0..SEARCH_WINDOW_DAYS {
            candidate = candidate.pred_opt()?;
            if self.is_business_day(candidate) {
                return Some(candidate);
            }
        }
        None
    }

    /// Closest later business day within the search window
    pub fn next_business_day(&self, date: NaiveDate) -> Option<NaiveDate> {
        let mut candidate = date;
        for _ in 0..SEARCH_WINDOW_DAYS {
            candidate = candidate.succ_opt()?;
            if self.is_business_day(candidate) {
                return Some(candidate);
            }
        }
        None
    }

    pub fn business_day_info(&self, date: NaiveDate) -> BusinessDayInfo {
        BusinessDayInfo::for_date(date, self)
    }
}

impl Default for HolidayCalendar {
    fn default() -> Self {
        Self::korea_2025()
    }
}

/// Business-day metadata for one date
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusinessDayInfo {
    pub date: NaiveDate,
    pub weekday: Weekday,
    pub is_business_day: bool,
    pub is_weekend: bool,
    pub is_holiday: bool,
    pub holiday_name: Option<String>,
    pub previous_business_day: Option<NaiveDate>,
    pub next_business_day: Option<NaiveDate>,
}

impl BusinessDayInfo {
    pub fn for_date(date: NaiveDate, calendar: &HolidayCalendar) -> Self {
        Self {
            date,
            weekday: date.weekday(),
            is_business_day: calendar.is_business_day(date),
            is_weekend: HolidayCalendar::is_weekend(date),
            is_holiday: calendar.is_holiday(date),
            holiday_name: calendar.holiday_name(date).map(str::to_string),
            previous_business_day: calendar.previous_business_day(date),
            next_business_day: calendar.next_business_day(date),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> NaiveDate {
        parse_date(s).unwrap()
    }

    #[test]
    fn test_parse_date_formats() {
        assert_eq!(d("20250314"), NaiveDate::from_ymd_opt(2025, 3, 14).unwrap());
        assert_eq!(d("2025-03-14"), NaiveDate::from_ymd_opt(2025, 3, 14).unwrap());
        assert_eq!(format_date(d("2025-03-14")), "20250314");

        assert!(matches!(parse_date("20251340"), Err(Error::InvalidDate { .. })));
        assert!(matches!(parse_date("yesterday"), Err(Error::InvalidDate { .. })));
        assert!(matches!(parse_date(""), Err(Error::InvalidDate { .. })));
    }

    #[test]
    fn test_business_day_matches_weekday_and_table() {
        let calendar = HolidayCalendar::korea_2025();
        let mut date = d("20241201");
        let end = d("20260131");
        while date <= end {
            let expected = date.weekday().num_days_from_monday() < 5 && !calendar.is_holiday(date);
            assert_eq!(calendar.is_business_day(date), expected, "mismatch for {}", date);
            date = date.succ_opt().unwrap();
        }
    }

    #[test]
    fn test_holiday_info() {
        let calendar = HolidayCalendar::default();
        let info = calendar.business_day_info(d("20250815"));
        assert!(info.is_holiday);
        assert!(!info.is_weekend);
        assert!(!info.is_business_day);
        assert_eq!(info.holiday_name.as_deref(), Some("Liberation Day"));
        assert_eq!(info.weekday, Weekday::Fri);
        assert_eq!(info.previous_business_day, Some(d("20250814")));
        // Fri holiday, then weekend
        assert_eq!(info.next_business_day, Some(d("20250818")));
    }

    #[test]
    fn test_previous_business_day_skips_chuseok() {
        let calendar = HolidayCalendar::korea_2025();
        // Oct 3 (Fri) and Oct 1 are holidays, Oct 2 is a business day
        assert_eq!(calendar.previous_business_day(d("20251006")), Some(d("20251002")));
        // Sep 29, Sep 30, Oct 1 are holidays
        assert_eq!(calendar.next_business_day(d("20250926")), Some(d("20251002")));
    }

    #[test]
    fn test_search_window_is_bounded() {
        let entries: Vec<HolidayEntry> = (1..=28)
            .map(|day| HolidayEntry {
                date: format!("202502{:02}", day),
                name: "closed".to_string(),
            })
            .collect();
        let calendar = HolidayCalendar::from_entries(&entries).unwrap();

        assert_eq!(calendar.previous_business_day(d("20250220")), None);
        assert_eq!(calendar.next_business_day(d("20250210")), None);
        assert_eq!(calendar.next_business_day(d("20250225")), Some(d("20250303")));
    }

    #[test]
    fn test_from_entries_rejects_bad_date() {
        let entries = vec![HolidayEntry {
            date: "2025-02-30".to_string(),
            name: "nope".to_string(),
        }];
        assert!(HolidayCalendar::from_entries(&entries).is_err());
        assert!(HolidayCalendar::empty().is_empty());
        assert_eq!(HolidayCalendar::korea_2025().len(), 16);
    }
}
