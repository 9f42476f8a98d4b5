//! # WatchHamster Business Day
//!
//! Business-day calendar arithmetic and comparison of current news
//! publication against historical days.
//!
//! ```
//! use watchhamster_business_day::{parse_date, HolidayCalendar};
//!
//! let calendar = HolidayCalendar::korea_2025();
//! let info = calendar.business_day_info(parse_date("20250101").unwrap());
//! assert!(info.is_holiday);
//! assert!(!info.is_business_day);
//! ```

pub mod calendar;
pub mod comparison;
pub mod data;
pub mod patterns;
pub mod report;

pub use calendar::{
    format_date, parse_date, BusinessDayInfo, HolidayCalendar, HolidayEntry, DATE_FORMAT,
    SEARCH_WINDOW_DAYS,
};
pub use comparison::{
    compare_records, ChangeSummary, ComparisonEngine, ComparisonKind, ComparisonResult,
    DEFAULT_SEARCH_RANGE_DAYS,
};
pub use data::{
    DailyNews, HistoricalData, HistoricalDataSource, HistoricalDay, InMemorySource,
    JsonDirectorySource, NewsRecord,
};
pub use patterns::{analyze_news_type, default_patterns, ExpectedPattern, PatternAnalysis};
pub use report::{ComparisonReport, OverallTrend};
