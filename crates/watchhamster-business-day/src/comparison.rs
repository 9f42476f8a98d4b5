//! Comparison of current news against historical business days

use crate::calendar::{format_date, BusinessDayInfo, HolidayCalendar};
use crate::data::{is_published, DailyNews, HistoricalData, HistoricalDataSource, HistoricalDay, NewsRecord};
use chrono::{Datelike, Days, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};
use watchhamster_common::Result;

/// Default number of past days searched
pub const DEFAULT_SEARCH_RANGE_DAYS: u32 = 10;

/// Which historical date a comparison is made against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComparisonKind {
    PreviousBusinessDay,
    SameDayLastWeek,
    SameDateLastMonth,
}

impl ComparisonKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ComparisonKind::PreviousBusinessDay => "previous_business_day",
            ComparisonKind::SameDayLastWeek => "same_day_last_week",
            ComparisonKind::SameDateLastMonth => "same_date_last_month",
        }
    }
}

impl fmt::Display for ComparisonKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One-line verdict of a comparison
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeSummary {
    NoData,
    NewlyPublished,
    PublicationStopped,
    Improved,
    Degraded,
    Unchanged,
}

impl ChangeSummary {
    pub fn from_flags(
        current_exists: bool,
        comparison_exists: bool,
        has_improvement: bool,
        has_degradation: bool,
    ) -> Self {
        match (current_exists, comparison_exists) {
            (false, false) => ChangeSummary::NoData,
            (true, false) => ChangeSummary::NewlyPublished,
            (false, true) => ChangeSummary::PublicationStopped,
            (true, true) if has_improvement => ChangeSummary::Improved,
            (true, true) if has_degradation => ChangeSummary::Degraded,
            (true, true) => ChangeSummary::Unchanged,
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            ChangeSummary::NoData => "no data",
            ChangeSummary::NewlyPublished => "new data published",
            ChangeSummary::PublicationStopped => "publication stopped",
            ChangeSummary::Improved => "improved",
            ChangeSummary::Degraded => "degraded",
            ChangeSummary::Unchanged => "unchanged",
        }
    }
}

impl fmt::Display for ChangeSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// Result of comparing one news type between two dates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonResult {
    pub kind: ComparisonKind,
    pub current_date: NaiveDate,
    pub comparison_date: NaiveDate,
    pub news_type: String,
    pub current: Option<NewsRecord>,
    pub comparison: Option<NewsRecord>,
    pub has_improvement: bool,
    pub has_degradation: bool,
    pub summary: ChangeSummary,
    pub changes: Vec<String>,
}

/// Field-level differences between two published records, oldest value first.
pub fn detailed_changes(current: &NewsRecord, comparison: &NewsRecord) -> Vec<String> {
    let mut changes = Vec::new();
    if current.status != comparison.status {
        changes.push(format!("status: {} → {}", comparison.status, current.status));
    }
    if current.delay_minutes != comparison.delay_minutes {
        changes.push(format!(
            "delay: {} min → {} min",
            comparison.delay_minutes, current.delay_minutes
        ));
    }
    if current.title != comparison.title {
        changes.push("title changed".to_string());
    }
    changes
}

/// Compare one news type between the current and a historical record.
pub fn compare_records(
    kind: ComparisonKind,
    current_date: NaiveDate,
    comparison_date: NaiveDate,
    news_type: &str,
    current: Option<&NewsRecord>,
    comparison: Option<&NewsRecord>,
) -> ComparisonResult {
    let current_exists = is_published(current);
    let comparison_exists = is_published(comparison);
    let mut has_improvement = false;
    let mut has_degradation = false;
    let mut changes = Vec::new();

    match (current, comparison) {
        (Some(cur), Some(prev)) if current_exists && comparison_exists => {
            changes = detailed_changes(cur, prev);

            // Freshness decides first; delay only when freshness is unchanged
            if cur.is_latest && !prev.is_latest {
                has_improvement = true;
            } else if !cur.is_latest && prev.is_latest {
                has_degradation = true;
            } else if cur.delay_minutes < prev.delay_minutes {
                has_improvement = true;
            } else if cur.delay_minutes > prev.delay_minutes {
                has_degradation = true;
            }
        }
        _ if current_exists => {
            changes.push("current data present, comparison data missing".to_string());
            has_improvement = true;
        }
        _ if comparison_exists => {
            changes.push("current data missing, comparison data present".to_string());
            has_degradation = true;
        }
        _ => changes.push("no data on either date".to_string()),
    }

    let summary = ChangeSummary::from_flags(
        current_exists,
        comparison_exists,
        has_improvement,
        has_degradation,
    );

    ComparisonResult {
        kind,
        current_date,
        comparison_date,
        news_type: news_type.to_string(),
        current: current.cloned(),
        comparison: comparison.cloned(),
        has_improvement,
        has_degradation,
        summary,
        changes,
    }
}

/// Same calendar date one month earlier. `None` when that date does not exist.
pub fn same_date_last_month(date: NaiveDate) -> Option<NaiveDate> {
    let (year, month) = if date.month() == 1 {
        (date.year() - 1, 12)
    } else {
        (date.year(), date.month() - 1)
    };
    NaiveDate::from_ymd_opt(year, month, date.day())
}

/// Searches historical data and compares it against current news
pub struct ComparisonEngine {
    calendar: HolidayCalendar,
    source: Arc<dyn HistoricalDataSource>,
}

impl ComparisonEngine {
    pub fn new(calendar: HolidayCalendar, source: Arc<dyn HistoricalDataSource>) -> Self {
        Self { calendar, source }
    }

    pub fn calendar(&self) -> &HolidayCalendar {
        &self.calendar
    }

    pub fn business_day_info(&self, date: NaiveDate) -> BusinessDayInfo {
        BusinessDayInfo::for_date(date, &self.calendar)
    }

    /// Fetch the `range_days` days before `target`, keyed by date.
    pub async fn search_historical_data(
        &self,
        target: NaiveDate,
        range_days: u32,
    ) -> Result<HistoricalData> {
        let mut historical = HistoricalData::new();
        if range_days == 0 {
            return Ok(historical);
        }

        let (Some(newest), Some(oldest)) = (
            target.checked_sub_days(Days::new(1)),
            target.checked_sub_days(Days::new(u64::from(range_days))),
        ) else {
            return Ok(historical);
        };

        let days = self.source.fetch_range(oldest, newest).await?;
        for news in days {
            if news.date < oldest || news.date > newest {
                continue;
            }
            let info = self.business_day_info(news.date);
            let data_quality = news.data_quality();
            historical.insert(
                news.date,
                HistoricalDay {
                    info,
                    news,
                    data_quality,
                },
            );
        }

        info!(
            "Found {} historical days between {} and {}",
            historical.len(),
            format_date(oldest),
            format_date(newest)
        );
        Ok(historical)
    }

    /// Dates the current day is compared against. Previous business day is
    /// always included when found; the others only when data exists for them.
    pub fn comparison_dates(
        &self,
        current: NaiveDate,
        historical: &HistoricalData,
    ) -> Vec<(ComparisonKind, NaiveDate)> {
        let mut dates = Vec::new();

        if let Some(previous) = self.calendar.previous_business_day(current) {
            dates.push((ComparisonKind::PreviousBusinessDay, previous));
        }

        if let Some(last_week) = current.checked_sub_days(Days::new(7)) {
            if historical.contains_key(&last_week) {
                dates.push((ComparisonKind::SameDayLastWeek, last_week));
            }
        }

        if let Some(last_month) = same_date_last_month(current) {
            if historical.contains_key(&last_month) {
                dates.push((ComparisonKind::SameDateLastMonth, last_month));
            }
        }

        dates
    }

    /// Compare every news type of `current` against each comparison date
    /// that has historical data.
    pub fn compare_with_previous(
        &self,
        current: &DailyNews,
        historical: &HistoricalData,
    ) -> Vec<ComparisonResult> {
        let mut results = Vec::new();

        for (kind, date) in self.comparison_dates(current.date, historical) {
            let Some(day) = historical.get(&date) else {
                debug!("No historical data for {} ({})", format_date(date), kind);
                continue;
            };

            for news_type in current.news_items.keys() {
                results.push(compare_records(
                    kind,
                    current.date,
                    date,
                    news_type,
                    current.record(news_type),
                    day.news.record(news_type),
                ));
            }
        }

        debug!("Produced {} comparison results", results.len());
        results
    }
}
