//! News records and historical data sources

use crate::calendar::{format_date, BusinessDayInfo};
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::{debug, warn};
use watchhamster_common::{Result, ResultExt};

/// Delay at or below which a record counts as on time for quality scoring
pub const ON_TIME_DELAY_MINUTES: u32 = 30;

/// One published news item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewsRecord {
    pub title: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub delay_minutes: u32,
    #[serde(default)]
    pub is_latest: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_time: Option<String>,
}

impl NewsRecord {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            status: String::new(),
            delay_minutes: 0,
            is_latest: false,
            published_time: None,
        }
    }

    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = status.into();
        self
    }

    pub fn with_delay(mut self, delay_minutes: u32) -> Self {
        self.delay_minutes = delay_minutes;
        self
    }

    pub fn latest(mut self, is_latest: bool) -> Self {
        self.is_latest = is_latest;
        self
    }

    /// Per-record quality: base 0.5, +0.3 when latest, +0.2 when on time
    pub fn quality(&self) -> f64 {
        let mut score = 0.5;
        if self.is_latest {
            score += 0.3;
        }
        if self.delay_minutes <= ON_TIME_DELAY_MINUTES {
            score += 0.2;
        }
        f64::min(score, 1.0)
    }
}

/// A record counts as published when present with a non-empty title.
pub fn is_published(record: Option<&NewsRecord>) -> bool {
    record.map(|r| !r.title.trim().is_empty()).unwrap_or(false)
}

/// All news items for one date. `None` marks a news type that was expected
/// but not published.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyNews {
    pub date: NaiveDate,
    #[serde(default)]
    pub news_items: BTreeMap<String, Option<NewsRecord>>,
}

impl DailyNews {
    pub fn new(date: NaiveDate) -> Self {
        Self {
            date,
            news_items: BTreeMap::new(),
        }
    }

    pub fn with_item(mut self, news_type: impl Into<String>, record: Option<NewsRecord>) -> Self {
        self.news_items.insert(news_type.into(), record);
        self
    }

    pub fn record(&self, news_type: &str) -> Option<&NewsRecord> {
        self.news_items.get(news_type).and_then(Option::as_ref)
    }

    pub fn published_count(&self) -> usize {
        self.news_items
            .values()
            .filter(|r| is_published(r.as_ref()))
            .count()
    }

    /// Mean record quality over all news types; unpublished types score 0.
    pub fn data_quality(&self) -> f64 {
        if self.news_items.is_empty() {
            return 0.0;
        }
        let total: f64 = self
            .news_items
            .values()
            .filter(|r| is_published(r.as_ref()))
            .filter_map(|r| r.as_ref().map(NewsRecord::quality))
            .sum();
        total / self.news_items.len() as f64
    }
}

/// Historical day enriched with business-day metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoricalDay {
    pub info: BusinessDayInfo,
    pub news: DailyNews,
    pub data_quality: f64,
}

/// Historical days keyed by date
pub type HistoricalData = BTreeMap<NaiveDate, HistoricalDay>;

/// Source of past daily news
#[async_trait]
pub trait HistoricalDataSource: Send + Sync {
    /// Every available day in `start..=end`. Days without data are omitted.
    async fn fetch_range(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<DailyNews>>;
}

/// In-memory source, mostly for tests and one-shot comparisons
#[derive(Debug, Clone, Default)]
pub struct InMemorySource {
    days: BTreeMap<NaiveDate, DailyNews>,
}

impl InMemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, day: DailyNews) {
        self.days.insert(day.date, day);
    }

    pub fn with_day(mut self, day: DailyNews) -> Self {
        self.insert(day);
        self
    }
}

#[async_trait]
impl HistoricalDataSource for InMemorySource {
    async fn fetch_range(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<DailyNews>> {
        Ok(self
            .days
            .range(start..=end)
            .map(|(_, day)| day.clone())
            .collect())
    }
}

#[derive(Deserialize)]
struct DailyNewsFile {
    #[serde(default)]
    date: Option<NaiveDate>,
    #[serde(default)]
    news_items: BTreeMap<String, Option<NewsRecord>>,
}

/// Directory of `<YYYYMMDD>.json` files
#[derive(Debug, Clone)]
pub struct JsonDirectorySource {
    dir: PathBuf,
}

impl JsonDirectorySource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, date: NaiveDate) -> PathBuf {
        self.dir.join(format!("{}.json", format_date(date)))
    }

    /// Load a single day. A missing file is `Ok(None)`.
    pub async fn load_day(&self, date: NaiveDate) -> Result<Option<DailyNews>> {
        let path = self.path_for(date);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e).context(format!("Failed to read {}", path.display()))
            }
        };

        let file: DailyNewsFile = serde_json::from_str(&content)
            .context(format!("Failed to parse {}", path.display()))?;

        Ok(Some(DailyNews {
            date: file.date.unwrap_or(date),
            news_items: file.news_items,
        }))
    }

    pub async fn save_day(&self, day: &DailyNews) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let json = serde_json::to_string_pretty(day)?;
        tokio::fs::write(self.path_for(day.date), json).await?;
        Ok(())
    }
}

#[async_trait]
impl HistoricalDataSource for JsonDirectorySource {
    async fn fetch_range(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<DailyNews>> {
        let mut days = Vec::new();
        for date in start.iter_days().take_while(|d| *d <= end) {
            match self.load_day(date).await {
                Ok(Some(day)) => days.push(day),
                Ok(None) => debug!("No data file for {}", format_date(date)),
                Err(e) => warn!("Skipping unreadable data for {}: {}", format_date(date), e),
            }
        }
        Ok(days)
    }
}
