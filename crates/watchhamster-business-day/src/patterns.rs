//! Publication pattern analysis per news type

use crate::data::{is_published, HistoricalData};
use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

/// Expected daily publication window for a news type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpectedPattern {
    pub news_type: String,
    pub expected_time: NaiveTime,
    pub tolerance_minutes: u32,
    pub business_days_only: bool,
}

impl ExpectedPattern {
    pub fn new(news_type: &str, hour: u32, minute: u32, tolerance_minutes: u32) -> Self {
        Self {
            news_type: news_type.to_string(),
            expected_time: NaiveTime::from_hms_opt(hour, minute, 0).unwrap_or(NaiveTime::MIN),
            tolerance_minutes,
            business_days_only: true,
        }
    }

    /// Whether `time` falls inside the tolerance window
    pub fn is_within_window(&self, time: NaiveTime) -> bool {
        let diff = (time - self.expected_time).num_minutes().unsigned_abs();
        diff <= u64::from(self.tolerance_minutes)
    }
}

/// Built-in publication windows
pub fn default_patterns() -> Vec<ExpectedPattern> {
    vec![
        ExpectedPattern::new("newyork-market-watch", 6, 30, 30),
        ExpectedPattern::new("kospi-close", 15, 40, 60),
        ExpectedPattern::new("exchange-rate", 15, 30, 45),
    ]
}

/// Published/total counts for a class of days
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DayClassStats {
    pub published_days: u32,
    pub total_days: u32,
    pub publication_rate: f64,
}

impl DayClassStats {
    fn from_counts(published_days: u32, total_days: u32) -> Option<Self> {
        (total_days > 0).then(|| Self {
            published_days,
            total_days,
            publication_rate: f64::from(published_days) / f64::from(total_days),
        })
    }
}

/// Publication behaviour of one news type over the historical window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternAnalysis {
    pub news_type: String,
    pub analysis_days: usize,
    pub publication_rate: f64,
    /// Mean delay over published business days that were late at all
    pub average_delay: f64,
    pub business_day_pattern: Option<DayClassStats>,
    pub weekend_pattern: Option<DayClassStats>,
    pub insights: Vec<String>,
}

pub fn analyze_news_type(news_type: &str, historical: &HistoricalData) -> PatternAnalysis {
    let mut published_days = 0u32;
    let mut total_delay = 0u64;
    let mut delay_count = 0u32;
    let (mut business_published, mut business_total) = (0u32, 0u32);
    let (mut off_published, mut off_total) = (0u32, 0u32);

    for day in historical.values() {
        let record = day.news.record(news_type);
        let published = is_published(record);

        if day.info.is_business_day {
            business_total += 1;
            if published {
                business_published += 1;
                published_days += 1;
                if let Some(record) = record {
                    if record.delay_minutes > 0 {
                        total_delay += u64::from(record.delay_minutes);
                        delay_count += 1;
                    }
                }
            }
        } else {
            off_total += 1;
            if published {
                off_published += 1;
            }
        }
    }

    let analysis_days = historical.len();
    let publication_rate = if analysis_days > 0 {
        f64::from(published_days) / analysis_days as f64
    } else {
        0.0
    };
    let average_delay = if delay_count > 0 {
        total_delay as f64 / f64::from(delay_count)
    } else {
        0.0
    };

    let mut analysis = PatternAnalysis {
        news_type: news_type.to_string(),
        analysis_days,
        publication_rate,
        average_delay,
        business_day_pattern: DayClassStats::from_counts(business_published, business_total),
        weekend_pattern: DayClassStats::from_counts(off_published, off_total),
        insights: Vec::new(),
    };
    analysis.insights = pattern_insights(&analysis);
    analysis
}

fn pattern_insights(analysis: &PatternAnalysis) -> Vec<String> {
    let name = &analysis.news_type;
    let rate = analysis.publication_rate;
    let delay = analysis.average_delay;
    let mut insights = Vec::new();

    let rate_text = format!("{:.1}%", rate * 100.0);
    insights.push(if rate >= 0.9 {
        format!("{}: very stable publication (rate {})", name, rate_text)
    } else if rate >= 0.7 {
        format!("{}: good publication (rate {})", name, rate_text)
    } else if rate >= 0.5 {
        format!("{}: unstable publication (rate {})", name, rate_text)
    } else {
        format!("{}: serious publication problem (rate {})", name, rate_text)
    });

    insights.push(if delay > 60.0 {
        format!("{}: severe delays (average {:.0} min)", name, delay)
    } else if delay > 30.0 {
        format!("{}: delays (average {:.0} min)", name, delay)
    } else if delay > 0.0 {
        format!("{}: minor delays (average {:.0} min)", name, delay)
    } else {
        format!("{}: published on time", name)
    });

    if let Some(business) = analysis.business_day_pattern {
        if business.publication_rate >= 0.9 {
            insights.push(format!("{}: business-day publication very stable", name));
        } else if business.publication_rate < 0.7 {
            insights.push(format!("{}: business-day publication unstable", name));
        }
    }

    if let Some(weekend) = analysis.weekend_pattern {
        if weekend.publication_rate > 0.1 {
            insights.push(format!("{}: occasional publication on days off", name));
        } else {
            insights.push(format!("{}: no publication on days off (normal)", name));
        }
    }

    insights
}
