//! Comparison report generation

use crate::calendar::{format_date, BusinessDayInfo};
use crate::comparison::{ComparisonEngine, ComparisonResult};
use crate::data::{DailyNews, HistoricalData};
use crate::patterns::analyze_news_type;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::info;
use watchhamster_common::{Result, ResultExt};

/// Direction of the comparison results taken together
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverallTrend {
    Improving,
    Degrading,
    Stable,
    InsufficientData,
}

impl OverallTrend {
    pub fn from_results(results: &[ComparisonResult]) -> Self {
        if results.is_empty() {
            return OverallTrend::InsufficientData;
        }
        let improvements = results.iter().filter(|r| r.has_improvement).count();
        let degradations = results.iter().filter(|r| r.has_degradation).count();
        match improvements.cmp(&degradations) {
            std::cmp::Ordering::Greater => OverallTrend::Improving,
            std::cmp::Ordering::Less => OverallTrend::Degrading,
            std::cmp::Ordering::Equal => OverallTrend::Stable,
        }
    }
}

impl fmt::Display for OverallTrend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OverallTrend::Improving => "improving",
            OverallTrend::Degrading => "degrading",
            OverallTrend::Stable => "stable",
            OverallTrend::InsufficientData => "insufficient data",
        };
        f.write_str(s)
    }
}

/// Full comparison report for one day
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonReport {
    pub generated_at: DateTime<Utc>,
    pub business_day_info: BusinessDayInfo,
    pub comparison_results: Vec<ComparisonResult>,
    pub overall_trend: OverallTrend,
    pub pattern_insights: Vec<String>,
    pub recommendations: Vec<String>,
    pub data_availability_score: f64,
}

impl ComparisonReport {
    pub fn improvement_count(&self) -> usize {
        self.comparison_results
            .iter()
            .filter(|r| r.has_improvement)
            .count()
    }

    pub fn degradation_count(&self) -> usize {
        self.comparison_results
            .iter()
            .filter(|r| r.has_degradation)
            .count()
    }

    /// Short text summary, suitable for a notification
    pub fn summary_text(&self) -> String {
        format!(
            "Comparison for {}: trend {}, {} comparisons ({} improved, {} degraded), availability {:.2}",
            format_date(self.business_day_info.date),
            self.overall_trend,
            self.comparison_results.len(),
            self.improvement_count(),
            self.degradation_count(),
            self.data_availability_score
        )
    }

    /// Write as `comparison_report_<YYYYMMDD>.json` under `dir`.
    pub async fn write_json(&self, dir: &Path) -> Result<PathBuf> {
        tokio::fs::create_dir_all(dir)
            .await
            .context(format!("Failed to create {}", dir.display()))?;

        let path = dir.join(format!(
            "comparison_report_{}.json",
            format_date(self.business_day_info.date)
        ));
        let json = serde_json::to_string_pretty(self)?;
        tokio::fs::write(&path, json)
            .await
            .context(format!("Failed to write {}", path.display()))?;

        info!("Comparison report written to {}", path.display());
        Ok(path)
    }
}

/// Recommendations derived from the day type, comparison results and the
/// amount of history available.
pub fn recommendations(
    info: &BusinessDayInfo,
    results: &[ComparisonResult],
    historical_days: usize,
) -> Vec<String> {
    let mut recommendations = Vec::new();

    if !info.is_business_day {
        if info.is_weekend {
            recommendations.push("Weekend: news publication may be limited".to_string());
        } else if info.is_holiday {
            recommendations.push("Public holiday: news may not be published".to_string());
        }
    }

    let total = results.len() as f64;
    let degradations = results.iter().filter(|r| r.has_degradation).count() as f64;
    let improvements = results.iter().filter(|r| r.has_improvement).count() as f64;

    if degradations > total * 0.5 {
        recommendations
            .push("News publication has degraded overall: system check needed".to_string());
    }
    if improvements > total * 0.7 {
        recommendations
            .push("News publication has improved: keep the current setup".to_string());
    }
    if historical_days < 5 {
        recommendations.push("Not enough historical data: collect more days".to_string());
    }

    if recommendations.is_empty() {
        recommendations.push("Maintain normal monitoring".to_string());
    }
    recommendations
}

/// `min(1, 0.5 * current + 0.5 * historical)` where current is the share of
/// published news types and historical the share of days with any items.
pub fn data_availability_score(current: &DailyNews, historical: &HistoricalData) -> f64 {
    let current_score = if current.news_items.is_empty() {
        0.0
    } else {
        current.published_count() as f64 / current.news_items.len() as f64
    };

    let historical_score = if historical.is_empty() {
        0.0
    } else {
        let available = historical
            .values()
            .filter(|day| !day.news.news_items.is_empty())
            .count();
        available as f64 / historical.len() as f64
    };

    f64::min(current_score * 0.5 + historical_score * 0.5, 1.0)
}

impl ComparisonEngine {
    /// Compare `current` against `historical` and assemble a report.
    pub fn generate_report(
        &self,
        current: &DailyNews,
        historical: &HistoricalData,
    ) -> ComparisonReport {
        let business_day_info = self.business_day_info(current.date);
        let comparison_results = self.compare_with_previous(current, historical);
        let overall_trend = OverallTrend::from_results(&comparison_results);

        let pattern_insights = current
            .news_items
            .keys()
            .flat_map(|news_type| analyze_news_type(news_type, historical).insights)
            .collect();

        let recommendations =
            recommendations(&business_day_info, &comparison_results, historical.len());
        let data_availability_score = data_availability_score(current, historical);

        info!(
            "Comparison report for {} generated (trend: {}, availability: {:.2})",
            format_date(current.date),
            overall_trend,
            data_availability_score
        );

        ComparisonReport {
            generated_at: Utc::now(),
            business_day_info,
            comparison_results,
            overall_trend,
            pattern_insights,
            recommendations,
            data_availability_score,
        }
    }

    /// Search history for `current.date` and generate the report.
    pub async fn analyze(&self, current: &DailyNews, range_days: u32) -> Result<ComparisonReport> {
        let historical = self.search_historical_data(current.date, range_days).await?;
        Ok(self.generate_report(current, &historical))
    }
}
