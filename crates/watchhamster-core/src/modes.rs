//! Which monitors each monitoring mode runs.

use chrono::NaiveDate;
use tracing::{info, warn};
use watchhamster_business_day::{format_date, HolidayCalendar};
use watchhamster_common::MonitoringMode;
use watchhamster_process_management::MonitorConfig;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MonitorSelection {
    pub selected: Vec<String>,
    /// Business-day-only monitors left out on a non-business day
    pub skipped: Vec<String>,
    /// Requested ids that match no monitor
    pub unknown: Vec<String>,
}

/// Pick the monitors `mode` runs on `today` from `candidates`.
///
/// Individual mode runs exactly the `requested` ids (disabled ones included);
/// every other mode runs all enabled candidates. Smart mode leaves out
/// `business_days_only` monitors on weekends and holidays.
pub fn select_monitors(
    mode: MonitoringMode,
    candidates: &[MonitorConfig],
    requested: &[String],
    calendar: &HolidayCalendar,
    today: NaiveDate,
) -> MonitorSelection {
    let mut selection = MonitorSelection::default();

    match mode {
        MonitoringMode::Individual => {
            for id in requested {
                if selection.selected.contains(id) {
                    continue;
                }
                if candidates.iter().any(|m| &m.id == id) {
                    selection.selected.push(id.clone());
                } else {
                    warn!("Unknown monitor requested: {}", id);
                    selection.unknown.push(id.clone());
                }
            }
        }
        MonitoringMode::Integrated | MonitoringMode::Service24h => {
            selection.selected = enabled_ids(candidates).collect();
        }
        MonitoringMode::Smart => {
            let business_day = calendar.is_business_day(today);
            for monitor in candidates.iter().filter(|m| m.enabled) {
                if monitor.business_days_only && !business_day {
                    selection.skipped.push(monitor.id.clone());
                } else {
                    selection.selected.push(monitor.id.clone());
                }
            }
            if !selection.skipped.is_empty() {
                info!(
                    "{} is not a business day, skipping {:?}",
                    format_date(today),
                    selection.skipped
                );
            }
        }
    }

    selection
}

fn enabled_ids(candidates: &[MonitorConfig]) -> impl Iterator<Item = String> + '_ {
    candidates.iter().filter(|m| m.enabled).map(|m| m.id.clone())
}
