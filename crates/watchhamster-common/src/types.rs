//! Core identifier types shared across WatchHamster crates.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Monitor identifier - uniquely identifies a supervised monitor task.
///
/// # Example
/// ```
/// use watchhamster_common::MonitorId;
///
/// let id = MonitorId::from("kospi-close");
/// assert_eq!(id.as_str(), "kospi-close");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MonitorId(String);

impl MonitorId {
    /// Creates a new MonitorId from a string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the monitor ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for MonitorId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for MonitorId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl AsRef<str> for MonitorId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MonitorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How the orchestrator selects which monitors to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MonitoringMode {
    /// Only the monitors named by the caller
    Individual,
    /// Every enabled monitor
    #[default]
    Integrated,
    /// Every enabled monitor, business-day-only monitors skipped on
    /// weekends and holidays
    Smart,
    /// Every enabled monitor with health polling and auto-recovery forced on
    #[serde(rename = "service_24h")]
    Service24h,
}

impl MonitoringMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            MonitoringMode::Individual => "individual",
            MonitoringMode::Integrated => "integrated",
            MonitoringMode::Smart => "smart",
            MonitoringMode::Service24h => "service_24h",
        }
    }
}

impl fmt::Display for MonitoringMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MonitoringMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "individual" => Ok(MonitoringMode::Individual),
            "integrated" => Ok(MonitoringMode::Integrated),
            "smart" => Ok(MonitoringMode::Smart),
            "service_24h" | "service24h" => Ok(MonitoringMode::Service24h),
            other => Err(format!(
                "unknown monitoring mode '{}', expected individual, integrated, smart or service_24h",
                other
            )),
        }
    }
}
