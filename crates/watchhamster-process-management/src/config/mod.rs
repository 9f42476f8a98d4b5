use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use watchhamster_common::MonitoringMode;
use watchhamster_monitoring::{HttpMethod, HttpProbeConfig, ProbeMonitorConfig};

use crate::manager::ManagerOptions;

pub mod validation;

/// Top-level configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WatchHamsterConfig {
    #[serde(default)]
    pub watchhamster: WatchHamsterOptions,
    #[serde(default)]
    pub supervision: SupervisionConfig,
    #[serde(default)]
    pub monitors: Vec<MonitorConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notifications: Option<NotificationConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub calendar: Option<CalendarConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backup: Option<BackupSectionConfig>,
}

/// Orchestrator options
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchHamsterOptions {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_state_file")]
    pub state_file: String,
    #[serde(default = "default_health_check_interval", with = "duration_serde")]
    pub health_check_interval: Duration,
    #[serde(default = "default_true")]
    pub auto_recover: bool,
    #[serde(default)]
    pub mode: MonitoringMode,
}

impl Default for WatchHamsterOptions {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            state_file: default_state_file(),
            health_check_interval: default_health_check_interval(),
            auto_recover: true,
            mode: MonitoringMode::default(),
        }
    }
}

/// Start/stop/restart timings and health threshold
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SupervisionConfig {
    #[serde(default = "default_max_start_attempts")]
    pub max_start_attempts: u32,
    /// Base of the linear backoff between start attempts
    #[serde(default = "default_restart_delay", with = "duration_serde")]
    pub restart_delay: Duration,
    /// How long a freshly spawned task must survive to count as started
    #[serde(default = "default_startup_settle", with = "duration_serde")]
    pub startup_settle: Duration,
    #[serde(default = "default_stop_timeout", with = "duration_serde")]
    pub stop_timeout: Duration,
    /// Pause between stop and start during a restart
    #[serde(default = "default_restart_pause", with = "duration_serde")]
    pub restart_pause: Duration,
    #[serde(default = "default_error_threshold")]
    pub error_threshold: u32,
}

impl Default for SupervisionConfig {
    fn default() -> Self {
        Self {
            max_start_attempts: default_max_start_attempts(),
            restart_delay: default_restart_delay(),
            startup_settle: default_startup_settle(),
            stop_timeout: default_stop_timeout(),
            restart_pause: default_restart_pause(),
            error_threshold: default_error_threshold(),
        }
    }
}

/// One supervised monitor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    pub id: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Skipped by smart mode on weekends and holidays
    #[serde(default)]
    pub business_days_only: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub probe: Option<ProbeConfig>,
}

/// HTTP probe backing a monitor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeConfig {
    pub endpoint: String,
    #[serde(default = "default_probe_method")]
    pub method: HttpMethod,
    #[serde(default = "default_probe_interval", with = "duration_serde")]
    pub interval: Duration,
    #[serde(default = "default_probe_timeout", with = "duration_serde")]
    pub timeout: Duration,
    #[serde(default = "default_expected_status")]
    pub expected_status: Vec<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_body: Option<String>,
    #[serde(default = "default_probe_failure_threshold")]
    pub failure_threshold: u32,
}

impl ProbeConfig {
    pub fn probe_monitor_config(&self) -> ProbeMonitorConfig {
        let mut probe = HttpProbeConfig::new(&self.endpoint)
            .with_method(self.method)
            .with_timeout(self.timeout)
            .with_expected_status(self.expected_status.clone());
        if let Some(ref body) = self.expected_body {
            probe = probe.with_expected_body(body);
        }

        ProbeMonitorConfig {
            probe,
            interval: self.interval,
            failure_threshold: self.failure_threshold,
        }
    }
}

/// Webhook notification settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_source")]
    pub source: String,
    /// Endpoint name (`watchhamster`, `news`, `test`) → webhook URL
    #[serde(default)]
    pub endpoints: BTreeMap<String, String>,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_base_delay", with = "duration_serde")]
    pub retry_base_delay: Duration,
    #[serde(default = "default_request_timeout", with = "duration_serde")]
    pub request_timeout: Duration,
    #[serde(default = "default_dedup_window", with = "duration_serde")]
    pub dedup_window: Duration,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            source: default_source(),
            endpoints: BTreeMap::new(),
            max_retries: default_max_retries(),
            retry_base_delay: default_retry_base_delay(),
            request_timeout: default_request_timeout(),
            dedup_window: default_dedup_window(),
        }
    }
}

/// Holiday table override
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CalendarConfig {
    #[serde(default)]
    pub holidays: Vec<HolidayConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HolidayConfig {
    /// `YYYYMMDD` or `YYYY-MM-DD`
    pub date: String,
    #[serde(default)]
    pub name: String,
}

/// Webhook-file backup settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupSectionConfig {
    #[serde(default = "default_backup_root")]
    pub root: String,
    /// Directory the tracked file paths are relative to
    #[serde(default = "default_base_dir")]
    pub base_dir: String,
    #[serde(default)]
    pub tracked_files: Vec<String>,
    #[serde(default = "default_max_backups")]
    pub max_backups: usize,
    #[serde(default = "default_true")]
    pub auto_rollback_enabled: bool,
}

impl Default for BackupSectionConfig {
    fn default() -> Self {
        Self {
            root: default_backup_root(),
            base_dir: default_base_dir(),
            tracked_files: Vec::new(),
            max_backups: default_max_backups(),
            auto_rollback_enabled: true,
        }
    }
}

impl WatchHamsterConfig {
    /// Load configuration from a YAML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        Self::load_from_string(&content)
    }

    /// Load configuration from a YAML string
    pub fn load_from_string(content: &str) -> Result<Self> {
        let config: WatchHamsterConfig =
            serde_yaml::from_str(content).context("Failed to parse YAML configuration")?;

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        validation::validate_config(self)
    }

    /// Get enabled monitors only
    pub fn enabled_monitors(&self) -> Vec<&MonitorConfig> {
        self.monitors.iter().filter(|m| m.enabled).collect()
    }

    pub fn monitor(&self, id: &str) -> Option<&MonitorConfig> {
        self.monitors.iter().find(|m| m.id == id)
    }

    /// Options for the supervision actor
    pub fn manager_options(&self) -> ManagerOptions {
        ManagerOptions {
            supervision: self.supervision.clone(),
            health_check_interval: self.watchhamster.health_check_interval,
            auto_recover: self.watchhamster.auto_recover,
        }
    }
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_state_file() -> String {
    "state/watchhamster_state.json".to_string()
}

fn default_health_check_interval() -> Duration {
    Duration::from_secs(5)
}

fn default_true() -> bool {
    true
}

fn default_max_start_attempts() -> u32 {
    3
}

fn default_restart_delay() -> Duration {
    Duration::from_secs(2)
}

fn default_startup_settle() -> Duration {
    Duration::from_millis(500)
}

fn default_stop_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_restart_pause() -> Duration {
    Duration::from_secs(1)
}

fn default_error_threshold() -> u32 {
    5
}

fn default_probe_method() -> HttpMethod {
    HttpMethod::Get
}

fn default_probe_interval() -> Duration {
    Duration::from_secs(60)
}

fn default_probe_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_expected_status() -> Vec<u16> {
    vec![200]
}

fn default_probe_failure_threshold() -> u32 {
    3
}

fn default_source() -> String {
    "watchhamster".to_string()
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_base_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_dedup_window() -> Duration {
    Duration::from_secs(3600)
}

fn default_backup_root() -> String {
    "webhook_backup".to_string()
}

fn default_base_dir() -> String {
    ".".to_string()
}

fn default_max_backups() -> usize {
    10
}

// Custom serialization for Duration
pub mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let millis = duration.as_millis();
        if millis % 1000 != 0 {
            serializer.serialize_str(&format!("{}ms", millis))
        } else {
            serializer.serialize_str(&format!("{}s", duration.as_secs()))
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        parse_duration(&s).map_err(serde::de::Error::custom)
    }

    pub fn parse_duration(s: &str) -> Result<Duration, String> {
        let s = s.trim();
        let invalid = || format!("Invalid duration: {}", s);

        // "ms" first since it also ends with 's'
        if let Some(num) = s.strip_suffix("ms") {
            let millis: u64 = num.trim().parse().map_err(|_| invalid())?;
            Ok(Duration::from_millis(millis))
        } else if let Some(num) = s.strip_suffix('s') {
            let secs: u64 = num.trim().parse().map_err(|_| invalid())?;
            Ok(Duration::from_secs(secs))
        } else if let Some(num) = s.strip_suffix('m') {
            let mins: u64 = num.trim().parse().map_err(|_| invalid())?;
            Ok(Duration::from_secs(mins * 60))
        } else if let Some(num) = s.strip_suffix('h') {
            let hours: u64 = num.trim().parse().map_err(|_| invalid())?;
            Ok(Duration::from_secs(hours * 3600))
        } else {
            Err(format!("Duration must end with 'ms', 's', 'm' or 'h': {}", s))
        }
    }
}
