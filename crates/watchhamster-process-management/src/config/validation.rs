use super::*;
use anyhow::{anyhow, Result};
use chrono::NaiveDate;
use std::collections::HashSet;

const NOTIFICATION_ENDPOINTS: [&str; 3] = ["watchhamster", "news", "test"];

/// Validate the complete configuration
pub fn validate_config(config: &WatchHamsterConfig) -> Result<()> {
    validate_options(&config.watchhamster)?;
    validate_supervision(&config.supervision)?;
    validate_monitors(&config.monitors)?;

    if let Some(ref notifications) = config.notifications {
        validate_notifications(notifications)?;
    }

    if let Some(ref calendar) = config.calendar {
        validate_calendar(calendar)?;
    }

    if let Some(ref backup) = config.backup {
        validate_backup(backup)?;
    }

    Ok(())
}

fn validate_options(options: &WatchHamsterOptions) -> Result<()> {
    if options.health_check_interval.is_zero() {
        return Err(anyhow!("Health check interval must be greater than 0"));
    }

    if options.state_file.trim().is_empty() {
        return Err(anyhow!("State file path cannot be empty"));
    }

    match options.log_level.to_lowercase().as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(anyhow!(
            "Invalid log level: {}, must be one of: trace, debug, info, warn, error",
            options.log_level
        )),
    }
}

fn validate_supervision(supervision: &SupervisionConfig) -> Result<()> {
    if supervision.max_start_attempts == 0 {
        return Err(anyhow!("max_start_attempts must be at least 1"));
    }

    if supervision.startup_settle.is_zero() {
        return Err(anyhow!("startup_settle must be greater than 0"));
    }

    if supervision.stop_timeout.is_zero() {
        return Err(anyhow!("stop_timeout must be greater than 0"));
    }

    if supervision.error_threshold == 0 {
        return Err(anyhow!("error_threshold must be at least 1"));
    }

    Ok(())
}

/// Validate all monitor definitions
fn validate_monitors(monitors: &[MonitorConfig]) -> Result<()> {
    let mut ids = HashSet::new();
    for monitor in monitors {
        if !ids.insert(&monitor.id) {
            return Err(anyhow!("Duplicate monitor ID: {}", monitor.id));
        }

        validate_monitor(monitor)?;
    }

    Ok(())
}

fn validate_monitor(monitor: &MonitorConfig) -> Result<()> {
    validate_monitor_id(&monitor.id)?;

    if let Some(ref probe) = monitor.probe {
        validate_probe(&monitor.id, probe)?;
    }

    Ok(())
}

/// Monitor ids are used in file names and log lines
pub fn validate_monitor_id(id: &str) -> Result<()> {
    if id.is_empty() {
        return Err(anyhow!("Monitor ID cannot be empty"));
    }

    if id.len() > 64 {
        return Err(anyhow!("Monitor ID too long (max 64 characters): {}", id));
    }

    if !id.chars().all(|c| c.is_alphanumeric() || c == '-' || c == '_') {
        return Err(anyhow!(
            "Monitor ID can only contain alphanumeric characters, hyphens, and underscores: {}",
            id
        ));
    }

    Ok(())
}

fn validate_probe(id: &str, probe: &ProbeConfig) -> Result<()> {
    validate_url(&probe.endpoint)
        .map_err(|e| anyhow!("Monitor {}: invalid probe endpoint: {}", id, e))?;

    if probe.interval.is_zero() {
        return Err(anyhow!("Monitor {}: probe interval must be greater than 0", id));
    }

    if probe.timeout.is_zero() {
        return Err(anyhow!("Monitor {}: probe timeout must be greater than 0", id));
    }

    if probe.timeout >= probe.interval {
        return Err(anyhow!(
            "Monitor {}: probe timeout ({:?}) must be less than interval ({:?})",
            id,
            probe.timeout,
            probe.interval
        ));
    }

    if probe.expected_status.is_empty() {
        return Err(anyhow!("Monitor {}: expected_status cannot be empty", id));
    }

    if probe.failure_threshold == 0 {
        return Err(anyhow!("Monitor {}: probe failure_threshold must be at least 1", id));
    }

    Ok(())
}

fn validate_notifications(notifications: &NotificationConfig) -> Result<()> {
    if notifications.source.trim().is_empty() {
        return Err(anyhow!("Notification source cannot be empty"));
    }

    for (name, url) in &notifications.endpoints {
        if !NOTIFICATION_ENDPOINTS.contains(&name.as_str()) {
            return Err(anyhow!(
                "Unknown notification endpoint: {}, must be one of: {}",
                name,
                NOTIFICATION_ENDPOINTS.join(", ")
            ));
        }
        validate_url(url).map_err(|e| anyhow!("Notification endpoint {}: {}", name, e))?;
    }

    if notifications.request_timeout.is_zero() {
        return Err(anyhow!("Notification request_timeout must be greater than 0"));
    }

    Ok(())
}

fn validate_calendar(calendar: &CalendarConfig) -> Result<()> {
    for holiday in &calendar.holidays {
        let parsed = NaiveDate::parse_from_str(&holiday.date, "%Y%m%d")
            .or_else(|_| NaiveDate::parse_from_str(&holiday.date, "%Y-%m-%d"));
        if parsed.is_err() {
            return Err(anyhow!(
                "Invalid holiday date: {}, expected YYYYMMDD or YYYY-MM-DD",
                holiday.date
            ));
        }
    }

    Ok(())
}

fn validate_backup(backup: &BackupSectionConfig) -> Result<()> {
    if backup.root.trim().is_empty() {
        return Err(anyhow!("Backup root cannot be empty"));
    }

    if backup.max_backups == 0 {
        return Err(anyhow!("max_backups must be greater than 0"));
    }

    for file in &backup.tracked_files {
        if file.trim().is_empty() {
            return Err(anyhow!("Tracked backup file path cannot be empty"));
        }
    }

    Ok(())
}

fn validate_url(url: &str) -> Result<()> {
    if url.starts_with("http://") || url.starts_with("https://") {
        Ok(())
    } else {
        Err(anyhow!("URL must start with http:// or https://: {}", url))
    }
}
