//! Builds runtime components from the configuration sections.

use crate::error::{CoreError, CoreResult};
use tracing::{debug, info};
use watchhamster_backup::BackupConfig;
use watchhamster_business_day::{HolidayCalendar, HolidayEntry};
use watchhamster_notify::{Endpoint, Notifier, SenderConfig, WebhookSender};
use watchhamster_process_management::{
    probe_monitor, BackupSectionConfig, CalendarConfig, MonitorConfig, NotificationConfig,
    SharedFactory,
};

pub fn sender_config(section: &NotificationConfig) -> CoreResult<SenderConfig> {
    let mut config = SenderConfig {
        source: section.source.clone(),
        max_retries: section.max_retries,
        retry_base_delay: section.retry_base_delay,
        request_timeout: section.request_timeout,
        dedup_window: section.dedup_window,
        ..SenderConfig::default()
    };

    for (name, url) in &section.endpoints {
        let endpoint: Endpoint = name.parse()?;
        config = config.with_endpoint(endpoint, url.as_str());
    }
    Ok(config)
}

/// A disabled notifier when the section is missing, switched off or has no endpoints.
pub fn build_notifier(section: Option<&NotificationConfig>) -> CoreResult<Notifier> {
    let Some(section) = section.filter(|s| s.enabled) else {
        info!("Webhook notifications disabled");
        return Ok(Notifier::disabled());
    };
    if section.endpoints.is_empty() {
        info!("No webhook endpoints configured, notifications disabled");
        return Ok(Notifier::disabled());
    }

    let sender = WebhookSender::new(sender_config(section)?)?;
    info!(
        "Webhook notifications enabled for {} endpoint(s)",
        section.endpoints.len()
    );
    Ok(Notifier::new(sender))
}

/// The configured holiday table, or the built-in one when none is given.
pub fn build_calendar(section: Option<&CalendarConfig>) -> CoreResult<HolidayCalendar> {
    match section {
        Some(calendar) if !calendar.holidays.is_empty() => {
            let entries: Vec<HolidayEntry> = calendar
                .holidays
                .iter()
                .map(|h| HolidayEntry {
                    date: h.date.clone(),
                    name: h.name.clone(),
                })
                .collect();
            let calendar = HolidayCalendar::from_entries(&entries)?;
            debug!("Loaded {} configured holidays", calendar.len());
            Ok(calendar)
        }
        _ => Ok(HolidayCalendar::korea_2025()),
    }
}

pub fn backup_config(section: &BackupSectionConfig) -> BackupConfig {
    let mut config = BackupConfig::new(&section.root, &section.base_dir)
        .with_tracked_files(section.tracked_files.iter().cloned());
    config.max_backups = section.max_backups;
    config.auto_rollback_enabled = section.auto_rollback_enabled;
    config
}

/// Task backing a configured monitor: its probe, if any.
pub fn monitor_factory(monitor: &MonitorConfig) -> CoreResult<SharedFactory> {
    match &monitor.probe {
        Some(probe) => Ok(probe_monitor(probe.probe_monitor_config())),
        None => Err(CoreError::NoMonitorTask(monitor.id.clone())),
    }
}
