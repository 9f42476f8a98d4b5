//! Subcommand handlers.

use crate::BackupAction;
use anyhow::{anyhow, bail, Context, Result};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use watchhamster_backup::BackupManager;
use watchhamster_business_day::{
    parse_date, ComparisonEngine, HolidayCalendar, JsonDirectorySource,
};
use watchhamster_common::MonitoringMode;
use watchhamster_core::{setup, WatchHamsterCore};
use watchhamster_notify::{DeliveryStatus, NotifyEvent};
use watchhamster_process_management::WatchHamsterConfig;

pub(crate) fn load_config(path: &Path) -> Result<WatchHamsterConfig> {
    WatchHamsterConfig::load_from_file(path)
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub(crate) async fn run(
    config: WatchHamsterConfig,
    mode: Option<&str>,
    monitors: Vec<String>,
    run_duration: Option<u64>,
) -> Result<()> {
    let mode = match mode {
        Some(m) => m.parse::<MonitoringMode>().map_err(|e| anyhow!(e))?,
        None => config.watchhamster.mode,
    };
    info!(
        "Loaded configuration for {} monitors ({} enabled)",
        config.monitors.len(),
        config.enabled_monitors().len()
    );

    let mut core = WatchHamsterCore::new(config)?;
    core.initialize().await?;

    if let Err(e) = core.start_monitoring(mode, &monitors).await {
        error!("Failed to start monitoring: {}", e);
        if let Err(shutdown_err) = core.shutdown().await {
            warn!("Shutdown after failed start also failed: {}", shutdown_err);
        }
        return Err(anyhow!("Start failed: {}", e));
    }
    info!("Monitoring started in {} mode", mode);

    match run_duration {
        Some(secs) => {
            info!("Running for {} seconds (test mode)", secs);
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_secs(secs)) => {}
                _ = crate::shutdown_signal() => {}
            }
        }
        None => crate::shutdown_signal().await,
    }

    info!("Shutting down WatchHamster...");
    let status = core.get_system_status().await?;
    info!(
        "Final status: {} active, {} healthy, {} errors",
        status.active_monitors.len(),
        status.healthy_monitors,
        status.error_count
    );
    core.shutdown()
        .await
        .map_err(|e| anyhow!("Shutdown failed: {}", e))?;
    info!("WatchHamster shut down successfully");
    Ok(())
}

pub(crate) fn business_day(date: &str, config: Option<&Path>) -> Result<()> {
    let date = parse_date(date)?;
    let calendar = calendar_from(config)?;
    print_json(&calendar.business_day_info(date))
}

fn calendar_from(config: Option<&Path>) -> Result<HolidayCalendar> {
    match config {
        Some(path) => {
            let config = load_config(path)?;
            Ok(setup::build_calendar(config.calendar.as_ref())?)
        }
        None => Ok(HolidayCalendar::korea_2025()),
    }
}

pub(crate) async fn compare(
    data_dir: &Path,
    date: &str,
    output: Option<&Path>,
    range_days: u32,
    config: Option<&Path>,
) -> Result<()> {
    let date = parse_date(date)?;
    let loaded = config.map(load_config).transpose()?;
    let calendar = match &loaded {
        Some(config) => setup::build_calendar(config.calendar.as_ref())?,
        None => HolidayCalendar::korea_2025(),
    };

    let source = JsonDirectorySource::new(data_dir);
    let current = source
        .load_day(date)
        .await?
        .with_context(|| format!("No news data for {} in {}", date, data_dir.display()))?;

    let engine = ComparisonEngine::new(calendar, Arc::new(source));
    let report = engine.analyze(&current, range_days).await?;
    println!("{}", report.summary_text());

    if let Some(dir) = output {
        let path = report.write_json(dir).await?;
        println!("Report written to {}", path.display());
    }

    if let Some(config) = &loaded {
        let notifier = setup::build_notifier(config.notifications.as_ref())?;
        if notifier.is_enabled() {
            let event = NotifyEvent::comparison_summary(date.to_string(), report.summary_text());
            if let Err(e) = notifier.notify_and_wait(event).await {
                warn!("Failed to send comparison summary: {}", e);
            }
        }
    }
    Ok(())
}

pub(crate) fn backup(config: &Path, action: BackupAction) -> Result<()> {
    let config = load_config(config)?;
    let section = config
        .backup
        .as_ref()
        .ok_or_else(|| anyhow!("No backup section in configuration"))?;
    let mut manager = BackupManager::open(setup::backup_config(section))?;

    match action {
        BackupAction::Create { name, description } => {
            let backup_id = manager.create_backup(&name, &description)?;
            println!("{}", backup_id);
        }
        BackupAction::List => print_json(&manager.list_backups())?,
        BackupAction::Rollback { backup_id } => {
            print_json(&manager.rollback_to_backup(&backup_id)?)?;
        }
        BackupAction::AutoRollback { context } => {
            match manager.auto_rollback_on_error(&context)? {
                Some(backup_id) => println!("Rolled back to {}", backup_id),
                None => println!("No rollback performed"),
            }
        }
        BackupAction::Verify { backup_id } => {
            manager.verify_backup_integrity(&backup_id)?;
            println!("Backup {} verified", backup_id);
        }
        BackupAction::Status => print_json(&manager.status())?,
    }
    Ok(())
}

pub(crate) async fn notify_test(config: &Path, message: &str) -> Result<()> {
    let config = load_config(config)?;
    let notifier = setup::build_notifier(config.notifications.as_ref())?;
    if !notifier.is_enabled() {
        bail!("Notifications are not configured");
    }

    match notifier.notify_and_wait(NotifyEvent::test(message)).await? {
        DeliveryStatus::Delivered { attempts, status } => {
            println!("Delivered (HTTP {}, {} attempt(s))", status, attempts);
        }
        DeliveryStatus::Duplicate => println!("Skipped: identical message sent recently"),
    }
    Ok(())
}
