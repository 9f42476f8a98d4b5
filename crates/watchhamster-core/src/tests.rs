//! Unit tests for the orchestrator.

use super::*;
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use watchhamster_business_day::parse_date;
use watchhamster_common::{MonitoringMode, ProcessError};
use watchhamster_monitoring::HealthStatus;
use watchhamster_notify::{Endpoint, Notifier, SenderConfig, WebhookSender};
use watchhamster_process_management::{
    monitor_fn, MonitorContext, RecoveryOutcome, SharedFactory, WatchHamsterConfig,
};
use watchhamster_state_file::{SavedState, StateFile};
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

const MONITORS: &str = r#"
monitors:
  - id: kospi-close
    business_days_only: true
  - id: exchange-rate
  - id: newyork-market-watch
    enabled: false
"#;

fn test_config(dir: &Path, extra: &str) -> WatchHamsterConfig {
    let yaml = format!(
        r#"
watchhamster:
  state_file: "{}"
  health_check_interval: 1h
  auto_recover: false
supervision:
  restart_delay: 10ms
  startup_settle: 20ms
  stop_timeout: 500ms
  restart_pause: 5ms
{}"#,
        dir.join("state.json").display(),
        extra
    );
    WatchHamsterConfig::load_from_string(&yaml).unwrap()
}

fn idle_monitor() -> SharedFactory {
    monitor_fn(|_ctx| async {
        std::future::pending::<()>().await;
        anyhow::Ok(())
    })
}

fn failing_monitor() -> SharedFactory {
    monitor_fn(|_ctx| async { Err(anyhow::anyhow!("quote server unreachable")) })
}

/// Records `errors` errors on its first run only
fn erroring_monitor(errors: u32, calls: Arc<AtomicU32>) -> SharedFactory {
    monitor_fn(move |ctx: MonitorContext| {
        let call = calls.fetch_add(1, Ordering::SeqCst);
        async move {
            if call == 0 {
                for i in 0..errors {
                    ctx.record_error(format!("parse failure #{}", i + 1));
                }
            }
            std::future::pending::<()>().await;
            anyhow::Ok(())
        }
    })
}

/// Core with idle tasks behind every configured monitor
async fn initialized_core(dir: &Path) -> WatchHamsterCore {
    let mut core = WatchHamsterCore::new(test_config(dir, MONITORS)).unwrap();
    for id in ["kospi-close", "exchange-rate", "newyork-market-watch"] {
        core.register_monitor(id, idle_monitor());
    }
    core.initialize().await.unwrap();
    core
}

fn ids(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

fn wednesday() -> chrono::NaiveDate {
    parse_date("20250305").unwrap()
}

#[tokio::test]
async fn test_start_requires_initialize() {
    let dir = tempfile::tempdir().unwrap();
    let mut core = WatchHamsterCore::new(test_config(dir.path(), MONITORS)).unwrap();
    assert_eq!(core.status(), SystemStatus::Stopped);

    let err = core
        .start_monitoring(MonitoringMode::Integrated, &[])
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::NotInitialized));
}

#[tokio::test]
async fn test_initialize_restores_saved_counters() {
    let dir = tempfile::tempdir().unwrap();
    let mut saved = SavedState::new(MonitoringMode::Smart);
    saved.error_count = 7;
    saved.last_error = Some("webhook: timeout".to_string());
    StateFile::new(dir.path().join("state.json"))
        .save(&saved)
        .await
        .unwrap();

    let core = initialized_core(dir.path()).await;
    let status = core.get_system_status().await.unwrap();
    assert!(status.initialized);
    assert_eq!(status.status, SystemStatus::Stopped);
    assert_eq!(status.error_count, 7);
    assert_eq!(status.last_error.as_deref(), Some("webhook: timeout"));
}

#[tokio::test]
async fn test_initialize_fails_on_corrupt_state() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("state.json"), "{ not json").unwrap();

    let mut core = WatchHamsterCore::new(test_config(dir.path(), MONITORS)).unwrap();
    assert!(core.initialize().await.is_err());
    assert_eq!(core.status(), SystemStatus::Error);

    let status = core.get_system_status().await.unwrap();
    assert!(!status.initialized);
    assert_eq!(status.error_count, 1);
}

#[tokio::test]
async fn test_integrated_mode_runs_enabled_monitors() {
    let dir = tempfile::tempdir().unwrap();
    let mut core = initialized_core(dir.path()).await;

    core.start_monitoring_on(MonitoringMode::Integrated, &[], wednesday())
        .await
        .unwrap();

    let status = core.get_system_status().await.unwrap();
    assert!(status.is_running());
    assert_eq!(status.mode, Some(MonitoringMode::Integrated));
    assert!(status.start_time.is_some());
    assert_eq!(status.active_monitors, ids(&["exchange-rate", "kospi-close"]));
    assert_eq!(status.total_monitors, 2);
    assert_eq!(status.healthy_monitors, 2);

    let err = core
        .start_monitoring_on(MonitoringMode::Smart, &[], wednesday())
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::AlreadyRunning(MonitoringMode::Integrated)));

    // Saved after starting
    let saved = StateFile::new(dir.path().join("state.json"))
        .load()
        .await
        .unwrap()
        .unwrap();
    assert!(saved.watchhamster_running);
    assert_eq!(saved.mode, MonitoringMode::Integrated);
    assert_eq!(saved.individual_monitors.len(), 2);
    assert_eq!(
        saved.individual_monitors["kospi-close"].health,
        HealthStatus::Healthy
    );
}

#[tokio::test]
async fn test_individual_mode_runs_requested_monitors() {
    let dir = tempfile::tempdir().unwrap();
    let mut core = initialized_core(dir.path()).await;

    core.start_monitoring_on(
        MonitoringMode::Individual,
        &ids(&["newyork-market-watch", "gold-price"]),
        wednesday(),
    )
    .await
    .unwrap();

    let status = core.get_system_status().await.unwrap();
    assert_eq!(status.active_monitors, ids(&["newyork-market-watch"]));
}

#[tokio::test]
async fn test_individual_mode_without_known_monitors() {
    let dir = tempfile::tempdir().unwrap();
    let mut core = initialized_core(dir.path()).await;

    let err = core
        .start_monitoring_on(MonitoringMode::Individual, &ids(&["gold-price"]), wednesday())
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::NoMonitorsSelected(MonitoringMode::Individual)));
    assert_eq!(core.status(), SystemStatus::Stopped);
}

#[tokio::test]
async fn test_smart_mode_skips_business_day_monitors_on_holiday() {
    let dir = tempfile::tempdir().unwrap();
    let mut core = initialized_core(dir.path()).await;

    let new_year = parse_date("20250101").unwrap();
    core.start_monitoring_on(MonitoringMode::Smart, &[], new_year)
        .await
        .unwrap();

    let status = core.get_system_status().await.unwrap();
    assert_eq!(status.active_monitors, ids(&["exchange-rate"]));
}

#[tokio::test]
async fn test_service_24h_forces_auto_recovery() {
    let dir = tempfile::tempdir().unwrap();
    let extra = r#"
monitors:
  - id: exchange-rate
"#;
    let mut config = test_config(dir.path(), extra);
    config.watchhamster.health_check_interval = Duration::from_millis(50);
    let mut core = WatchHamsterCore::new(config).unwrap();
    let calls = Arc::new(AtomicU32::new(0));
    core.register_monitor("exchange-rate", erroring_monitor(5, calls.clone()));
    core.initialize().await.unwrap();

    core.start_monitoring_on(MonitoringMode::Service24h, &[], wednesday())
        .await
        .unwrap();

    // The health loop recovers the monitor although the config disables auto-recovery
    let recovered = tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            let info = core
                .manager()
                .get_process_info("exchange-rate")
                .await
                .unwrap();
            if info.restart_count >= 1 && info.error_count == 0 {
                return info;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
    assert_eq!(recovered.health, HealthStatus::Healthy);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_monitor_without_task_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let mut core = WatchHamsterCore::new(test_config(dir.path(), MONITORS)).unwrap();
    core.register_monitor("exchange-rate", idle_monitor());
    core.initialize().await.unwrap();

    let err = core
        .start_monitoring_on(MonitoringMode::Integrated, &[], wednesday())
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::NoMonitorTask(id) if id == "kospi-close"));
    assert_eq!(core.status(), SystemStatus::Stopped);
}

#[tokio::test]
async fn test_failed_start_sets_error_and_can_stop() {
    let dir = tempfile::tempdir().unwrap();
    let mut core = initialized_core(dir.path()).await;
    core.register_monitor("kospi-close", failing_monitor());

    let err = core
        .start_monitoring_on(MonitoringMode::Integrated, &[], wednesday())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        CoreError::Process(ProcessError::RestartFailed { .. })
    ));
    assert_eq!(core.status(), SystemStatus::Error);

    let status = core.get_system_status().await.unwrap();
    assert_eq!(status.error_count, 1);
    assert!(status.last_error.unwrap().contains("kospi-close"));

    core.stop_monitoring().await.unwrap();
    let status = core.get_system_status().await.unwrap();
    assert_eq!(status.status, SystemStatus::Stopped);
    assert_eq!(status.total_monitors, 0);
}

#[tokio::test]
async fn test_stop_monitoring_discards_monitors() {
    let dir = tempfile::tempdir().unwrap();
    let mut core = initialized_core(dir.path()).await;

    assert!(matches!(
        core.stop_monitoring().await,
        Err(CoreError::NotRunning)
    ));

    core.start_monitoring_on(MonitoringMode::Integrated, &[], wednesday())
        .await
        .unwrap();
    core.stop_monitoring().await.unwrap();

    let status = core.get_system_status().await.unwrap();
    assert_eq!(status.status, SystemStatus::Stopped);
    assert_eq!(status.mode, None);
    assert_eq!(status.total_monitors, 0);

    let saved = StateFile::new(dir.path().join("state.json"))
        .load()
        .await
        .unwrap()
        .unwrap();
    assert!(!saved.watchhamster_running);
    assert!(saved.individual_monitors.is_empty());

    // Can start again after stopping
    core.start_monitoring_on(MonitoringMode::Integrated, &[], wednesday())
        .await
        .unwrap();
    assert_eq!(core.status(), SystemStatus::Running);
}

#[tokio::test]
async fn test_handle_error_recovers_unhealthy_monitors() {
    let dir = tempfile::tempdir().unwrap();
    let mut core = initialized_core(dir.path()).await;
    let calls = Arc::new(AtomicU32::new(0));
    core.register_monitor("kospi-close", erroring_monitor(5, calls.clone()));

    core.start_monitoring_on(MonitoringMode::Integrated, &[], wednesday())
        .await
        .unwrap();

    let outcomes = core
        .handle_error("webhook", "delivery failed")
        .await
        .unwrap();
    assert_eq!(outcomes.len(), 1);
    assert_eq!(outcomes[0].0, "kospi-close");
    assert_eq!(outcomes[0].1, RecoveryOutcome::Recovered);
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    let status = core.get_system_status().await.unwrap();
    assert_eq!(status.error_count, 1);
    assert_eq!(status.last_error.as_deref(), Some("webhook: delivery failed"));
    assert_eq!(status.healthy_monitors, 2);

    // Nothing left to recover
    let outcomes = core.handle_error("", "late failure").await.unwrap();
    assert!(outcomes.is_empty());
    let status = core.get_system_status().await.unwrap();
    assert_eq!(status.error_count, 2);
    assert_eq!(status.last_error.as_deref(), Some("late failure"));
}

#[tokio::test]
async fn test_shutdown_saves_state_and_is_final() {
    let dir = tempfile::tempdir().unwrap();
    let mut core = initialized_core(dir.path()).await;
    core.start_monitoring_on(MonitoringMode::Integrated, &[], wednesday())
        .await
        .unwrap();
    core.handle_error("probe", "timeout").await.unwrap();

    core.shutdown().await.unwrap();
    assert_eq!(core.status(), SystemStatus::Stopped);

    let saved = StateFile::new(dir.path().join("state.json"))
        .load()
        .await
        .unwrap()
        .unwrap();
    assert!(!saved.watchhamster_running);
    assert_eq!(saved.error_count, 1);

    assert!(matches!(core.initialize().await, Err(CoreError::ShutDown)));

    // Idempotent
    core.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_events_reach_webhook() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let config = SenderConfig::default().with_endpoint(Endpoint::WatchHamster, server.uri());
    let notifier = Notifier::new(WebhookSender::new(config).unwrap());
    let mut core =
        WatchHamsterCore::with_notifier(test_config(dir.path(), ""), notifier).unwrap();
    core.register_monitor("exchange-rate", idle_monitor());
    core.initialize().await.unwrap();

    core.start_monitoring_on(MonitoringMode::Integrated, &[], wednesday())
        .await
        .unwrap();

    // Monitor started and system status
    let mut received = 0;
    for _ in 0..100 {
        received = server.received_requests().await.unwrap().len();
        if received >= 2 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(received >= 2, "only {} webhook posts", received);

    let requests = server.received_requests().await.unwrap();
    let texts: Vec<String> = requests
        .iter()
        .map(|r| {
            let body: serde_json::Value = serde_json::from_slice(&r.body).unwrap();
            body["text"].as_str().unwrap().to_string()
        })
        .collect();
    assert!(texts.iter().any(|t| t.contains("exchange-rate")));
    assert!(texts.iter().any(|t| t.contains("integrated")));
}
