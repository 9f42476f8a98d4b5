//! Unit tests for the process manager module.

use super::ops::{Job, OpRunner};
use super::types::OpKind;
use super::*;
use crate::config::SupervisionConfig;
use crate::monitors::{monitor_fn, ErrorLedger, MonitorContext, SharedFactory};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::time::{Duration, Instant};
use watchhamster_common::ProcessError;
use watchhamster_monitoring::HealthStatus;
use watchhamster_process_state::ProcessStatus;

fn fast_options() -> ManagerOptions {
    ManagerOptions {
        supervision: SupervisionConfig {
            max_start_attempts: 3,
            restart_delay: Duration::from_millis(10),
            startup_settle: Duration::from_millis(20),
            stop_timeout: Duration::from_millis(500),
            restart_pause: Duration::from_millis(5),
            error_threshold: 5,
        },
        health_check_interval: Duration::from_secs(3600),
        auto_recover: false,
    }
}

/// Monitor that runs until cancelled
fn idle_monitor() -> SharedFactory {
    monitor_fn(|_ctx| async {
        std::future::pending::<()>().await;
        anyhow::Ok(())
    })
}

/// Monitor that records `errors` errors on its first run, then idles.
/// Later runs record nothing. Counts invocations in `calls`.
fn erroring_monitor(errors: u32, calls: Arc<AtomicU32>) -> SharedFactory {
    monitor_fn(move |ctx: MonitorContext| {
        let call = calls.fetch_add(1, Ordering::SeqCst);
        async move {
            if call == 0 {
                for i in 0..errors {
                    ctx.record_error(format!("quote feed timeout #{}", i + 1));
                }
            }
            std::future::pending::<()>().await;
            anyhow::Ok(())
        }
    })
}

/// Monitor failing its first `failures` runs
fn flaky_monitor(failures: u32, calls: Arc<AtomicU32>) -> SharedFactory {
    monitor_fn(move |_ctx| {
        let call = calls.fetch_add(1, Ordering::SeqCst);
        async move {
            if call < failures {
                return Err(anyhow::anyhow!("connection refused (run {})", call + 1));
            }
            std::future::pending::<()>().await;
            anyhow::Ok(())
        }
    })
}

/// Poll `get_process_info` until `predicate` holds or `timeout` expires.
async fn wait_for_info(
    manager: &ProcessManager,
    id: &str,
    predicate: impl Fn(&ProcessInfo) -> bool,
    timeout: Duration,
) -> ProcessInfo {
    let poll_interval = Duration::from_millis(2);
    let result = tokio::time::timeout(timeout, async {
        loop {
            if let Ok(info) = manager.get_process_info(id).await {
                if predicate(&info) {
                    return info;
                }
            }
            tokio::time::sleep(poll_interval).await;
        }
    })
    .await;

    match result {
        Ok(info) => info,
        Err(_) => panic!(
            "wait_for_info timed out after {:?}. Final info: {:?}",
            timeout,
            manager.get_process_info(id).await
        ),
    }
}

#[tokio::test]
async fn test_start_sets_running_and_healthy() {
    let manager = ProcessManager::new(fast_options());
    let mut events = manager.subscribe();

    manager.start("kospi-close", idle_monitor()).await.unwrap();

    let info = manager.get_process_info("kospi-close").await.unwrap();
    assert_eq!(info.status, ProcessStatus::Running);
    assert_eq!(info.health, HealthStatus::Healthy);
    assert_eq!(info.restart_count, 0);
    assert_eq!(info.error_count, 0);
    assert!(info.start_time.is_some());
    assert!(info.busy_with.is_none());

    let mut started = None;
    while let Ok(event) = events.try_recv() {
        if let ProcessEvent::Started { id, restart_count } = event {
            started = Some((id, restart_count));
        }
    }
    assert_eq!(started, Some(("kospi-close".to_string(), 0)));
}

#[tokio::test]
async fn test_start_gives_up_after_max_attempts() {
    let manager = ProcessManager::new(fast_options());
    let calls = Arc::new(AtomicU32::new(0));

    let err = manager
        .start("exchange-rate", flaky_monitor(u32::MAX, calls.clone()))
        .await
        .unwrap_err();

    match err {
        ProcessError::RestartFailed {
            attempt,
            max_attempts,
            ref reason,
            ..
        } => {
            assert_eq!(attempt, 3);
            assert_eq!(max_attempts, 3);
            assert!(reason.contains("connection refused"));
        }
        other => panic!("unexpected error {:?}", other),
    }
    assert_eq!(calls.load(Ordering::SeqCst), 3);

    let info = manager.get_process_info("exchange-rate").await.unwrap();
    assert_eq!(info.status, ProcessStatus::Error);
    assert_eq!(info.health, HealthStatus::Unhealthy);
    assert_eq!(info.error_count, 3);
    assert!(info.last_error.unwrap().contains("run 3"));
}

#[tokio::test]
async fn test_start_retries_with_linear_backoff() {
    let mut options = fast_options();
    options.supervision.restart_delay = Duration::from_millis(40);
    let manager = ProcessManager::new(options);
    let calls = Arc::new(AtomicU32::new(0));

    let started = Instant::now();
    manager
        .start("newyork-market", flaky_monitor(2, calls.clone()))
        .await
        .unwrap();
    let elapsed = started.elapsed();

    // 3 settles of 20ms plus delays of 40ms and 80ms
    assert!(elapsed >= Duration::from_millis(180), "elapsed {:?}", elapsed);
    assert_eq!(calls.load(Ordering::SeqCst), 3);

    let info = manager.get_process_info("newyork-market").await.unwrap();
    assert_eq!(info.status, ProcessStatus::Running);
    assert_eq!(info.health, HealthStatus::Healthy);
    assert_eq!(info.restart_count, 2);
    assert_eq!(info.error_count, 2);
}

#[tokio::test]
async fn test_start_rejected_while_running() {
    let manager = ProcessManager::new(fast_options());
    manager.start("kospi-close", idle_monitor()).await.unwrap();

    let err = manager
        .start("kospi-close", idle_monitor())
        .await
        .unwrap_err();
    assert!(matches!(err, ProcessError::AlreadyRunning { .. }));
}

#[tokio::test]
async fn test_check_health_thresholds() {
    let manager = ProcessManager::new(fast_options());

    for (id, errors) in [("clean", 0), ("noisy", 4), ("failing", 5)] {
        manager
            .start(id, erroring_monitor(errors, Arc::new(AtomicU32::new(0))))
            .await
            .unwrap();
    }

    let clean = manager.check_health("clean").await.unwrap();
    assert_eq!(clean.health, HealthStatus::Healthy);

    let noisy = manager.check_health("noisy").await.unwrap();
    assert_eq!(noisy.health, HealthStatus::Degraded);
    assert_eq!(noisy.error_count, 4);

    let failing = manager.check_health("failing").await.unwrap();
    assert_eq!(failing.health, HealthStatus::Unhealthy);
    assert_eq!(failing.error_count, 5);
    assert_eq!(failing.last_error.as_deref(), Some("quote feed timeout #5"));

    let info = manager.get_process_info("failing").await.unwrap();
    assert_eq!(info.health, HealthStatus::Unhealthy);
    assert!(info.last_check.is_some());

    let all = manager.check_all_health().await.unwrap();
    let ids: Vec<&str> = all.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["clean", "failing", "noisy"]);
}

#[tokio::test]
async fn test_check_health_unknown_monitor() {
    let manager = ProcessManager::new(fast_options());
    let err = manager.check_health("missing").await.unwrap_err();
    assert!(matches!(err, ProcessError::NotFound { .. }));
}

#[tokio::test]
async fn test_check_health_sees_task_exit() {
    let manager = ProcessManager::new(fast_options());

    let crashes = monitor_fn(|_ctx| async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        Err::<(), _>(anyhow::anyhow!("parser panicked on empty body"))
    });
    manager.start("crashes", crashes).await.unwrap();

    let finishes = monitor_fn(|_ctx| async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        anyhow::Ok(())
    });
    manager.start("finishes", finishes).await.unwrap();

    tokio::time::sleep(Duration::from_millis(100)).await;

    let crashed = manager.check_health("crashes").await.unwrap();
    assert_eq!(crashed.health, HealthStatus::Unhealthy);
    assert_eq!(crashed.error_count, 1);
    assert_eq!(
        crashed.last_error.as_deref(),
        Some("parser panicked on empty body")
    );

    let finished = manager.check_health("finishes").await.unwrap();
    assert_eq!(finished.health, HealthStatus::Degraded);
    assert_eq!(finished.error_count, 0);
}

#[tokio::test]
async fn test_auto_recover_not_needed_when_healthy() {
    let manager = ProcessManager::new(fast_options());
    manager.start("kospi-close", idle_monitor()).await.unwrap();

    let outcome = manager.auto_recover("kospi-close").await.unwrap();
    assert_eq!(outcome, RecoveryOutcome::NotNeeded);

    let info = manager.get_process_info("kospi-close").await.unwrap();
    assert_eq!(info.restart_count, 0);
}

#[tokio::test]
async fn test_auto_recover_restarts_and_resets_errors() {
    let manager = ProcessManager::new(fast_options());
    let calls = Arc::new(AtomicU32::new(0));
    manager
        .start("exchange-rate", erroring_monitor(5, calls.clone()))
        .await
        .unwrap();
    let mut events = manager.subscribe();

    let outcome = manager.auto_recover("exchange-rate").await.unwrap();
    assert_eq!(outcome, RecoveryOutcome::Recovered);
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    let info = manager.get_process_info("exchange-rate").await.unwrap();
    assert_eq!(info.status, ProcessStatus::Running);
    assert_eq!(info.health, HealthStatus::Healthy);
    assert_eq!(info.error_count, 0);
    assert_eq!(info.restart_count, 1);

    let mut saw_recovered = false;
    while let Ok(event) = events.try_recv() {
        if matches!(event, ProcessEvent::Recovered { ref id } if id == "exchange-rate") {
            saw_recovered = true;
        }
    }
    assert!(saw_recovered);

    let health = manager.check_health("exchange-rate").await.unwrap();
    assert_eq!(health.health, HealthStatus::Healthy);
}

#[tokio::test]
async fn test_auto_recover_reports_failure() {
    let manager = ProcessManager::new(fast_options());
    let calls = Arc::new(AtomicU32::new(0));

    // First run survives the settle period and crashes later; every rerun fails at once
    let factory = {
        let calls = calls.clone();
        monitor_fn(move |_ctx| {
            let call = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if call == 0 {
                    tokio::time::sleep(Duration::from_millis(40)).await;
                }
                Err::<(), _>(anyhow::anyhow!("upstream gone"))
            }
        })
    };
    manager.start("news-feed", factory).await.unwrap();
    tokio::time::sleep(Duration::from_millis(80)).await;

    let outcome = manager.auto_recover("news-feed").await.unwrap();
    match outcome {
        RecoveryOutcome::Failed(reason) => assert!(reason.contains("upstream gone")),
        other => panic!("unexpected outcome {:?}", other),
    }
    // One initial run plus three recovery attempts
    assert_eq!(calls.load(Ordering::SeqCst), 4);

    let info = manager.get_process_info("news-feed").await.unwrap();
    assert_eq!(info.status, ProcessStatus::Error);
    assert_eq!(info.health, HealthStatus::Unhealthy);
}

#[tokio::test]
async fn test_stop_discards_monitor() {
    let manager = ProcessManager::new(fast_options());
    let mut events = manager.subscribe();
    manager.start("kospi-close", idle_monitor()).await.unwrap();

    manager.stop("kospi-close").await.unwrap();

    let err = manager.get_process_info("kospi-close").await.unwrap_err();
    assert!(matches!(err, ProcessError::NotFound { .. }));
    assert!(manager.get_all_process_info().await.unwrap().is_empty());

    let mut saw_stopped = false;
    while let Ok(event) = events.try_recv() {
        if matches!(event, ProcessEvent::Stopped { .. }) {
            saw_stopped = true;
        }
    }
    assert!(saw_stopped);

    let err = manager.stop("kospi-close").await.unwrap_err();
    assert!(matches!(err, ProcessError::NotFound { .. }));
}

#[tokio::test]
async fn test_stop_failed_monitor_discards_it() {
    let manager = ProcessManager::new(fast_options());
    let calls = Arc::new(AtomicU32::new(0));
    let _ = manager
        .start("exchange-rate", flaky_monitor(u32::MAX, calls))
        .await;

    manager.stop("exchange-rate").await.unwrap();
    assert!(manager.get_process_info("exchange-rate").await.is_err());
}

#[tokio::test]
async fn test_restart_keeps_record() {
    let manager = ProcessManager::new(fast_options());
    let calls = Arc::new(AtomicU32::new(0));
    manager
        .start("kospi-close", erroring_monitor(2, calls.clone()))
        .await
        .unwrap();

    manager.restart("kospi-close").await.unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 2);
    let info = manager.get_process_info("kospi-close").await.unwrap();
    assert_eq!(info.status, ProcessStatus::Running);
    assert_eq!(info.restart_count, 1);
    assert_eq!(info.error_count, 0);

    let statistics = info.statistics.unwrap();
    assert!(statistics.total_transitions >= 6);
}

#[tokio::test]
async fn test_restart_unknown_monitor() {
    let manager = ProcessManager::new(fast_options());
    let err = manager.restart("missing").await.unwrap_err();
    assert!(matches!(err, ProcessError::NotFound { .. }));
}

#[tokio::test]
async fn test_queued_stop_runs_after_start() {
    let mut options = fast_options();
    options.supervision.startup_settle = Duration::from_millis(60);
    let manager = ProcessManager::new(options);

    let starter = manager.clone();
    let start = tokio::spawn(async move { starter.start("kospi-close", idle_monitor()).await });

    wait_for_info(
        &manager,
        "kospi-close",
        |info| info.busy_with.as_deref() == Some("start"),
        Duration::from_secs(2),
    )
    .await;

    manager.stop("kospi-close").await.unwrap();
    start.await.unwrap().unwrap();

    assert!(manager.get_process_info("kospi-close").await.is_err());
}

#[tokio::test]
async fn test_rejected_start_keeps_original_factory() {
    let mut options = fast_options();
    options.supervision.startup_settle = Duration::from_millis(60);
    let manager = ProcessManager::new(options);

    let original_calls = Arc::new(AtomicU32::new(0));
    let rejected_calls = Arc::new(AtomicU32::new(0));

    let starter = manager.clone();
    let original = erroring_monitor(0, original_calls.clone());
    let start = tokio::spawn(async move { starter.start("kospi-close", original).await });

    wait_for_info(
        &manager,
        "kospi-close",
        |info| info.busy_with.as_deref() == Some("start"),
        Duration::from_secs(2),
    )
    .await;

    // Queued behind the in-flight start, then refused
    let err = manager
        .start("kospi-close", erroring_monitor(0, rejected_calls.clone()))
        .await
        .unwrap_err();
    assert!(matches!(err, ProcessError::AlreadyRunning { .. }));
    start.await.unwrap().unwrap();

    manager.restart("kospi-close").await.unwrap();

    assert_eq!(original_calls.load(Ordering::SeqCst), 2);
    assert_eq!(rejected_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_start_after_failed_start_uses_new_factory() {
    let manager = ProcessManager::new(fast_options());
    let failing_calls = Arc::new(AtomicU32::new(0));
    let err = manager
        .start("kospi-close", flaky_monitor(u32::MAX, failing_calls.clone()))
        .await
        .unwrap_err();
    assert!(matches!(err, ProcessError::RestartFailed { .. }));

    let replacement_calls = Arc::new(AtomicU32::new(0));
    manager
        .start("kospi-close", erroring_monitor(0, replacement_calls.clone()))
        .await
        .unwrap();
    manager.restart("kospi-close").await.unwrap();

    assert_eq!(failing_calls.load(Ordering::SeqCst), 3);
    assert_eq!(replacement_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_check_health_while_busy_returns_snapshot() {
    let mut options = fast_options();
    options.supervision.startup_settle = Duration::from_millis(80);
    let manager = ProcessManager::new(options);

    let starter = manager.clone();
    let start = tokio::spawn(async move { starter.start("kospi-close", idle_monitor()).await });

    let info = wait_for_info(
        &manager,
        "kospi-close",
        |info| info.busy_with.is_some(),
        Duration::from_secs(2),
    )
    .await;
    assert_eq!(info.status, ProcessStatus::Starting);

    let snapshot = manager.check_health("kospi-close").await.unwrap();
    assert_eq!(snapshot.health, HealthStatus::Unknown);
    assert_eq!(snapshot.status, ProcessStatus::Starting);

    start.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_shutdown_stops_everything() {
    let manager = ProcessManager::new(fast_options());
    manager.start("kospi-close", idle_monitor()).await.unwrap();
    manager.start("exchange-rate", idle_monitor()).await.unwrap();

    manager.shutdown().await.unwrap();
    assert_eq!(manager.get_manager_state().await, ProcessManagerState::Stopped);

    for info in manager.get_all_process_info().await.unwrap() {
        assert_eq!(info.status, ProcessStatus::Stopped);
        assert_eq!(info.health, HealthStatus::Unknown);
    }

    let err = manager.start("news-feed", idle_monitor()).await.unwrap_err();
    assert!(matches!(err, ProcessError::OperationNotAllowed { .. }));

    let err = manager.restart("kospi-close").await.unwrap_err();
    assert!(matches!(err, ProcessError::OperationNotAllowed { .. }));

    // Idempotent
    manager.shutdown().await.unwrap();
    manager.stop("kospi-close").await.unwrap();
}

#[tokio::test]
async fn test_shutdown_without_monitors() {
    let manager = ProcessManager::new(fast_options());
    assert_eq!(manager.get_manager_state().await, ProcessManagerState::Running);
    manager.shutdown().await.unwrap();
    assert_eq!(manager.get_manager_state().await, ProcessManagerState::Stopped);
}

#[tokio::test]
async fn test_health_poll_recovers_unhealthy_monitor() {
    let mut options = fast_options();
    options.health_check_interval = Duration::from_millis(30);
    options.auto_recover = true;
    let manager = ProcessManager::new(options);
    let mut events = manager.subscribe();

    let calls = Arc::new(AtomicU32::new(0));
    manager
        .start("exchange-rate", erroring_monitor(6, calls.clone()))
        .await
        .unwrap();

    let info = wait_for_info(
        &manager,
        "exchange-rate",
        |info| info.restart_count == 1 && info.health == HealthStatus::Healthy,
        Duration::from_secs(3),
    )
    .await;
    assert_eq!(info.error_count, 0);
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    let mut saw_report = false;
    let mut saw_recovered = false;
    while let Ok(event) = events.try_recv() {
        match event {
            ProcessEvent::StatusReport { results } => {
                saw_report = true;
                assert!(results.iter().any(|r| r.id == "exchange-rate"));
            }
            ProcessEvent::Recovered { .. } => saw_recovered = true,
            _ => {}
        }
    }
    assert!(saw_report);
    assert!(saw_recovered);
}

#[tokio::test]
async fn test_paused_health_monitoring_skips_recovery() {
    let mut options = fast_options();
    options.health_check_interval = Duration::from_millis(20);
    options.auto_recover = true;
    let manager = ProcessManager::new(options);
    manager.pause_health_monitoring().await.unwrap();

    let calls = Arc::new(AtomicU32::new(0));
    manager
        .start("exchange-rate", erroring_monitor(6, calls.clone()))
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(150)).await;
    let info = manager.get_process_info("exchange-rate").await.unwrap();
    assert_eq!(info.restart_count, 0);
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    manager.resume_health_monitoring().await.unwrap();
    wait_for_info(
        &manager,
        "exchange-rate",
        |info| info.restart_count == 1,
        Duration::from_secs(3),
    )
    .await;
}

#[tokio::test]
async fn test_auto_recover_disabled_leaves_monitor_unhealthy() {
    let mut options = fast_options();
    options.health_check_interval = Duration::from_millis(20);
    options.auto_recover = true;
    let manager = ProcessManager::new(options);
    manager.set_auto_recover(false).await.unwrap();

    manager
        .start("exchange-rate", erroring_monitor(6, Arc::new(AtomicU32::new(0))))
        .await
        .unwrap();

    let info = wait_for_info(
        &manager,
        "exchange-rate",
        |info| info.health == HealthStatus::Unhealthy,
        Duration::from_secs(2),
    )
    .await;
    assert_eq!(info.restart_count, 0);
}

#[tokio::test]
async fn test_factory_panic_is_contained() {
    let manager = ProcessManager::new(fast_options());

    let exploding = monitor_fn(|_ctx| {
        if std::env::var_os("WATCHHAMSTER_NEVER_SET").is_none() {
            panic!("factory exploded");
        }
        async { anyhow::Ok(()) }
    });

    let err = manager.start("exploding", exploding).await.unwrap_err();
    match err {
        ProcessError::TaskPanic { message, .. } => assert!(message.contains("factory exploded")),
        other => panic!("unexpected error {:?}", other),
    }

    let info = manager.get_process_info("exploding").await.unwrap();
    assert_eq!(info.status, ProcessStatus::Error);

    // The manager keeps working
    manager.start("kospi-close", idle_monitor()).await.unwrap();
}

#[tokio::test]
async fn test_closed_semaphore_still_completes_job() {
    let (completed_tx, mut completed_rx) = tokio::sync::mpsc::channel(1);
    let job = Job {
        process_id: "kospi-close".to_string(),
        op: OpKind::Start,
        task: None,
        factory: idle_monitor(),
        ledger: Arc::new(ErrorLedger::new()),
        settings: SupervisionConfig::default(),
        batch_id: Some(7),
    };

    OpRunner::test_run_job_with_closed_semaphore(job, completed_tx).await;

    let completed = completed_rx.recv().await.unwrap();
    assert_eq!(completed.process_id, "kospi-close");
    assert_eq!(completed.batch_id, Some(7));
    assert!(matches!(
        completed.result,
        Err(ProcessError::ManagerUnavailable { .. })
    ));
}

#[tokio::test]
async fn test_new_manager_is_running_and_empty() {
    let manager = ProcessManager::new(fast_options());
    let state = manager.get_manager_state().await;
    assert_eq!(state, ProcessManagerState::Running);
    assert!(manager.get_all_process_info().await.unwrap().is_empty());
}
