//! Probe monitor - periodic HTTP probing with failure and recovery callbacks
//!
//! A [`ProbeMonitor`] is the body of a supervised monitor task. Each failed
//! probe is handed to the failure callback (the supervisor counts it as a
//! monitor error); a success after an unhealthy streak fires the recovery
//! callback. Configuration errors end the loop with `Err`.

use crate::http::{probe_http, HttpProbeConfig};
use crate::{HealthTracker, ProbeResult};
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Callback invoked with the failure reason of every failed probe
pub type FailureCallback = Arc<dyn Fn(String) + Send + Sync>;

/// Callback invoked when a probe succeeds after the tracker went unhealthy
pub type RecoveryCallback = Arc<dyn Fn() + Send + Sync>;

/// Probe loop configuration
#[derive(Debug, Clone)]
pub struct ProbeMonitorConfig {
    pub probe: HttpProbeConfig,
    pub interval: Duration,
    /// Consecutive failures before the tracker reports unhealthy
    pub failure_threshold: u32,
}

impl ProbeMonitorConfig {
    pub fn new(probe: HttpProbeConfig, interval: Duration) -> Self {
        Self {
            probe,
            interval,
            failure_threshold: 3,
        }
    }
}

/// Periodic HTTP probe runner
pub struct ProbeMonitor {
    id: String,
    config: ProbeMonitorConfig,
    tracker: Arc<RwLock<HealthTracker>>,
    failure_callback: Option<FailureCallback>,
    recovery_callback: Option<RecoveryCallback>,
}

impl ProbeMonitor {
    pub fn new(id: impl Into<String>, config: ProbeMonitorConfig) -> Self {
        Self {
            id: id.into(),
            config,
            tracker: Arc::new(RwLock::new(HealthTracker::new())),
            failure_callback: None,
            recovery_callback: None,
        }
    }

    pub fn set_failure_callback<F>(&mut self, callback: F)
    where
        F: Fn(String) + Send + Sync + 'static,
    {
        self.failure_callback = Some(Arc::new(callback));
    }

    pub fn set_recovery_callback<F>(&mut self, callback: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.recovery_callback = Some(Arc::new(callback));
    }

    /// Shared handle to the tracker, readable while the loop runs
    pub fn tracker(&self) -> Arc<RwLock<HealthTracker>> {
        Arc::clone(&self.tracker)
    }

    pub async fn get_status(&self) -> HealthTracker {
        self.tracker.read().await.clone()
    }

    /// Probe forever on the configured interval.
    pub async fn run(&self) -> ProbeResult<()> {
        let mut ticker = interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            "Probe loop started for {} ({}, interval: {:?})",
            self.id, self.config.probe.endpoint, self.config.interval
        );

        loop {
            ticker.tick().await;

            let outcome = probe_http(&self.config.probe).await?;
            let mut tracker = self.tracker.write().await;

            if outcome.is_healthy {
                let was_unhealthy = !tracker.is_healthy;
                tracker.record_success();
                drop(tracker);

                debug!("Probe succeeded for {}", self.id);
                if was_unhealthy {
                    info!("Probe target for {} recovered", self.id);
                    if let Some(ref callback) = self.recovery_callback {
                        callback();
                    }
                }
            } else {
                let reason = outcome
                    .error_message
                    .unwrap_or_else(|| "probe failed".to_string());
                tracker.record_failure(reason.clone(), self.config.failure_threshold);
                let failures = tracker.consecutive_failures;
                drop(tracker);

                warn!(
                    "Probe failed for {} ({} consecutive): {}",
                    self.id, failures, reason
                );
                if let Some(ref callback) = self.failure_callback {
                    callback(reason);
                }
            }
        }
    }
}
