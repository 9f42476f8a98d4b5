//! The WatchHamster orchestrator.

use crate::error::{CoreError, CoreResult};
use crate::events::spawn_forwarder;
use crate::modes::select_monitors;
use crate::setup;
use crate::status::{SystemStatus, SystemStatusInfo};
use chrono::{DateTime, Local, NaiveDate, Utc};
use std::collections::HashMap;
use std::fmt;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use watchhamster_business_day::HolidayCalendar;
use watchhamster_common::MonitoringMode;
use watchhamster_monitoring::HealthStatus;
use watchhamster_notify::{NotifyEvent, Notifier};
use watchhamster_process_management::{
    MonitorConfig, ProcessManager, ProcessManagerState, RecoveryOutcome, SharedFactory,
    WatchHamsterConfig,
};
use watchhamster_state_file::{MonitorSnapshot, SavedState, StateFile};

/// Runs the configured monitors in one of the monitoring modes and keeps
/// state, notifications and recovery together.
///
/// Must be created inside a Tokio runtime.
pub struct WatchHamsterCore {
    config: WatchHamsterConfig,
    manager: ProcessManager,
    notifier: Notifier,
    calendar: HolidayCalendar,
    state_file: StateFile,
    /// Tasks registered in code, taking precedence over configured probes
    factories: HashMap<String, SharedFactory>,
    status: SystemStatus,
    mode: Option<MonitoringMode>,
    start_time: Option<DateTime<Utc>>,
    error_count: u32,
    last_error: Option<String>,
    initialized: bool,
    forwarder: Option<JoinHandle<()>>,
}

impl WatchHamsterCore {
    pub fn new(config: WatchHamsterConfig) -> CoreResult<Self> {
        let notifier = setup::build_notifier(config.notifications.as_ref())?;
        Self::with_notifier(config, notifier)
    }

    pub fn with_notifier(config: WatchHamsterConfig, notifier: Notifier) -> CoreResult<Self> {
        let calendar = setup::build_calendar(config.calendar.as_ref())?;
        let manager = ProcessManager::new(config.manager_options());
        let forwarder = spawn_forwarder(manager.subscribe(), notifier.clone());
        let state_file = StateFile::new(&config.watchhamster.state_file);

        Ok(Self {
            config,
            manager,
            notifier,
            calendar,
            state_file,
            factories: HashMap::new(),
            status: SystemStatus::Stopped,
            mode: None,
            start_time: None,
            error_count: 0,
            last_error: None,
            initialized: false,
            forwarder: Some(forwarder),
        })
    }

    /// Back `id` with `factory` instead of its configured probe. Unconfigured
    /// ids become enabled monitors.
    pub fn register_monitor(&mut self, id: impl Into<String>, factory: SharedFactory) {
        let id = id.into();
        debug!("Registered task for monitor {}", id);
        self.factories.insert(id, factory);
    }

    pub fn manager(&self) -> &ProcessManager {
        &self.manager
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    pub fn calendar(&self) -> &HolidayCalendar {
        &self.calendar
    }

    pub fn status(&self) -> SystemStatus {
        self.status
    }

    /// Restore counters from the state file and start health monitoring.
    pub async fn initialize(&mut self) -> CoreResult<()> {
        if self.initialized {
            warn!("WatchHamster already initialized");
            return Ok(());
        }
        if self.manager.get_manager_state().await != ProcessManagerState::Running {
            return Err(CoreError::ShutDown);
        }

        info!("Initializing WatchHamster...");
        self.status = SystemStatus::Initializing;

        let loaded = match self.state_file.load().await {
            Ok(loaded) => loaded,
            Err(e) => {
                error!("Failed to load state from {}: {}", self.state_file.path().display(), e);
                self.status = SystemStatus::Error;
                self.record_error(e.to_string());
                return Err(e.into());
            }
        };
        if let Some(saved) = loaded {
            info!(
                "Restored state from previous session (mode: {}, errors: {})",
                saved.mode, saved.error_count
            );
            self.error_count = saved.error_count;
            self.last_error = saved.last_error;
        }

        self.manager.resume_health_monitoring().await?;

        self.initialized = true;
        self.status = SystemStatus::Stopped;
        info!("WatchHamster initialized");
        Ok(())
    }

    /// Start the monitors `mode` selects for today.
    pub async fn start_monitoring(
        &mut self,
        mode: MonitoringMode,
        monitor_ids: &[String],
    ) -> CoreResult<()> {
        let today = Local::now().date_naive();
        self.start_monitoring_on(mode, monitor_ids, today).await
    }

    /// Start monitoring as if it were `today`.
    ///
    /// A failed monitor start leaves the system in `Error`; monitors started
    /// before it keep running until `stop_monitoring`.
    pub async fn start_monitoring_on(
        &mut self,
        mode: MonitoringMode,
        monitor_ids: &[String],
        today: NaiveDate,
    ) -> CoreResult<()> {
        if !self.initialized {
            return Err(CoreError::NotInitialized);
        }
        if self.status == SystemStatus::Running {
            let current = self.mode.unwrap_or(mode);
            warn!("Monitoring already running in {} mode", current);
            return Err(CoreError::AlreadyRunning(current));
        }

        let candidates = self.candidates();
        let selection = select_monitors(mode, &candidates, monitor_ids, &self.calendar, today);
        if selection.selected.is_empty() && selection.skipped.is_empty() {
            return Err(CoreError::NoMonitorsSelected(mode));
        }

        let mut factories = Vec::with_capacity(selection.selected.len());
        for id in &selection.selected {
            factories.push((id.clone(), self.factory_for(id, &candidates)?));
        }

        let auto_recover = match mode {
            MonitoringMode::Service24h => {
                self.manager.resume_health_monitoring().await?;
                true
            }
            _ => self.config.watchhamster.auto_recover,
        };
        self.manager.set_auto_recover(auto_recover).await?;

        info!(
            "Starting monitoring in {} mode: {:?} (auto-recover: {})",
            mode, selection.selected, auto_recover
        );
        self.status = SystemStatus::Running;
        self.mode = Some(mode);
        self.start_time = Some(Utc::now());

        for (id, factory) in factories {
            if let Err(e) = self.manager.start(&id, factory).await {
                error!("Failed to start monitor {}: {}", id, e);
                self.status = SystemStatus::Error;
                self.record_error(format!("start {}: {}", id, e));
                self.persist().await;
                return Err(e.into());
            }
        }

        self.notifier.notify(NotifyEvent::system_status(
            format!("Monitoring started in {} mode", mode),
            selection.selected.len(),
            candidates.len(),
        ));
        info!("Monitoring started in {} mode", mode);
        self.persist().await;
        Ok(())
    }

    /// Stop every monitor. Allowed while running or after a failed start.
    pub async fn stop_monitoring(&mut self) -> CoreResult<()> {
        if !matches!(self.status, SystemStatus::Running | SystemStatus::Error) {
            warn!("Monitoring not running");
            return Err(CoreError::NotRunning);
        }

        info!("Stopping monitoring...");
        self.status = SystemStatus::Stopping;

        let mut first_error = None;
        for info in self.manager.get_all_process_info().await? {
            if let Err(e) = self.manager.stop(&info.id).await {
                error!("Failed to stop monitor {}: {}", info.id, e);
                self.record_error(format!("stop {}: {}", info.id, e));
                first_error.get_or_insert(e);
            }
        }

        self.status = SystemStatus::Stopped;
        self.mode = None;
        self.notifier
            .notify(NotifyEvent::system_status("Monitoring stopped", 0, self.candidates().len()));
        self.persist().await;

        match first_error {
            Some(e) => Err(e.into()),
            None => {
                info!("Monitoring stopped");
                Ok(())
            }
        }
    }

    /// Stop monitoring, save state and shut the process manager down.
    /// The instance cannot be initialized again afterwards.
    pub async fn shutdown(&mut self) -> CoreResult<()> {
        info!("Shutting down WatchHamster...");

        if matches!(self.status, SystemStatus::Running | SystemStatus::Error) {
            if let Err(e) = self.stop_monitoring().await {
                warn!("Monitoring did not stop cleanly: {}", e);
            }
        }

        self.manager.pause_health_monitoring().await?;
        self.save_state().await?;
        self.manager.shutdown().await?;

        if let Some(forwarder) = self.forwarder.take() {
            forwarder.abort();
        }

        self.initialized = false;
        self.status = SystemStatus::Stopped;
        info!("WatchHamster shut down");
        Ok(())
    }

    pub async fn get_system_status(&self) -> CoreResult<SystemStatusInfo> {
        let monitors = self.manager.get_all_process_info().await?;
        let (active_monitors, healthy_monitors) = SystemStatusInfo::summarize(&monitors);
        let uptime_secs = self
            .start_time
            .map(|t| (Utc::now() - t).num_seconds().max(0) as u64)
            .unwrap_or(0);

        Ok(SystemStatusInfo {
            status: self.status,
            mode: self.mode,
            initialized: self.initialized,
            start_time: self.start_time,
            uptime_secs,
            active_monitors,
            total_monitors: monitors.len(),
            healthy_monitors,
            error_count: self.error_count,
            last_error: self.last_error.clone(),
            monitors,
        })
    }

    /// Count and announce `error`, then try to recover every unhealthy monitor.
    ///
    /// Returns the recovery outcome per monitor that was unhealthy.
    pub async fn handle_error(
        &mut self,
        context: &str,
        error: impl fmt::Display,
    ) -> CoreResult<Vec<(String, RecoveryOutcome)>> {
        let message = if context.is_empty() {
            error.to_string()
        } else {
            format!("{}: {}", context, error)
        };
        error!("Handling error: {}", message);
        self.record_error(message);
        self.notifier.notify(NotifyEvent::error_alert(context, error.to_string()));

        let mut outcomes = Vec::new();
        for result in self.manager.check_all_health().await? {
            if result.health != HealthStatus::Unhealthy {
                continue;
            }
            info!("Attempting recovery of monitor {}", result.id);
            let outcome = self.manager.auto_recover(&result.id).await?;
            outcomes.push((result.id, outcome));
        }

        if outcomes.is_empty() {
            debug!("No recovery needed");
        }
        Ok(outcomes)
    }

    pub async fn save_state(&self) -> CoreResult<()> {
        let mut state = SavedState::new(self.mode.unwrap_or(self.config.watchhamster.mode));
        state.watchhamster_running = self.status == SystemStatus::Running;
        state.start_time = self.start_time;
        state.error_count = self.error_count;
        state.last_error = self.last_error.clone();

        for info in self.manager.get_all_process_info().await? {
            state.individual_monitors.insert(
                info.id,
                MonitorSnapshot {
                    status: info.status,
                    health: info.health,
                    restart_count: info.restart_count,
                    error_count: info.error_count,
                    last_error: info.last_error,
                },
            );
        }

        self.state_file.save(&state).await?;
        debug!("State saved to {}", self.state_file.path().display());
        Ok(())
    }

    async fn persist(&self) {
        if let Err(e) = self.save_state().await {
            error!("Failed to save state: {}", e);
        }
    }

    fn record_error(&mut self, message: String) {
        self.error_count += 1;
        self.last_error = Some(message);
    }

    /// Configured monitors plus registered-only ones
    fn candidates(&self) -> Vec<MonitorConfig> {
        let mut candidates = self.config.monitors.clone();
        let mut registered: Vec<&String> = self
            .factories
            .keys()
            .filter(|id| self.config.monitor(id).is_none())
            .collect();
        registered.sort();

        candidates.extend(registered.into_iter().map(|id| MonitorConfig {
            id: id.clone(),
            enabled: true,
            business_days_only: false,
            description: None,
            probe: None,
        }));
        candidates
    }

    fn factory_for(&self, id: &str, candidates: &[MonitorConfig]) -> CoreResult<SharedFactory> {
        if let Some(factory) = self.factories.get(id) {
            return Ok(factory.clone());
        }
        let monitor = candidates
            .iter()
            .find(|m| m.id == id)
            .ok_or_else(|| CoreError::UnknownMonitor(id.to_string()))?;
        setup::monitor_factory(monitor)
    }
}
