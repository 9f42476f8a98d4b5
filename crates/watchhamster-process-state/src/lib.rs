use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use watchhamster_common::errors::{ProcessError, ProcessResult};

/// Maximum number of transitions kept per monitor.
const MAX_HISTORY: usize = 100;

/// Lifecycle status of a supervised monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessStatus {
    /// Monitor is registered but not running
    Stopped,
    /// Monitor task is being spawned
    Starting,
    /// Monitor task is running
    Running,
    /// Monitor task is being cancelled
    Stopping,
    /// All start attempts failed
    Error,
    /// Automatic recovery is in progress
    Recovering,
}

impl fmt::Display for ProcessStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ProcessStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessStatus::Stopped => "stopped",
            ProcessStatus::Starting => "starting",
            ProcessStatus::Running => "running",
            ProcessStatus::Stopping => "stopping",
            ProcessStatus::Error => "error",
            ProcessStatus::Recovering => "recovering",
        }
    }

    /// Check if the monitor is at rest (no task and no work in progress)
    pub fn is_terminal(&self) -> bool {
        matches!(self, ProcessStatus::Stopped | ProcessStatus::Error)
    }

    /// Check if the monitor is in a transitional state
    pub fn is_transitional(&self) -> bool {
        matches!(
            self,
            ProcessStatus::Starting | ProcessStatus::Stopping | ProcessStatus::Recovering
        )
    }

    /// Check if the monitor is active (running or transitional)
    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }
}

impl std::str::FromStr for ProcessStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "stopped" => Ok(ProcessStatus::Stopped),
            "starting" => Ok(ProcessStatus::Starting),
            "running" => Ok(ProcessStatus::Running),
            "stopping" => Ok(ProcessStatus::Stopping),
            "error" => Ok(ProcessStatus::Error),
            "recovering" => Ok(ProcessStatus::Recovering),
            other => Err(format!("unknown process status: {}", other)),
        }
    }
}

/// Status state machine for a single monitor
#[derive(Debug, Clone)]
pub struct ProcessStateMachine {
    process_id: String,
    current_state: ProcessStatus,
    previous_state: Option<ProcessStatus>,
    state_history: Vec<StateTransition>,
    last_transition_time: DateTime<Utc>,
}

/// Represents a state transition with timestamp and optional reason
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateTransition {
    pub from_state: ProcessStatus,
    pub to_state: ProcessStatus,
    pub timestamp: DateTime<Utc>,
    pub reason: Option<String>,
}

impl ProcessStateMachine {
    /// Create a new state machine for a monitor
    pub fn new(process_id: &str) -> Self {
        Self {
            process_id: process_id.to_string(),
            current_state: ProcessStatus::Stopped,
            previous_state: None,
            state_history: Vec::new(),
            last_transition_time: Utc::now(),
        }
    }

    pub fn process_id(&self) -> &str {
        &self.process_id
    }

    /// Get the current state
    pub fn current_state(&self) -> ProcessStatus {
        self.current_state
    }

    /// Get the previous state
    pub fn previous_state(&self) -> Option<ProcessStatus> {
        self.previous_state
    }

    /// Get the state history
    pub fn state_history(&self) -> &[StateTransition] {
        &self.state_history
    }

    /// Get the time of the last state transition
    pub fn last_transition_time(&self) -> DateTime<Utc> {
        self.last_transition_time
    }

    /// Check if a transition from current state to target state is valid
    pub fn is_valid_transition(&self, target_state: ProcessStatus) -> bool {
        use ProcessStatus::*;

        match (self.current_state, target_state) {
            // From Stopped
            (Stopped, Starting) => true,

            // From Starting
            (Starting, Running) => true,
            (Starting, Error) => true,
            (Starting, Stopping) => true, // Cancel startup

            // From Running
            (Running, Stopping) => true,
            (Running, Error) => true,
            (Running, Recovering) => true,

            // From Stopping
            (Stopping, Stopped) => true,
            (Stopping, Error) => true,

            // From Error
            (Error, Starting) => true, // Manual restart
            (Error, Stopping) => true,
            (Error, Recovering) => true,
            (Error, Stopped) => true,

            // From Recovering
            (Recovering, Starting) => true,
            (Recovering, Stopping) => true,
            (Recovering, Error) => true,

            // Same state (no-op)
            (state, target) if state == target => true,

            _ => false,
        }
    }

    /// Transition to a new state with optional reason
    pub fn transition_to(
        &mut self,
        target_state: ProcessStatus,
        reason: Option<String>,
    ) -> ProcessResult<()> {
        if !self.is_valid_transition(target_state) {
            return Err(ProcessError::invalid_state(
                &self.process_id,
                target_state.as_str(),
                self.current_state.as_str(),
            ));
        }

        let now = Utc::now();
        let from_state = self.current_state;
        self.state_history.push(StateTransition {
            from_state,
            to_state: target_state,
            timestamp: now,
            reason,
        });

        self.previous_state = Some(from_state);
        self.current_state = target_state;
        self.last_transition_time = now;

        if self.state_history.len() > MAX_HISTORY {
            self.state_history.remove(0);
        }

        tracing::debug!(
            "Monitor {} transitioned from {} to {}",
            self.process_id,
            from_state,
            target_state
        );

        Ok(())
    }

    /// Convenience methods for specific transitions
    pub fn transition_to_starting(&mut self) -> ProcessResult<()> {
        self.transition_to(ProcessStatus::Starting, Some("Monitor start requested".to_string()))
    }

    pub fn transition_to_running(&mut self) -> ProcessResult<()> {
        self.transition_to(ProcessStatus::Running, Some("Monitor started successfully".to_string()))
    }

    pub fn transition_to_stopping(&mut self) -> ProcessResult<()> {
        self.transition_to(ProcessStatus::Stopping, Some("Monitor stop requested".to_string()))
    }

    pub fn transition_to_stopped(&mut self) -> ProcessResult<()> {
        self.transition_to(ProcessStatus::Stopped, Some("Monitor stopped".to_string()))
    }

    pub fn transition_to_error(&mut self, reason: String) -> ProcessResult<()> {
        self.transition_to(ProcessStatus::Error, Some(reason))
    }

    pub fn transition_to_recovering(&mut self, reason: String) -> ProcessResult<()> {
        self.transition_to(ProcessStatus::Recovering, Some(reason))
    }

    /// Check if the monitor can be started
    pub fn can_start(&self) -> bool {
        matches!(
            self.current_state,
            ProcessStatus::Stopped | ProcessStatus::Error | ProcessStatus::Recovering
        )
    }

    /// Check if the monitor can be stopped
    pub fn can_stop(&self) -> bool {
        matches!(
            self.current_state,
            ProcessStatus::Running
                | ProcessStatus::Starting
                | ProcessStatus::Error
                | ProcessStatus::Recovering
        )
    }

    /// Check if automatic recovery may begin
    pub fn can_recover(&self) -> bool {
        matches!(self.current_state, ProcessStatus::Running | ProcessStatus::Error)
    }

    /// Get the time spent in the current state
    pub fn time_in_current_state(&self) -> chrono::Duration {
        Utc::now() - self.last_transition_time
    }

    /// Get the most recent transition
    pub fn last_transition(&self) -> Option<&StateTransition> {
        self.state_history.last()
    }

    /// Count transitions to a specific state
    pub fn count_transitions_to(&self, state: ProcessStatus) -> usize {
        self.state_history
            .iter()
            .filter(|t| t.to_state == state)
            .count()
    }

    /// Get transitions within a time range
    pub fn transitions_since(&self, since: DateTime<Utc>) -> Vec<&StateTransition> {
        self.state_history
            .iter()
            .filter(|t| t.timestamp >= since)
            .collect()
    }

    /// Rebuild a state machine from a persisted status
    pub fn from_saved_state(
        process_id: &str,
        current_state: ProcessStatus,
        last_transition_time: DateTime<Utc>,
    ) -> Self {
        Self {
            process_id: process_id.to_string(),
            current_state,
            previous_state: None,
            state_history: Vec::new(),
            last_transition_time,
        }
    }
}

/// State machine statistics for status reporting
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateStatistics {
    pub total_transitions: usize,
    pub time_in_current_state_ms: i64,
    pub failure_count: usize,
    pub recovery_count: usize,
    pub start_count: usize,
    pub uptime_percentage: f64,
    pub last_failure_time: Option<DateTime<Utc>>,
}

impl ProcessStateMachine {
    /// Calculate statistics for the state machine
    pub fn calculate_statistics(&self, start_time: DateTime<Utc>) -> StateStatistics {
        let total_time = Utc::now() - start_time;

        let mut running_time = chrono::Duration::zero();
        let mut last_start: Option<DateTime<Utc>> = None;

        for transition in &self.state_history {
            match transition.to_state {
                ProcessStatus::Running => {
                    last_start = Some(transition.timestamp);
                }
                ProcessStatus::Stopping
                | ProcessStatus::Stopped
                | ProcessStatus::Error
                | ProcessStatus::Recovering => {
                    if let Some(started) = last_start.take() {
                        running_time += transition.timestamp - started;
                    }
                }
                _ => {}
            }
        }

        if self.current_state == ProcessStatus::Running {
            if let Some(started) = last_start {
                running_time += Utc::now() - started;
            }
        }

        let uptime_percentage = if total_time.num_milliseconds() > 0 {
            (running_time.num_milliseconds() as f64 / total_time.num_milliseconds() as f64)
                * 100.0
        } else {
            0.0
        };

        let last_failure_time = self
            .state_history
            .iter()
            .rev()
            .find(|t| t.to_state == ProcessStatus::Error)
            .map(|t| t.timestamp);

        StateStatistics {
            total_transitions: self.state_history.len(),
            time_in_current_state_ms: self.time_in_current_state().num_milliseconds(),
            failure_count: self.count_transitions_to(ProcessStatus::Error),
            recovery_count: self.count_transitions_to(ProcessStatus::Recovering),
            start_count: self.count_transitions_to(ProcessStatus::Starting),
            uptime_percentage: uptime_percentage.min(100.0),
            last_failure_time,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_machine_creation() {
        let sm = ProcessStateMachine::new("test-monitor");
        assert_eq!(sm.current_state(), ProcessStatus::Stopped);
        assert_eq!(sm.previous_state(), None);
        assert_eq!(sm.state_history().len(), 0);
    }

    #[test]
    fn test_valid_transitions() {
        let mut sm = ProcessStateMachine::new("test-monitor");

        assert!(sm.transition_to_starting().is_ok());
        assert_eq!(sm.current_state(), ProcessStatus::Starting);

        assert!(sm.transition_to_running().is_ok());
        assert_eq!(sm.current_state(), ProcessStatus::Running);

        assert!(sm.transition_to_stopping().is_ok());
        assert_eq!(sm.current_state(), ProcessStatus::Stopping);

        assert!(sm.transition_to_stopped().is_ok());
        assert_eq!(sm.current_state(), ProcessStatus::Stopped);
    }

    #[test]
    fn test_recovery_path() {
        let mut sm = ProcessStateMachine::new("test-monitor");
        sm.transition_to_starting().unwrap();
        sm.transition_to_running().unwrap();

        assert!(sm.can_recover());
        sm.transition_to_recovering("unhealthy".to_string()).unwrap();
        assert!(sm.can_start());
        sm.transition_to_starting().unwrap();
        sm.transition_to_error("still failing".to_string()).unwrap();
        assert_eq!(sm.previous_state(), Some(ProcessStatus::Starting));

        // Error can be recovered again or restarted manually
        assert!(sm.is_valid_transition(ProcessStatus::Recovering));
        assert!(sm.is_valid_transition(ProcessStatus::Starting));
    }

    #[test]
    fn test_invalid_transitions() {
        let mut sm = ProcessStateMachine::new("test-monitor");

        // Stopped -> Running must go through Starting
        assert!(!sm.is_valid_transition(ProcessStatus::Running));
        let err = sm.transition_to(ProcessStatus::Running, None).unwrap_err();
        assert!(matches!(err, ProcessError::InvalidState { .. }));

        assert!(!sm.is_valid_transition(ProcessStatus::Stopping));
        assert!(!sm.is_valid_transition(ProcessStatus::Recovering));
        assert_eq!(sm.current_state(), ProcessStatus::Stopped);
    }

    #[test]
    fn test_state_properties() {
        assert!(ProcessStatus::Stopped.is_terminal());
        assert!(ProcessStatus::Error.is_terminal());

        assert!(ProcessStatus::Starting.is_transitional());
        assert!(ProcessStatus::Stopping.is_transitional());
        assert!(ProcessStatus::Recovering.is_transitional());

        assert!(ProcessStatus::Running.is_active());
        assert!(!ProcessStatus::Stopped.is_active());
    }

    #[test]
    fn test_status_display_and_parse() {
        assert_eq!(ProcessStatus::Recovering.to_string(), "recovering");
        assert_eq!("RUNNING".parse::<ProcessStatus>(), Ok(ProcessStatus::Running));
        assert!("zombie".parse::<ProcessStatus>().is_err());

        let json = serde_json::to_string(&ProcessStatus::Error).unwrap();
        assert_eq!(json, "\"error\"");
    }

    #[test]
    fn test_state_history_is_bounded() {
        let mut sm = ProcessStateMachine::new("test-monitor");
        for _ in 0..60 {
            sm.transition_to_starting().unwrap();
            sm.transition_to_running().unwrap();
            sm.transition_to_stopping().unwrap();
            sm.transition_to_stopped().unwrap();
        }
        assert_eq!(sm.state_history().len(), MAX_HISTORY);
        assert_eq!(sm.last_transition().unwrap().to_state, ProcessStatus::Stopped);
    }

    #[test]
    fn test_statistics() {
        let start = Utc::now() - chrono::Duration::seconds(10);
        let mut sm = ProcessStateMachine::new("test-monitor");
        sm.transition_to_starting().unwrap();
        sm.transition_to_error("boom".to_string()).unwrap();
        sm.transition_to_starting().unwrap();
        sm.transition_to_running().unwrap();

        let stats = sm.calculate_statistics(start);
        assert_eq!(stats.total_transitions, 4);
        assert_eq!(stats.failure_count, 1);
        assert_eq!(stats.start_count, 2);
        assert!(stats.last_failure_time.is_some());
        assert!(stats.uptime_percentage >= 0.0 && stats.uptime_percentage <= 100.0);
    }
}
