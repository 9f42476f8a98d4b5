// Restart backoff and recovery flap protection

use crate::config::SupervisionConfig;
use chrono::{DateTime, Utc};
use std::time::Duration;
use tracing::{info, warn};

/// Linear start backoff: attempt `n` (0-based) is followed by
/// `restart_delay * (n + 1)` before the next one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RestartPolicy {
    pub max_attempts: u32,
    pub restart_delay: Duration,
}

impl RestartPolicy {
    pub fn new(max_attempts: u32, restart_delay: Duration) -> Self {
        Self {
            max_attempts,
            restart_delay,
        }
    }

    pub fn from_config(config: &SupervisionConfig) -> Self {
        Self::new(config.max_start_attempts, config.restart_delay)
    }

    /// Delay after failed attempt `attempt` (0-based)
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.restart_delay.saturating_mul(attempt.saturating_add(1))
    }

    /// Whether another attempt follows failed attempt `attempt`
    pub fn has_attempt_after(&self, attempt: u32) -> bool {
        attempt.saturating_add(1) < self.max_attempts
    }
}

impl Default for RestartPolicy {
    fn default() -> Self {
        Self::from_config(&SupervisionConfig::default())
    }
}

/// Circuit breaker to stop auto-recovery loops
#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    /// Maximum recoveries before tripping
    threshold: u32,
    /// Time window for counting recoveries
    time_window: Duration,
    recent: Vec<DateTime<Utc>>,
    is_tripped: bool,
    tripped_at: Option<DateTime<Utc>>,
    /// How long to wait before allowing recovery again
    cooldown_period: Duration,
}

impl CircuitBreaker {
    pub fn new() -> Self {
        Self::with_limits(5, Duration::from_secs(60), Duration::from_secs(300))
    }

    pub fn with_limits(threshold: u32, time_window: Duration, cooldown_period: Duration) -> Self {
        Self {
            threshold,
            time_window,
            recent: Vec::new(),
            is_tripped: false,
            tripped_at: None,
            cooldown_period,
        }
    }

    /// Record a recovery attempt. Returns true when this attempt trips the breaker.
    pub fn record_attempt(&mut self) -> bool {
        if self.is_tripped && !self.is_tripped() {
            self.reset();
        }

        let now = Utc::now();
        self.recent.push(now);

        // Remove attempts outside the time window
        let window = chrono::Duration::from_std(self.time_window).unwrap_or(chrono::Duration::zero());
        let cutoff = now - window;
        self.recent.retain(|&at| at > cutoff);

        if self.recent.len() >= self.threshold as usize && !self.is_tripped {
            self.is_tripped = true;
            self.tripped_at = Some(now);
            warn!(
                "Circuit breaker tripped: {} recoveries in {:?} window",
                self.recent.len(),
                self.time_window
            );
            return true;
        }

        false
    }

    /// Check if circuit breaker is currently tripped
    pub fn is_tripped(&self) -> bool {
        if !self.is_tripped {
            return false;
        }

        self.remaining_cooldown().is_some()
    }

    /// Reset the circuit breaker
    pub fn reset(&mut self) {
        self.is_tripped = false;
        self.tripped_at = None;
        self.recent.clear();
        info!("Circuit breaker reset");
    }

    /// Get remaining cooldown time
    pub fn remaining_cooldown(&self) -> Option<Duration> {
        if !self.is_tripped {
            return None;
        }

        let tripped_at = self.tripped_at?;
        let elapsed = (Utc::now() - tripped_at).to_std().unwrap_or(Duration::ZERO);
        if elapsed < self.cooldown_period {
            Some(self.cooldown_period - elapsed)
        } else {
            None
        }
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new()
    }
}
