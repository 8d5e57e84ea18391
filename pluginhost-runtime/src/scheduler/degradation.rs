//! # Degradation Gate (§4.7)
//!
//! Tracks system load (CPU utilization, queue depth) and classifies it into
//! one of three states — `Normal`, `Degraded`, `Critical` — with hysteresis:
//! the return-to-normal threshold sits below the degraded threshold so the
//! gate doesn't flap across a single noisy sample, and transitions are
//! further debounced by `SchedulerConfig::debounce_interval`. Job submission
//! consults the current state to add a submission delay (`Degraded`) or, if
//! `reject_on_critical` is set, refuse outright (`Critical`).

use std::time::{Duration, Instant};

use tokio::sync::Mutex;

use crate::config::SchedulerConfig;
use crate::error::RuntimeError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DegradationState {
    Normal,
    Degraded,
    Critical,
}

impl DegradationState {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Degraded => "degraded",
            Self::Critical => "critical",
        }
    }
}

pub struct DegradationGate {
    config: SchedulerConfig,
    state: Mutex<DegradationState>,
    last_transition: Mutex<Instant>,
}

impl DegradationGate {
    pub fn new(config: SchedulerConfig) -> Self {
        Self {
            config,
            state: Mutex::new(DegradationState::Normal),
            last_transition: Mutex::new(Instant::now()),
        }
    }

    fn classify(&self, current: DegradationState, cpu: f32, queue_depth: usize) -> DegradationState {
        if cpu >= self.config.cpu_critical_threshold
            || queue_depth >= self.config.queue_depth_critical_threshold
        {
            DegradationState::Critical
        } else if cpu >= self.config.cpu_degraded_threshold
            || queue_depth >= self.config.queue_depth_degraded_threshold
        {
            DegradationState::Degraded
        } else if cpu <= self.config.cpu_return_to_normal_threshold
            && queue_depth < self.config.queue_depth_degraded_threshold
        {
            DegradationState::Normal
        } else {
            // Between the return-to-normal floor and the degraded ceiling:
            // hold whatever the current state already is.
            current
        }
    }

    /// Feed a fresh load sample. Returns the state in effect after this
    /// sample, which may be the previous state if the debounce interval
    /// hasn't elapsed since the last transition.
    pub async fn sample(&self, cpu: f32, queue_depth: usize) -> DegradationState {
        let mut state = self.state.lock().await;
        let candidate = self.classify(*state, cpu, queue_depth);
        if candidate == *state {
            return *state;
        }
        let mut last = self.last_transition.lock().await;
        if last.elapsed() < self.config.debounce_interval {
            return *state;
        }
        *state = candidate;
        *last = Instant::now();
        *state
    }

    pub async fn current(&self) -> DegradationState {
        *self.state.lock().await
    }

    /// Gate a job submission against the current state: `Normal` passes
    /// through, `Degraded` adds `degraded_delay_ms`, `Critical` either adds
    /// `critical_delay_ms` or rejects outright if configured to.
    pub async fn gate_submit(&self) -> Result<Option<Duration>, RuntimeError> {
        match self.current().await {
            DegradationState::Normal => Ok(None),
            DegradationState::Degraded => Ok(Some(Duration::from_millis(self.config.degraded_delay_ms))),
            DegradationState::Critical => {
                if self.config.reject_on_critical {
                    Err(RuntimeError::JobSubmitRejectedDegraded {
                        state: DegradationState::Critical.as_str().to_string(),
                    })
                } else {
                    Ok(Some(Duration::from_millis(self.config.critical_delay_ms)))
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> SchedulerConfig {
        SchedulerConfig {
            tick_interval: Duration::from_secs(1),
            timezone: "UTC".to_string(),
            degraded_delay_ms: 100,
            critical_delay_ms: 500,
            reject_on_critical: true,
            cpu_degraded_threshold: 0.70,
            cpu_critical_threshold: 0.90,
            cpu_return_to_normal_threshold: 0.55,
            queue_depth_degraded_threshold: 50,
            queue_depth_critical_threshold: 90,
            debounce_interval: Duration::from_millis(0),
        }
    }

    #[tokio::test]
    async fn low_load_stays_normal() {
        let gate = DegradationGate::new(config());
        assert_eq!(gate.sample(0.1, 0).await, DegradationState::Normal);
        assert!(gate.gate_submit().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn high_cpu_trips_critical_and_rejects() {
        let gate = DegradationGate::new(config());
        assert_eq!(gate.sample(0.95, 0).await, DegradationState::Critical);
        assert!(gate.gate_submit().await.is_err());
    }

    #[tokio::test]
    async fn moderate_load_degrades_with_a_delay() {
        let gate = DegradationGate::new(config());
        assert_eq!(gate.sample(0.75, 0).await, DegradationState::Degraded);
        let delay = gate.gate_submit().await.unwrap();
        assert_eq!(delay, Some(Duration::from_millis(100)));
    }
}
