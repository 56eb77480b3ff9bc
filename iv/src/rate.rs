//! Adaptive pacing between invitations

use std::time::Duration;

use tracing::debug;

use crate::config::RunConfig;

/// Holds the delay applied after each successful invitation
///
/// The delay only grows: every throttle signal adds the configured
/// increment, clamped to the maximum. It never shrinks within a run.
#[derive(Debug, Clone)]
pub struct RateController {
    current_secs: u64,
    increment_secs: u64,
    max_secs: u64,
}

impl RateController {
    /// Start at the configured initial delay
    pub fn new(config: &RunConfig) -> Self {
        debug!(?config, "RateController::new: called");
        Self {
            current_secs: config.initial_delay_secs.min(config.max_delay_secs),
            increment_secs: config.delay_increment_secs,
            max_secs: config.max_delay_secs,
        }
    }

    /// Resume from a persisted delay, clamped into `[initial, max]`
    pub fn resume(config: &RunConfig, persisted_secs: u64) -> Self {
        debug!(persisted_secs, "RateController::resume: called");
        let mut controller = Self::new(config);
        controller.current_secs = persisted_secs.clamp(controller.current_secs, controller.max_secs);
        controller
    }

    pub fn current_delay(&self) -> Duration {
        Duration::from_secs(self.current_secs)
    }

    pub fn current_delay_secs(&self) -> u64 {
        self.current_secs
    }

    /// Grow the delay after a throttle signal, returning the new delay in seconds
    pub fn on_throttle_signal(&mut self) -> u64 {
        self.current_secs = self.current_secs.saturating_add(self.increment_secs).min(self.max_secs);
        debug!(delay_secs = self.current_secs, "RateController::on_throttle_signal: delay raised");
        self.current_secs
    }

    /// True once further throttle signals can no longer raise the delay
    pub fn at_cap(&self) -> bool {
        self.current_secs >= self.max_secs
    }
}
