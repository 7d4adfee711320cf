//! Retry policy configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Retry schedule for capacity-exhausted operations.
///
/// The cooldown is fixed: every retry waits the same duration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum attempts, including the first.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Wait before retrying after a capacity error, in seconds.
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,
    /// Interval between progress notifications during a cooldown, in seconds.
    #[serde(default = "default_progress_interval_secs")]
    pub progress_interval_secs: u64,
}

const fn default_max_attempts() -> u32 {
    10
}

const fn default_cooldown_secs() -> u64 {
    3600
}

const fn default_progress_interval_secs() -> u64 {
    300
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            cooldown_secs: default_cooldown_secs(),
            progress_interval_secs: default_progress_interval_secs(),
        }
    }
}

impl RetryPolicy {
    /// Creates a policy with the default schedule.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum attempts.
    #[must_use]
    pub const fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Sets the cooldown.
    #[must_use]
    pub const fn with_cooldown_secs(mut self, secs: u64) -> Self {
        self.cooldown_secs = secs;
        self
    }

    /// Sets the progress notification interval.
    #[must_use]
    pub const fn with_progress_interval_secs(mut self, secs: u64) -> Self {
        self.progress_interval_secs = secs;
        self
    }

    /// Attempt limit actually enforced; a configured zero still allows one call.
    #[must_use]
    pub fn effective_max_attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Cooldown as a `Duration`.
    #[must_use]
    pub const fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }

    /// Progress interval as a `Duration`.
    #[must_use]
    pub const fn progress_interval(&self) -> Duration {
        Duration::from_secs(self.progress_interval_secs)
    }
}
