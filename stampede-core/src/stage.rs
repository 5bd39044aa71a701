use crate::ConfigError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How the target concurrency moves while a stage is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Ramp {
    /// Interpolate linearly from the previous stage's target.
    #[default]
    Linear,
    /// Jump to the target as soon as the stage starts and hold it.
    Step,
}

/// A time-bounded segment of a run with a target concurrency.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stage {
    pub duration: Duration,
    pub target: u64,
    pub ramp: Ramp,
}

impl Stage {
    pub fn new(duration: Duration, target: u64) -> Self {
        Self {
            duration,
            target,
            ramp: Ramp::Linear,
        }
    }

    pub fn with_ramp(mut self, ramp: Ramp) -> Self {
        self.ramp = ramp;
        self
    }
}

pub fn validate_stages(stages: &[Stage]) -> Result<(), ConfigError> {
    if stages.is_empty() {
        return Err(ConfigError::EmptyStages);
    }
    Ok(())
}

pub fn total_duration(stages: &[Stage]) -> Duration {
    stages.iter().map(|s| s.duration).sum()
}

pub fn max_target(stages: &[Stage]) -> u64 {
    stages.iter().map(|s| s.target).max().unwrap_or(0)
}
