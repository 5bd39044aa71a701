//! Stage schedule: maps elapsed run time to a target concurrency.
use stampede_core::{max_target, total_duration, validate_stages, ConfigError, Ramp, Stage};
use std::time::Duration;

/// Ordered, immutable stage list with precomputed boundaries.
#[derive(Debug, Clone)]
pub struct Schedule {
    stages: Vec<Stage>,
    /// Elapsed time at which each stage ends.
    ends: Vec<Duration>,
    total: Duration,
    max_target: u64,
}

impl Schedule {
    pub fn new(stages: &[Stage]) -> Result<Self, ConfigError> {
        validate_stages(stages)?;

        let ends = stages
            .iter()
            .scan(Duration::ZERO, |acc, stage| {
                *acc += stage.duration;
                Some(*acc)
            })
            .collect();

        Ok(Self {
            stages: stages.to_vec(),
            ends,
            total: total_duration(stages),
            max_target: max_target(stages),
        })
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn total_duration(&self) -> Duration {
        self.total
    }

    pub fn max_target(&self) -> u64 {
        self.max_target
    }

    /// Index of the stage active at `elapsed`. Anything past the end belongs to the last stage.
    pub fn stage_at(&self, elapsed: Duration) -> usize {
        self.ends
            .iter()
            .position(|end| elapsed < *end)
            .unwrap_or(self.stages.len() - 1)
    }

    /// Target concurrency at `elapsed`.
    pub fn target_at(&self, elapsed: Duration) -> u64 {
        if elapsed >= self.total {
            return self.stages[self.stages.len() - 1].target;
        }

        let idx = self.stage_at(elapsed);
        let stage = &self.stages[idx];
        let from = if idx == 0 {
            0
        } else {
            self.stages[idx - 1].target
        };

        match stage.ramp {
            Ramp::Step => stage.target,
            Ramp::Linear => {
                let start = self.ends[idx] - stage.duration;
                let progress = (elapsed - start).as_secs_f64() / stage.duration.as_secs_f64();
                let target = from as f64 + (stage.target as f64 - from as f64) * progress;
                target.round().max(0.) as u64
            }
        }
    }
}
