//! Execution scheduler - determines which jobs of a stage to start next

use crate::core::{RunState, Stage};
use std::fmt;
use std::str::FromStr;

/// Strategy for scheduling the matrix jobs of a stage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulingStrategy {
    /// Run jobs one at a time, in matrix order
    Sequential,

    /// Run every job of the stage at once
    Parallel,

    /// Limited parallelism (max N concurrent jobs)
    LimitedParallel(usize),
}

impl Default for SchedulingStrategy {
    fn default() -> Self {
        SchedulingStrategy::Sequential
    }
}

impl SchedulingStrategy {
    /// Build a strategy from its CLI name and an optional job limit
    pub fn from_name(name: &str, jobs: Option<usize>) -> Result<Self, String> {
        match name.parse::<SchedulingStrategy>()? {
            SchedulingStrategy::LimitedParallel(_) => {
                let max = jobs.unwrap_or(2);
                if max == 0 {
                    return Err("--jobs must be at least 1".to_string());
                }
                Ok(SchedulingStrategy::LimitedParallel(max))
            }
            other => Ok(other),
        }
    }
}

impl FromStr for SchedulingStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sequential" => Ok(SchedulingStrategy::Sequential),
            "parallel" => Ok(SchedulingStrategy::Parallel),
            "parallel-limited" | "limited" => Ok(SchedulingStrategy::LimitedParallel(2)),
            other => Err(format!(
                "unknown strategy '{}' (expected sequential, parallel or parallel-limited)",
                other
            )),
        }
    }
}

impl fmt::Display for SchedulingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchedulingStrategy::Sequential => write!(f, "sequential"),
            SchedulingStrategy::Parallel => write!(f, "parallel"),
            SchedulingStrategy::LimitedParallel(n) => write!(f, "parallel-limited ({})", n),
        }
    }
}

/// Scheduler for determining which jobs to run
#[derive(Debug, Clone, Default)]
pub struct ExecutionScheduler {
    strategy: SchedulingStrategy,
}

impl ExecutionScheduler {
    pub fn new(strategy: SchedulingStrategy) -> Self {
        Self { strategy }
    }

    pub fn strategy(&self) -> SchedulingStrategy {
        self.strategy
    }

    /// Maximum number of jobs of one stage running at the same time
    pub fn max_concurrent(&self, job_count: usize) -> usize {
        match self.strategy {
            SchedulingStrategy::Sequential => 1,
            SchedulingStrategy::Parallel => job_count.max(1),
            SchedulingStrategy::LimitedParallel(max) => max.max(1),
        }
    }

    /// Indices of pending jobs to start, given how many are already running
    pub fn next_jobs(&self, stage: &Stage, running: usize) -> Vec<usize> {
        let remaining = self.max_concurrent(stage.jobs.len()).saturating_sub(running);
        if remaining == 0 {
            return vec![];
        }

        stage
            .jobs
            .iter()
            .enumerate()
            .filter(|(_, job)| matches!(job.state, RunState::Pending))
            .take(remaining)
            .map(|(index, _)| index)
            .collect()
    }
}
