//! Execution state models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Overall pipeline execution status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionStatus {
    /// Pipeline has not started
    Pending,
    /// Pipeline is currently running
    Running,
    /// Pipeline completed successfully
    Completed,
    /// Pipeline failed
    Failed,
    /// Pipeline was cancelled
    Cancelled,
}

impl ExecutionStatus {
    /// Parse the stored representation back into a status
    pub fn from_name(name: &str) -> Self {
        match name {
            "Running" => ExecutionStatus::Running,
            "Completed" => ExecutionStatus::Completed,
            "Failed" => ExecutionStatus::Failed,
            "Cancelled" => ExecutionStatus::Cancelled,
            _ => ExecutionStatus::Pending,
        }
    }
}

/// State of a stage or of a single matrix job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum RunState {
    /// Waiting to run
    Pending,
    /// Currently running
    Running {
        started_at: DateTime<Utc>,
    },
    /// Finished with every command exiting zero
    Completed {
        started_at: DateTime<Utc>,
        completed_at: DateTime<Utc>,
    },
    /// A command exited non-zero or could not be run
    Failed {
        error: String,
        started_at: DateTime<Utc>,
        failed_at: DateTime<Utc>,
    },
    /// Not run: condition false or an upstream stage did not succeed
    Skipped {
        reason: String,
    },
}

impl RunState {
    /// Check if the state is terminal
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunState::Completed { .. } | RunState::Failed { .. } | RunState::Skipped { .. }
        )
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, RunState::Completed { .. })
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, RunState::Failed { .. })
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, RunState::Skipped { .. })
    }

    /// Transition to `Running`, stamping the start time
    pub fn start() -> Self {
        RunState::Running {
            started_at: Utc::now(),
        }
    }

    /// Finish successfully, keeping the start time of a running state
    pub fn complete(&self) -> Self {
        RunState::Completed {
            started_at: self.started_at(),
            completed_at: Utc::now(),
        }
    }

    /// Finish with an error, keeping the start time of a running state
    pub fn fail(&self, error: impl Into<String>) -> Self {
        RunState::Failed {
            error: error.into(),
            started_at: self.started_at(),
            failed_at: Utc::now(),
        }
    }

    fn started_at(&self) -> DateTime<Utc> {
        match self {
            RunState::Running { started_at }
            | RunState::Completed { started_at, .. }
            | RunState::Failed { started_at, .. } => *started_at,
            _ => Utc::now(),
        }
    }
}

/// Overall pipeline state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineState {
    /// Unique execution ID
    pub execution_id: Uuid,

    /// Current execution status
    pub status: ExecutionStatus,

    /// When execution started
    pub started_at: Option<DateTime<Utc>>,

    /// When execution completed/failed
    pub completed_at: Option<DateTime<Utc>>,

    /// Total number of stages
    pub total_stages: usize,

    /// Number of completed stages
    pub completed_stages: usize,

    /// Number of failed stages
    pub failed_stages: usize,

    /// Number of skipped stages
    pub skipped_stages: usize,

    /// Total number of matrix jobs across all stages
    pub total_jobs: usize,

    /// Number of failed matrix jobs
    pub failed_jobs: usize,
}

impl PipelineState {
    /// Create a new pipeline state
    pub fn new() -> Self {
        Self {
            execution_id: Uuid::new_v4(),
            status: ExecutionStatus::Pending,
            started_at: None,
            completed_at: None,
            total_stages: 0,
            completed_stages: 0,
            failed_stages: 0,
            skipped_stages: 0,
            total_jobs: 0,
            failed_jobs: 0,
        }
    }

    /// Mark pipeline as started
    pub fn start(&mut self, total_stages: usize, total_jobs: usize) {
        self.status = ExecutionStatus::Running;
        self.started_at = Some(Utc::now());
        self.total_stages = total_stages;
        self.total_jobs = total_jobs;
    }

    /// Mark pipeline as completed
    pub fn complete(&mut self) {
        self.status = ExecutionStatus::Completed;
        self.completed_at = Some(Utc::now());
    }

    /// Mark pipeline as failed
    pub fn fail(&mut self) {
        self.status = ExecutionStatus::Failed;
        self.completed_at = Some(Utc::now());
    }

    /// Calculate progress (0.0 to 1.0)
    pub fn progress(&self) -> f64 {
        if self.total_stages == 0 {
            return 0.0;
        }
        (self.completed_stages + self.failed_stages + self.skipped_stages) as f64
            / self.total_stages as f64
    }
}

impl Default for PipelineState {
    fn default() -> Self {
        Self::new()
    }
}
