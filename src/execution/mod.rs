//! Pipeline execution engine

pub mod engine;
pub mod executor;
pub mod runner;
pub mod scheduler;

pub use engine::{EventHandler, ExecutionEngine, ExecutionEvent};
pub use executor::{ExecutionResult, JobExecutor, StepResult};
pub use runner::{CommandOutput, CommandRunner, CommandSpec, RunnerError, ShellRunner};
pub use scheduler::{ExecutionScheduler, SchedulingStrategy};
