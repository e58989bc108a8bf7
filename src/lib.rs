//! tagship - staged CI pipelines with build matrices and tag-gated releases

pub mod cli;
pub mod core;
pub mod deploy;
pub mod execution;
pub mod persistence;

// Re-export commonly used types
pub use core::{
    config::PipelineConfig, Condition, ExecutionStatus, Pipeline, PipelineContext, RunPlan,
    RunState, Stage, Step, TriggerContext, TriggerEvent,
};
pub use deploy::{DeployError, Deployer};
pub use execution::{
    CommandRunner, ExecutionEngine, ExecutionEvent, SchedulingStrategy, ShellRunner,
};
