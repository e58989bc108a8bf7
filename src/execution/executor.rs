//! Job executor - runs the steps of one matrix job

use crate::{
    core::{secret::Redactor, Job, PipelineContext},
    execution::runner::{CommandRunner, CommandSpec},
};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Outcome of a single step
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepResult {
    /// Step display name
    pub name: String,

    /// Rendered command (secrets redacted)
    pub command: String,

    /// Exit code, `None` when the command never finished
    pub exit_code: Option<i32>,

    /// Combined output (secrets redacted)
    pub output: String,

    /// Error message for a failed step
    pub error: Option<String>,
}

impl StepResult {
    pub fn succeeded(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Result of executing a job
#[derive(Debug, Clone)]
pub enum ExecutionResult {
    /// Every step exited zero (or was allowed to fail)
    Success { steps: Vec<StepResult> },
    /// A step failed; later steps were not run
    Failed {
        error: String,
        failed_step: String,
        steps: Vec<StepResult>,
    },
}

impl ExecutionResult {
    pub fn is_success(&self) -> bool {
        matches!(self, ExecutionResult::Success { .. })
    }

    pub fn steps(&self) -> &[StepResult] {
        match self {
            ExecutionResult::Success { steps } | ExecutionResult::Failed { steps, .. } => steps,
        }
    }
}

/// Executes the steps of a job in order
pub struct JobExecutor<R: ?Sized> {
    runner: Arc<R>,
    dry_run: bool,
}

impl<R: CommandRunner + ?Sized> JobExecutor<R> {
    pub fn new(runner: Arc<R>) -> Self {
        Self {
            runner,
            dry_run: false,
        }
    }

    /// Report commands instead of running them
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Execute a job and return the result
    pub async fn execute(
        &self,
        job: &Job,
        context: &PipelineContext,
        redactor: &Redactor,
    ) -> ExecutionResult {
        info!("Executing job: {}", job.id);

        let variables = context.get_rendering_variables();
        let mut results = Vec::with_capacity(job.steps.len());

        for step in &job.steps {
            let command = step.render_command(&variables);
            let shown = redactor.redact(&command);
            debug!("Step '{}' of {}: {}", step.name, job.id, shown);

            if self.dry_run {
                results.push(StepResult {
                    name: step.name.clone(),
                    command: shown.clone(),
                    exit_code: Some(0),
                    output: format!("[dry-run] {}", shown),
                    error: None,
                });
                continue;
            }

            let mut spec = CommandSpec::new(command)
                .with_envs(context.step_env(&step.env))
                .with_timeout(step.timeout_secs);
            if let Some(dir) = &step.working_dir {
                spec = spec.in_dir(dir);
            }

            let (exit_code, output, error) = match self.runner.run(&spec).await {
                Ok(out) if out.is_success() => (Some(0), redactor.redact(&out.combined()), None),
                Ok(out) => {
                    let message = format!("'{}' exited with code {}", step.name, out.exit_code);
                    (Some(out.exit_code), redactor.redact(&out.combined()), Some(message))
                }
                Err(e) => {
                    error!("Runner error for step '{}' of {}: {}", step.name, job.id, e);
                    (None, String::new(), Some(format!("'{}': {}", step.name, e)))
                }
            };

            let result = StepResult {
                name: step.name.clone(),
                command: shown,
                exit_code,
                output,
                error: error.clone(),
            };
            results.push(result);

            if let Some(message) = error {
                if step.continue_on_error {
                    warn!("{} (continue_on_error, job {} keeps going)", message, job.id);
                    continue;
                }
                warn!("Job {} failed: {}", job.id, message);
                return ExecutionResult::Failed {
                    error: message,
                    failed_step: step.name.clone(),
                    steps: results,
                };
            }
        }

        info!("Job {} completed successfully", job.id);
        ExecutionResult::Success { steps: results }
    }
}
