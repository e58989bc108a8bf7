//! Main execution engine - orchestrates the entire pipeline run

use crate::{
    core::{secret::Redactor, ExecutionStatus, Pipeline, RunState, Stage, TriggerContext},
    deploy::{deployer_for, execute_plan, DeployContext},
    execution::{
        executor::{ExecutionResult, JobExecutor},
        runner::CommandRunner,
        scheduler::{ExecutionScheduler, SchedulingStrategy},
    },
};
use anyhow::{bail, Result};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Events that can occur during pipeline execution
#[derive(Debug, Clone)]
pub enum ExecutionEvent {
    PipelineStarted {
        execution_id: Uuid,
        pipeline_name: String,
        trigger: String,
    },
    StageStarted {
        stage_id: String,
        jobs: usize,
    },
    StageSkipped {
        stage_id: String,
        reason: String,
    },
    JobStarted {
        stage_id: String,
        job_id: String,
    },
    StepOutput {
        job_id: String,
        step: String,
        output: String,
    },
    JobCompleted {
        stage_id: String,
        job_id: String,
    },
    JobFailed {
        stage_id: String,
        job_id: String,
        step: String,
        error: String,
    },
    DeployStarted {
        stage_id: String,
        provider: String,
    },
    DeploySkipped {
        stage_id: String,
        provider: String,
        reason: String,
    },
    DeployCompleted {
        stage_id: String,
        provider: String,
        actions: usize,
    },
    DeployFailed {
        stage_id: String,
        provider: String,
        error: String,
    },
    StageCompleted {
        stage_id: String,
    },
    StageFailed {
        stage_id: String,
        error: String,
        allowed: bool,
    },
    PipelineCompleted {
        execution_id: Uuid,
        status: ExecutionStatus,
    },
}

/// Type for event handlers
pub type EventHandler = Arc<dyn Fn(ExecutionEvent) + Send + Sync>;

/// Main pipeline execution engine
pub struct ExecutionEngine {
    runner: Arc<dyn CommandRunner>,
    scheduler: ExecutionScheduler,
    event_handlers: Arc<Mutex<Vec<EventHandler>>>,
    dry_run: bool,
    working_dir: PathBuf,
    env: HashMap<String, String>,
}

impl ExecutionEngine {
    pub fn new(runner: Arc<dyn CommandRunner>, strategy: SchedulingStrategy) -> Self {
        Self {
            runner,
            scheduler: ExecutionScheduler::new(strategy),
            event_handlers: Arc::new(Mutex::new(Vec::new())),
            dry_run: false,
            working_dir: PathBuf::from("."),
            env: std::env::vars().collect(),
        }
    }

    /// Report commands instead of running them
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Directory deploy paths are resolved against
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = dir.into();
        self
    }

    /// Environment credentials are resolved from (default: the process env)
    pub fn with_env(mut self, env: HashMap<String, String>) -> Self {
        self.env = env;
        self
    }

    /// Add an event handler
    pub fn add_event_handler<F>(&self, handler: F)
    where
        F: Fn(ExecutionEvent) + Send + Sync + 'static,
    {
        if let Ok(mut handlers) = self.event_handlers.lock() {
            handlers.push(Arc::new(handler));
        }
    }

    /// Emit an event to all handlers
    fn emit_event(&self, event: ExecutionEvent) {
        let handlers = match self.event_handlers.lock() {
            Ok(handlers) => handlers.clone(),
            Err(_) => return,
        };
        for handler in handlers.iter() {
            handler(event.clone());
        }
    }

    /// Execute the entire pipeline
    ///
    /// Returns an error when a stage without `allow_failure` failed; the
    /// pipeline state is updated either way.
    pub async fn execute(&self, pipeline: &mut Pipeline, trigger: &TriggerContext) -> Result<()> {
        let execution_id = pipeline.state.execution_id;
        let pipeline_name = pipeline.name.clone();

        info!(
            "Starting pipeline execution: {} ({}, {})",
            pipeline_name,
            execution_id,
            trigger.describe()
        );
        self.emit_event(ExecutionEvent::PipelineStarted {
            execution_id,
            pipeline_name: pipeline_name.clone(),
            trigger: trigger.describe(),
        });

        let total_stages = pipeline.stages.len();
        let total_jobs = pipeline.total_jobs();
        pipeline.state.start(total_stages, total_jobs);

        let redactor = self.build_redactor(pipeline, trigger);

        let order = pipeline.execution_order().to_vec();
        for stage_id in &order {
            self.execute_stage(pipeline, stage_id, trigger, &redactor).await;
            pipeline.update_counts();
        }

        let failed: Vec<String> = pipeline
            .ordered_stages()
            .filter(|s| s.state.is_failed() && !s.allow_failure)
            .map(|s| s.id.clone())
            .collect();

        let status = if failed.is_empty() {
            pipeline.state.complete();
            ExecutionStatus::Completed
        } else {
            pipeline.state.fail();
            ExecutionStatus::Failed
        };

        info!("Pipeline execution finished: {} - {:?}", pipeline_name, status);
        self.emit_event(ExecutionEvent::PipelineCompleted {
            execution_id,
            status,
        });

        if !failed.is_empty() {
            bail!("Pipeline '{}' failed in stage(s): {}", pipeline_name, failed.join(", "));
        }
        Ok(())
    }

    /// Mask every credential the deploy targets can resolve
    fn build_redactor(&self, pipeline: &Pipeline, trigger: &TriggerContext) -> Redactor {
        let mut redactor = Redactor::new();
        let ctx = self.deploy_context(pipeline, trigger);
        for stage in pipeline.stages.values() {
            for target in &stage.deploy {
                for secret in deployer_for(&target.config).secrets(&ctx) {
                    redactor.add(&secret);
                }
            }
        }
        redactor
    }

    fn deploy_context(&self, pipeline: &Pipeline, trigger: &TriggerContext) -> DeployContext {
        let mut ctx = DeployContext::new(trigger.clone(), self.working_dir.clone());
        ctx.variables.extend(pipeline.variables.clone());
        ctx.env = self.env.clone();
        ctx.resolve_secrets = !self.dry_run;
        ctx.timeout_secs = pipeline.default_timeout_secs;
        ctx
    }

    /// Execute a single stage: gate, jobs, then deploy targets
    async fn execute_stage(
        &self,
        pipeline: &mut Pipeline,
        stage_id: &str,
        trigger: &TriggerContext,
        redactor: &Redactor,
    ) {
        let mut stage = match pipeline.stage(stage_id) {
            Some(stage) => stage.clone(),
            None => {
                error!("Stage {} not found", stage_id);
                return;
            }
        };

        if let Some(reason) = skip_reason(&stage, &pipeline.succeeded_stages(), trigger) {
            info!("Skipping stage {}: {}", stage_id, reason);
            for job in &mut stage.jobs {
                job.state = RunState::Skipped {
                    reason: reason.clone(),
                };
            }
            stage.state = RunState::Skipped {
                reason: reason.clone(),
            };
            self.emit_event(ExecutionEvent::StageSkipped {
                stage_id: stage_id.to_string(),
                reason,
            });
            store(pipeline, stage);
            return;
        }

        stage.state = RunState::start();
        self.emit_event(ExecutionEvent::StageStarted {
            stage_id: stage_id.to_string(),
            jobs: stage.jobs.len(),
        });

        self.execute_jobs(pipeline, &mut stage, trigger, redactor).await;

        let failed: Vec<String> = stage.failed_jobs().iter().map(|j| j.id.clone()).collect();
        if !failed.is_empty() {
            let error = format!(
                "{} of {} job(s) failed: {}",
                failed.len(),
                stage.jobs.len(),
                failed.join(", ")
            );
            self.fail_stage(pipeline, stage, error);
            return;
        }

        if let Err(error) = self.execute_deploys(pipeline, &mut stage, trigger, redactor).await {
            self.fail_stage(pipeline, stage, error);
            return;
        }

        stage.state = stage.state.complete();
        info!("Stage {} completed", stage_id);
        self.emit_event(ExecutionEvent::StageCompleted {
            stage_id: stage_id.to_string(),
        });
        store(pipeline, stage);
    }

    /// Run the matrix jobs of a stage under the scheduling strategy
    async fn execute_jobs(
        &self,
        pipeline: &Pipeline,
        stage: &mut Stage,
        trigger: &TriggerContext,
        redactor: &Redactor,
    ) {
        let executor = Arc::new(JobExecutor::new(self.runner.clone()).dry_run(self.dry_run));
        let redactor = Arc::new(redactor.clone());
        let mut tasks = JoinSet::new();
        let mut running = 0;

        loop {
            for index in self.scheduler.next_jobs(stage, running) {
                let job = stage.jobs[index].clone();
                let context = pipeline.create_context_for_job(&stage.id, index, trigger);
                stage.jobs[index].state = RunState::start();
                self.emit_event(ExecutionEvent::JobStarted {
                    stage_id: stage.id.clone(),
                    job_id: job.id.clone(),
                });

                let executor = executor.clone();
                let redactor = redactor.clone();
                tasks.spawn(async move {
                    let result = executor.execute(&job, &context, &redactor).await;
                    (index, result)
                });
                running += 1;
            }

            match tasks.join_next().await {
                Some(Ok((index, result))) => {
                    running -= 1;
                    self.record_job(stage, index, result);
                }
                Some(Err(e)) => {
                    running -= 1;
                    error!("Job task of stage {} aborted: {}", stage.id, e);
                }
                None => break,
            }
        }

        // a job whose task died never reported back
        for job in stage.jobs.iter_mut() {
            if matches!(job.state, RunState::Running { .. }) {
                job.state = job.state.fail("job task aborted");
            }
        }
    }

    fn record_job(&self, stage: &mut Stage, index: usize, result: ExecutionResult) {
        let stage_id = stage.id.clone();
        let job = &mut stage.jobs[index];

        for step in result.steps() {
            if !step.output.is_empty() {
                self.emit_event(ExecutionEvent::StepOutput {
                    job_id: job.id.clone(),
                    step: step.name.clone(),
                    output: step.output.clone(),
                });
            }
        }

        match result {
            ExecutionResult::Success { .. } => {
                job.state = job.state.complete();
                debug!("Job {} completed", job.id);
                self.emit_event(ExecutionEvent::JobCompleted {
                    stage_id,
                    job_id: job.id.clone(),
                });
            }
            ExecutionResult::Failed {
                error, failed_step, ..
            } => {
                job.state = job.state.fail(error.clone());
                self.emit_event(ExecutionEvent::JobFailed {
                    stage_id,
                    job_id: job.id.clone(),
                    step: failed_step,
                    error,
                });
            }
        }
    }

    /// Run the deploy targets whose condition holds, in declared order
    async fn execute_deploys(
        &self,
        pipeline: &Pipeline,
        stage: &mut Stage,
        trigger: &TriggerContext,
        redactor: &Redactor,
    ) -> std::result::Result<(), String> {
        if stage.deploy.is_empty() {
            return Ok(());
        }

        let ctx = self.deploy_context(pipeline, trigger);

        for target in stage.deploy.clone() {
            let provider = target.config.provider_name().to_string();

            if !target.condition.evaluate(trigger) {
                let reason = format!("condition '{}' not met ({})", target.condition, trigger.describe());
                info!("Skipping {} deploy of stage {}: {}", provider, stage.id, reason);
                self.emit_event(ExecutionEvent::DeploySkipped {
                    stage_id: stage.id.clone(),
                    provider,
                    reason,
                });
                continue;
            }

            info!("Deploying stage {} to {}", stage.id, provider);
            self.emit_event(ExecutionEvent::DeployStarted {
                stage_id: stage.id.clone(),
                provider: provider.clone(),
            });

            let deployer = deployer_for(&target.config);
            let outcome = match deployer.plan(&ctx) {
                Ok(plan) => execute_plan(self.runner.as_ref(), &plan, redactor, self.dry_run).await,
                Err(e) => Err(e),
            };

            match outcome {
                Ok(results) => {
                    for result in &results {
                        if !result.output.is_empty() {
                            self.emit_event(ExecutionEvent::StepOutput {
                                job_id: format!("{} [{}]", stage.id, provider),
                                step: result.name.clone(),
                                output: result.output.clone(),
                            });
                        }
                    }
                    stage.deployed.push(provider.clone());
                    self.emit_event(ExecutionEvent::DeployCompleted {
                        stage_id: stage.id.clone(),
                        provider,
                        actions: results.len(),
                    });
                }
                Err(e) => {
                    let error = redactor.redact(&e.to_string());
                    warn!("Deploy {} of stage {} failed: {}", provider, stage.id, error);
                    self.emit_event(ExecutionEvent::DeployFailed {
                        stage_id: stage.id.clone(),
                        provider: provider.clone(),
                        error: error.clone(),
                    });
                    return Err(format!("{} deploy failed: {}", provider, error));
                }
            }
        }

        Ok(())
    }

    fn fail_stage(&self, pipeline: &mut Pipeline, mut stage: Stage, error: String) {
        if stage.allow_failure {
            warn!("Stage {} failed (allowed): {}", stage.id, error);
        } else {
            error!("Stage {} failed: {}", stage.id, error);
        }
        stage.state = stage.state.fail(error.clone());
        self.emit_event(ExecutionEvent::StageFailed {
            stage_id: stage.id.clone(),
            error,
            allowed: stage.allow_failure,
        });
        store(pipeline, stage);
    }
}

/// Why a stage must not run, if it must not
fn skip_reason(
    stage: &Stage,
    succeeded: &std::collections::HashSet<String>,
    trigger: &TriggerContext,
) -> Option<String> {
    if let Some(dep) = stage.unmet_dependency(succeeded) {
        return Some(format!("dependency '{}' did not succeed", dep));
    }
    if !stage.condition.evaluate(trigger) {
        return Some(format!(
            "condition '{}' not met ({})",
            stage.condition,
            trigger.describe()
        ));
    }
    None
}

fn store(pipeline: &mut Pipeline, stage: Stage) {
    if let Some(slot) = pipeline.stage_mut(&stage.id) {
        *slot = stage;
    }
}
