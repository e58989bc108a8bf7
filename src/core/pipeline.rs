//! Pipeline domain model

use crate::core::{
    config::PipelineConfig,
    context::PipelineContext,
    stage::Stage,
    state::{ExecutionStatus, PipelineState, RunState},
    step::StepDefaults,
    trigger::TriggerContext,
};
use anyhow::Result;
use std::collections::{HashMap, HashSet};

/// A pipeline definition
#[derive(Debug, Clone)]
pub struct Pipeline {
    /// Pipeline name
    pub name: String,

    /// Global variables available to all steps
    pub variables: HashMap<String, String>,

    /// Environment exported to all steps
    pub env: HashMap<String, String>,

    /// Pipeline stages
    pub stages: HashMap<String, Stage>,

    /// Shell used to run commands
    pub shell: String,

    /// Timeout for commands without their own (steps and deploy actions)
    pub default_timeout_secs: u64,

    /// Execution state
    pub state: PipelineState,

    /// Stage execution order (topological sort)
    execution_order: Vec<String>,
}

impl Pipeline {
    /// Create a pipeline from configuration
    pub fn from_config(config: &PipelineConfig) -> Result<Self> {
        let mut defaults = StepDefaults::default();
        if let Some(timeout) = config.default_timeout_secs {
            defaults.timeout_secs = timeout;
        }

        let mut stages = HashMap::new();
        for stage_config in &config.stages {
            let stage = Stage::from_config(stage_config, &defaults)?;
            stages.insert(stage.id.clone(), stage);
        }

        let execution_order = Self::topological_sort(&stages);

        Ok(Pipeline {
            name: config.name.clone(),
            variables: config.variables_as_string_map(),
            env: config.env.clone(),
            stages,
            shell: config.shell.clone().unwrap_or_else(|| "sh".to_string()),
            default_timeout_secs: defaults.timeout_secs,
            state: PipelineState::new(),
            execution_order,
        })
    }

    /// Get a stage by ID
    pub fn stage(&self, id: &str) -> Option<&Stage> {
        self.stages.get(id)
    }

    /// Get a mutable stage by ID
    pub fn stage_mut(&mut self, id: &str) -> Option<&mut Stage> {
        self.stages.get_mut(id)
    }

    /// Stages in execution order
    pub fn ordered_stages(&self) -> impl Iterator<Item = &Stage> {
        self.execution_order.iter().filter_map(|id| self.stages.get(id))
    }

    /// Get execution order (topological sort)
    pub fn execution_order(&self) -> &[String] {
        &self.execution_order
    }

    /// Total number of matrix jobs across all stages
    pub fn total_jobs(&self) -> usize {
        self.stages.values().map(|s| s.jobs.len()).sum()
    }

    /// IDs of stages that completed successfully
    pub fn succeeded_stages(&self) -> HashSet<String> {
        self.stages
            .values()
            .filter(|s| s.state.is_completed())
            .map(|s| s.id.clone())
            .collect()
    }

    /// Check if every stage reached a terminal state
    pub fn is_complete(&self) -> bool {
        self.stages.values().all(|s| s.state.is_terminal())
    }

    /// Check if pipeline has failed
    pub fn has_failed(&self) -> bool {
        self.state.status == ExecutionStatus::Failed
    }

    /// Recompute stage and job counters from stage states
    pub fn update_counts(&mut self) {
        let mut completed = 0;
        let mut failed = 0;
        let mut skipped = 0;
        let mut failed_jobs = 0;

        for stage in self.stages.values() {
            match &stage.state {
                RunState::Completed { .. } => completed += 1,
                RunState::Failed { .. } => failed += 1,
                RunState::Skipped { .. } => skipped += 1,
                _ => {}
            }
            failed_jobs += stage.failed_jobs().len();
        }

        self.state.total_stages = self.stages.len();
        self.state.completed_stages = completed;
        self.state.failed_stages = failed;
        self.state.skipped_stages = skipped;
        self.state.failed_jobs = failed_jobs;
    }

    /// Calculate topological sort of stages based on dependencies
    fn topological_sort(stages: &HashMap<String, Stage>) -> Vec<String> {
        let mut result = Vec::new();
        let mut visited = HashSet::new();

        // Sort for deterministic order
        let mut stage_ids: Vec<_> = stages.keys().cloned().collect();
        stage_ids.sort();

        for stage_id in stage_ids {
            Self::visit(&stage_id, stages, &mut visited, &mut result);
        }

        result
    }

    fn visit(
        stage_id: &str,
        stages: &HashMap<String, Stage>,
        visited: &mut HashSet<String>,
        result: &mut Vec<String>,
    ) {
        if !visited.insert(stage_id.to_string()) {
            return;
        }

        if let Some(stage) = stages.get(stage_id) {
            let mut deps = stage.dependencies.clone();
            deps.sort();
            for dep in &deps {
                Self::visit(dep, stages, visited, result);
            }
        }

        result.push(stage_id.to_string());
    }

    /// Create execution context for one job of a stage
    pub fn create_context_for_job(
        &self,
        stage_id: &str,
        job_index: usize,
        trigger: &TriggerContext,
    ) -> PipelineContext {
        let mut context = PipelineContext::new();
        context.variables.extend(self.variables.clone());
        context.env.extend(self.env.clone());
        context.trigger = trigger.clone();

        if let Some(stage) = self.stage(stage_id) {
            context.env.extend(stage.env.clone());
            if let Some(job) = stage.jobs.get(job_index) {
                context.matrix = job.matrix.clone();
                context.current_job_id = Some(job.id.clone());
            }
        }

        context
    }
}
