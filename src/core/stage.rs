//! Stage and job domain models

use crate::core::{
    condition::Condition,
    config::{DeployConfig, StageConfig},
    matrix::{describe_combination, MatrixCombination},
    state::RunState,
    step::{Step, StepDefaults},
};
use anyhow::{bail, Context, Result};
use std::collections::{HashMap, HashSet};

/// One matrix combination of a stage
#[derive(Debug, Clone)]
pub struct Job {
    /// `test` or `test (python=3.6)`
    pub id: String,

    /// Owning stage
    pub stage_id: String,

    /// Matrix values of this job
    pub matrix: MatrixCombination,

    /// Commands, run in order
    pub steps: Vec<Step>,

    /// Runtime state
    pub state: RunState,
}

/// A deploy target with its parsed condition
#[derive(Debug, Clone)]
pub struct DeployTarget {
    pub config: DeployConfig,
    pub condition: Condition,
}

/// A named phase of the pipeline
#[derive(Debug, Clone)]
pub struct Stage {
    /// Unique stage identifier
    pub id: String,

    /// Display name
    pub name: String,

    /// Stages that must succeed first
    pub dependencies: Vec<String>,

    /// Gate evaluated against the trigger
    pub condition: Condition,

    /// Extra environment for every job
    pub env: HashMap<String, String>,

    /// Expanded matrix jobs
    pub jobs: Vec<Job>,

    /// Deploy targets, run after all jobs succeed
    pub deploy: Vec<DeployTarget>,

    /// A failing stage does not fail the pipeline
    pub allow_failure: bool,

    /// Runtime state
    pub state: RunState,

    /// Providers that deployed successfully
    pub deployed: Vec<String>,
}

impl Stage {
    /// Create a stage from a stage config, expanding its matrix
    pub fn from_config(config: &StageConfig, defaults: &StepDefaults) -> Result<Self> {
        let stage_defaults = StepDefaults {
            timeout_secs: config.timeout_secs.unwrap_or(defaults.timeout_secs),
        };
        let steps: Vec<Step> = config
            .steps
            .iter()
            .map(|s| Step::from_config(s, &stage_defaults))
            .collect();

        let combinations = config
            .matrix
            .as_ref()
            .map(|m| m.expand())
            .transpose()
            .with_context(|| format!("Failed to expand matrix of stage '{}'", config.id))?
            .unwrap_or_else(|| vec![MatrixCombination::new()]);
        if combinations.is_empty() {
            bail!("Matrix of stage '{}' expands to no jobs", config.id);
        }

        let jobs = combinations
            .into_iter()
            .map(|matrix| Job {
                id: job_id(&config.id, &matrix),
                stage_id: config.id.clone(),
                matrix,
                steps: steps.clone(),
                state: RunState::Pending,
            })
            .collect();

        let condition = match &config.condition {
            Some(expr) => Condition::parse(expr)?,
            None => Condition::Always,
        };

        let deploy = config
            .deploy
            .iter()
            .map(|target| {
                let condition = match target.condition_expr() {
                    Some(expr) => Condition::parse(expr)?,
                    None => Condition::tagged(),
                };
                Ok(DeployTarget {
                    config: target.clone(),
                    condition,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Stage {
            id: config.id.clone(),
            name: config.name.clone().unwrap_or_else(|| config.id.clone()),
            dependencies: config.depends_on.clone(),
            condition,
            env: config.env.clone(),
            jobs,
            deploy,
            allow_failure: config.allow_failure,
            state: RunState::Pending,
            deployed: Vec::new(),
        })
    }

    /// First dependency, in declared order, that has not succeeded
    pub fn unmet_dependency(&self, succeeded: &HashSet<String>) -> Option<&str> {
        self.dependencies
            .iter()
            .find(|dep| !succeeded.contains(*dep))
            .map(|dep| dep.as_str())
    }

    pub fn failed_jobs(&self) -> Vec<&Job> {
        self.jobs.iter().filter(|j| j.state.is_failed()).collect()
    }

    pub fn job(&self, id: &str) -> Option<&Job> {
        self.jobs.iter().find(|j| j.id == id)
    }
}

fn job_id(stage_id: &str, matrix: &MatrixCombination) -> String {
    if matrix.is_empty() {
        stage_id.to_string()
    } else {
        format!("{} ({})", stage_id, describe_combination(matrix))
    }
}
