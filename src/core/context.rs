//! Pipeline context - variables and environment for one job

use crate::core::matrix::MatrixCombination;
use crate::core::trigger::TriggerContext;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Execution context for a job
///
/// Contains template variables, the exported environment and the job's
/// matrix values.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineContext {
    /// Global and user-defined variables
    pub variables: HashMap<String, String>,

    /// Environment exported to every step of the job
    pub env: HashMap<String, String>,

    /// Matrix values of the job (axis -> value)
    pub matrix: MatrixCombination,

    /// Trigger of the run
    pub trigger: TriggerContext,

    /// The job being executed (if any)
    pub current_job_id: Option<String>,
}

impl PipelineContext {
    /// Create a new empty context
    pub fn new() -> Self {
        Self::default()
    }

    /// All variables available for command rendering
    ///
    /// Trigger values (`tag`, `branch`, `commit`, `event`) come first so a
    /// user variable of the same name wins; matrix values are exposed as
    /// `matrix.<axis>`.
    pub fn get_rendering_variables(&self) -> HashMap<String, String> {
        let mut vars = self.trigger.template_variables();
        vars.extend(self.variables.clone());

        for (axis, value) in &self.matrix {
            vars.insert(format!("matrix.{}", axis), value.clone());
        }

        if let Some(ref job) = self.current_job_id {
            vars.insert("job".to_string(), job.clone());
        }

        vars
    }

    /// Environment for a step: context env, then matrix exports, then step env
    pub fn step_env(&self, step_env: &HashMap<String, String>) -> HashMap<String, String> {
        let mut env = self.env.clone();

        for (axis, value) in &self.matrix {
            env.insert(matrix_env_name(axis), value.clone());
        }
        if let Some(tag) = &self.trigger.tag {
            env.insert("TAGSHIP_TAG".to_string(), tag.clone());
        }
        if let Some(branch) = &self.trigger.branch {
            env.insert("TAGSHIP_BRANCH".to_string(), branch.clone());
        }

        env.extend(step_env.clone());
        env
    }
}

/// `python` -> `TAGSHIP_MATRIX_PYTHON`
pub fn matrix_env_name(axis: &str) -> String {
    let normalized: String = axis
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
        .collect();
    format!("TAGSHIP_MATRIX_{}", normalized)
}
