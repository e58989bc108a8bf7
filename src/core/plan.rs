//! Dry prediction of what a trigger would run
//!
//! Assumes every job that runs succeeds, so a plan shows the best case:
//! stages and deploy targets that run on a fully green build.

use crate::core::{pipeline::Pipeline, trigger::TriggerContext};
use serde::Serialize;
use std::collections::HashSet;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeployPlan {
    pub provider: String,
    pub condition: String,
    pub runs: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StagePlan {
    pub id: String,
    pub name: String,
    pub condition: String,
    pub jobs: Vec<String>,
    pub runs: bool,

    /// Why the stage would be skipped
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip_reason: Option<String>,

    pub deploy: Vec<DeployPlan>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunPlan {
    pub pipeline: String,
    pub trigger: String,
    pub stages: Vec<StagePlan>,
}

impl RunPlan {
    /// Plan a pipeline for a trigger, in execution order
    pub fn for_trigger(pipeline: &Pipeline, trigger: &TriggerContext) -> Self {
        let mut running: HashSet<String> = HashSet::new();
        let mut stages = Vec::new();

        for stage in pipeline.ordered_stages() {
            let skip_reason = match stage.unmet_dependency(&running) {
                Some(dep) => Some(format!("dependency '{}' would not run", dep)),
                None if !stage.condition.evaluate(trigger) => Some(format!(
                    "condition '{}' not met ({})",
                    stage.condition,
                    trigger.describe()
                )),
                None => None,
            };
            let runs = skip_reason.is_none();
            if runs {
                running.insert(stage.id.clone());
            }

            stages.push(StagePlan {
                id: stage.id.clone(),
                name: stage.name.clone(),
                condition: stage.condition.to_string(),
                jobs: stage.jobs.iter().map(|j| j.id.clone()).collect(),
                runs,
                skip_reason,
                deploy: stage
                    .deploy
                    .iter()
                    .map(|target| DeployPlan {
                        provider: target.config.provider_name().to_string(),
                        condition: target.condition.to_string(),
                        runs: runs && target.condition.evaluate(trigger),
                    })
                    .collect(),
            });
        }

        RunPlan {
            pipeline: pipeline.name.clone(),
            trigger: trigger.describe(),
            stages,
        }
    }

    pub fn job_count(&self) -> usize {
        self.stages.iter().filter(|s| s.runs).map(|s| s.jobs.len()).sum()
    }

    /// Providers that would deploy, in order
    pub fn deploys(&self) -> Vec<&str> {
        self.stages
            .iter()
            .flat_map(|s| s.deploy.iter())
            .filter(|d| d.runs)
            .map(|d| d.provider.as_str())
            .collect()
    }
}
