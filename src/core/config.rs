//! Pipeline configuration from YAML

use crate::core::{condition::Condition, matrix::MatrixConfig, secret::SecretRef, Pipeline};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use std::collections::{HashMap, HashSet};
use std::path::Path;

/// Top-level pipeline configuration loaded from YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Pipeline name
    pub name: String,

    /// Pipeline version (optional)
    #[serde(default)]
    pub version: Option<String>,

    /// Variables substituted into commands as `{{ name }}`
    #[serde(default)]
    variables: HashMap<String, Value>,

    /// Environment exported to every step
    #[serde(default)]
    pub env: HashMap<String, String>,

    /// Pipeline stages
    pub stages: Vec<StageConfig>,

    /// Default timeout for steps (in seconds)
    #[serde(default)]
    pub default_timeout_secs: Option<u64>,

    /// Shell used to run commands (default `sh`)
    #[serde(default)]
    pub shell: Option<String>,
}

/// Stage configuration as defined in YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageConfig {
    /// Unique stage identifier
    pub id: String,

    /// Human-readable stage name
    #[serde(default)]
    pub name: Option<String>,

    /// Optional stage description
    #[serde(default)]
    pub description: Option<String>,

    /// List of stage IDs that must succeed first
    #[serde(default)]
    pub depends_on: Vec<String>,

    /// Condition expression gating the stage
    #[serde(default, rename = "if")]
    pub condition: Option<String>,

    /// Build matrix
    #[serde(default)]
    pub matrix: Option<MatrixConfig>,

    /// Environment for every step of this stage
    #[serde(default)]
    pub env: HashMap<String, String>,

    /// Commands run for each matrix job
    #[serde(default)]
    pub steps: Vec<StepConfig>,

    /// Deploy targets run once after all jobs succeed
    #[serde(default)]
    pub deploy: Vec<DeployConfig>,

    /// A failing stage does not fail the pipeline
    #[serde(default)]
    pub allow_failure: bool,

    /// Timeout for every step in this stage (overrides global)
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

/// Step configuration as defined in YAML
///
/// Either a bare command string or a mapping:
///
/// ```yaml
/// steps:
///   - pip install .
///   - name: test
///     run: python -m pytest
///     timeout_secs: 600
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StepConfig {
    Command(String),
    Detailed(DetailedStepConfig),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetailedStepConfig {
    #[serde(default)]
    pub name: Option<String>,

    /// Shell command template
    pub run: String,

    #[serde(default)]
    pub timeout_secs: Option<u64>,

    #[serde(default)]
    pub env: HashMap<String, String>,

    /// A non-zero exit is logged but does not fail the job
    #[serde(default)]
    pub continue_on_error: bool,

    /// Working directory, relative to the pipeline working directory
    #[serde(default)]
    pub working_dir: Option<String>,
}

impl StepConfig {
    pub fn detailed(&self) -> DetailedStepConfig {
        match self {
            StepConfig::Command(run) => DetailedStepConfig {
                name: None,
                run: run.clone(),
                timeout_secs: None,
                env: HashMap::new(),
                continue_on_error: false,
                working_dir: None,
            },
            StepConfig::Detailed(d) => d.clone(),
        }
    }
}

/// Deploy target configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "provider", rename_all = "snake_case")]
pub enum DeployConfig {
    /// Publish a directory to a static pages host via git
    Pages(PagesConfig),
    /// Upload built distributions to a package index
    PackageIndex(PackageIndexConfig),
}

impl DeployConfig {
    pub fn provider_name(&self) -> &'static str {
        match self {
            DeployConfig::Pages(_) => "pages",
            DeployConfig::PackageIndex(_) => "package_index",
        }
    }

    /// Raw condition expression (default: only on tags)
    pub fn condition_expr(&self) -> Option<&str> {
        match self {
            DeployConfig::Pages(c) => c.condition.as_deref(),
            DeployConfig::PackageIndex(c) => c.condition.as_deref(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PagesConfig {
    /// Directory whose contents are published
    pub local_dir: String,

    /// `owner/name` on the pages host
    #[serde(default)]
    pub repo: Option<String>,

    /// Git host (default `github.com`)
    #[serde(default = "default_pages_host")]
    pub host: String,

    /// Branch served by the host
    #[serde(default = "default_pages_branch")]
    pub target_branch: String,

    /// Access token
    pub token: SecretRef,

    /// Custom domain written to a CNAME file
    #[serde(default)]
    pub cname: Option<String>,

    #[serde(default = "default_committer_name")]
    pub committer_name: String,

    #[serde(default = "default_committer_email")]
    pub committer_email: String,

    /// Commit message template
    #[serde(default = "default_commit_message")]
    pub commit_message: String,

    #[serde(default, rename = "if")]
    pub condition: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageIndexConfig {
    /// Command building the distributions (`None` = skip build)
    #[serde(default = "default_build_command")]
    pub build: Option<String>,

    /// Directory holding the built distributions
    #[serde(default = "default_distributions")]
    pub distributions: String,

    /// Upload endpoint (default: the tool's own default index)
    #[serde(default)]
    pub repository_url: Option<String>,

    pub username: SecretRef,

    pub password: SecretRef,

    /// Don't fail when a file already exists on the index
    #[serde(default)]
    pub skip_existing: bool,

    #[serde(default, rename = "if")]
    pub condition: Option<String>,
}

fn default_pages_host() -> String {
    "github.com".to_string()
}

fn default_pages_branch() -> String {
    "gh-pages".to_string()
}

fn default_committer_name() -> String {
    "tagship".to_string()
}

fn default_committer_email() -> String {
    "tagship@localhost".to_string()
}

fn default_commit_message() -> String {
    "Deploy {{ tag }} to pages".to_string()
}

fn default_build_command() -> Option<String> {
    Some("python setup.py sdist bdist_wheel".to_string())
}

fn default_distributions() -> String {
    "dist".to_string()
}

impl PipelineConfig {
    /// Load pipeline configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::from_yaml(&content)
    }

    /// Parse pipeline configuration from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: PipelineConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the pipeline configuration
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            anyhow::bail!("Pipeline name must not be empty");
        }

        // Check that all stage IDs are unique
        let mut seen_ids = HashSet::new();
        for stage in &self.stages {
            if !seen_ids.insert(&stage.id) {
                anyhow::bail!("Duplicate stage ID: {}", stage.id);
            }
        }

        let stage_ids: HashSet<_> = self.stages.iter().map(|s| &s.id).collect();
        for stage in &self.stages {
            for dep in &stage.depends_on {
                if !stage_ids.contains(dep) {
                    anyhow::bail!(
                        "Stage '{}' depends on non-existent stage '{}'",
                        stage.id,
                        dep
                    );
                }
            }

            if stage.steps.is_empty() && stage.deploy.is_empty() {
                anyhow::bail!("Stage '{}' has no steps and no deploy targets", stage.id);
            }

            for step in &stage.steps {
                if step.detailed().run.trim().is_empty() {
                    anyhow::bail!("Stage '{}' has a step with an empty command", stage.id);
                }
            }

            if let Some(expr) = &stage.condition {
                Condition::parse(expr)
                    .with_context(|| format!("Stage '{}' has an invalid condition", stage.id))?;
            }

            if let Some(matrix) = &stage.matrix {
                matrix
                    .validate()
                    .with_context(|| format!("Stage '{}' has an invalid matrix", stage.id))?;
            }

            for target in &stage.deploy {
                self.validate_deploy(stage, target)?;
            }
        }

        self.check_cycles()?;

        Ok(())
    }

    fn validate_deploy(&self, stage: &StageConfig, target: &DeployConfig) -> Result<()> {
        if let Some(expr) = target.condition_expr() {
            Condition::parse(expr).with_context(|| {
                format!(
                    "Stage '{}' {} deploy has an invalid condition",
                    stage.id,
                    target.provider_name()
                )
            })?;
        }

        match target {
            DeployConfig::Pages(pages) => {
                if pages.local_dir.trim().is_empty() {
                    anyhow::bail!("Stage '{}' pages deploy needs a local_dir", stage.id);
                }
                if pages.target_branch.trim().is_empty() {
                    anyhow::bail!("Stage '{}' pages deploy needs a target_branch", stage.id);
                }
                if let Some(repo) = &pages.repo {
                    if repo.split('/').filter(|p| !p.is_empty()).count() != 2 {
                        anyhow::bail!(
                            "Stage '{}' pages repo '{}' must look like owner/name",
                            stage.id,
                            repo
                        );
                    }
                }
            }
            DeployConfig::PackageIndex(index) => {
                if index.distributions.trim().is_empty() {
                    anyhow::bail!(
                        "Stage '{}' package_index deploy needs a distributions directory",
                        stage.id
                    );
                }
            }
        }

        Ok(())
    }

    /// Check for cycles in the stage dependency graph
    fn check_cycles(&self) -> Result<()> {
        let mut visited = HashSet::new();
        let mut recursion_stack = HashSet::new();

        for stage in &self.stages {
            if !visited.contains(&stage.id) {
                self.dfs_check(&stage.id, &mut visited, &mut recursion_stack)?;
            }
        }

        Ok(())
    }

    fn dfs_check(
        &self,
        stage_id: &str,
        visited: &mut HashSet<String>,
        recursion_stack: &mut HashSet<String>,
    ) -> Result<()> {
        visited.insert(stage_id.to_string());
        recursion_stack.insert(stage_id.to_string());

        if let Some(stage) = self.stages.iter().find(|s| s.id == stage_id) {
            for dep in &stage.depends_on {
                if recursion_stack.contains(dep) {
                    anyhow::bail!("Cycle detected in stage dependencies involving '{}'", dep);
                }
                if !visited.contains(dep) {
                    self.dfs_check(dep, visited, recursion_stack)?;
                }
            }
        }

        recursion_stack.remove(stage_id);
        Ok(())
    }

    /// Variables as a string map; non-string scalars are stringified
    pub fn variables_as_string_map(&self) -> HashMap<String, String> {
        self.variables
            .iter()
            .map(|(key, value)| {
                let rendered = match value {
                    Value::String(s) => s.clone(),
                    Value::Number(n) => n.to_string(),
                    Value::Bool(b) => b.to_string(),
                    Value::Null => String::new(),
                    other => serde_yaml::to_string(other)
                        .unwrap_or_default()
                        .trim_end()
                        .to_string(),
                };
                (key.clone(), rendered)
            })
            .collect()
    }

    /// Number of variables defined in the file
    pub fn variable_count(&self) -> usize {
        self.variables.len()
    }

    /// Convert config to a Pipeline domain model
    pub fn to_pipeline(&self) -> Result<Pipeline> {
        Pipeline::from_config(self)
    }
}
