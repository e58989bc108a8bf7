//! Release deployment to a static pages host and a package index
//!
//! A [`Deployer`] turns a deploy target into a [`DeployAction`] plan. The
//! plan is executed by [`execute_plan`] through the same
//! [`CommandRunner`] that runs pipeline steps, so dry runs and tests can
//! inspect exactly what would happen. Credentials only ever travel in the
//! child environment; command lines reference them as `${VAR}` and let the
//! shell expand them.

pub mod package_index;
pub mod pages;

pub use package_index::PackageIndexDeployer;
pub use pages::PagesDeployer;

use crate::core::{
    config::DeployConfig,
    secret::{Redactor, SecretError, SecretRef},
    step::StepDefaults,
    TriggerContext,
};
use crate::execution::{
    executor::StepResult,
    runner::{CommandRunner, CommandSpec, RunnerError},
};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

/// Error types for deployments
#[derive(Debug, Error)]
pub enum DeployError {
    #[error("no artifacts found in '{}'", .0.display())]
    MissingArtifact(PathBuf),

    #[error("cannot resolve '{field}': {source}")]
    Secret {
        field: String,
        #[source]
        source: SecretError,
    },

    #[error("no repository configured; set `repo` or GITHUB_REPOSITORY / TRAVIS_REPO_SLUG")]
    MissingRepo,

    #[error("'{command}' exited with code {exit_code}: {output}")]
    CommandFailed {
        command: String,
        exit_code: i32,
        output: String,
    },

    #[error(transparent)]
    Runner(#[from] RunnerError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid artifact pattern: {0}")]
    Pattern(#[from] glob::PatternError),
}

/// One action of a deploy plan
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeployAction {
    /// Fail unless the directory holds at least one file
    EnsureArtifacts { dir: PathBuf },
    /// Delete and recreate a scratch directory
    ResetDir { dir: PathBuf },
    /// Write a small file
    WriteFile { path: PathBuf, contents: String },
    /// Run a shell command
    Run(CommandSpec),
}

impl DeployAction {
    /// One-line description for dry runs and events
    pub fn describe(&self) -> String {
        match self {
            DeployAction::EnsureArtifacts { dir } => format!("check artifacts in {}", dir.display()),
            DeployAction::ResetDir { dir } => format!("reset {}", dir.display()),
            DeployAction::WriteFile { path, .. } => format!("write {}", path.display()),
            DeployAction::Run(spec) => spec.command.clone(),
        }
    }
}

/// Everything a deployer needs to know about the run
#[derive(Debug, Clone)]
pub struct DeployContext {
    pub trigger: TriggerContext,

    /// Template variables (pipeline variables + trigger)
    pub variables: HashMap<String, String>,

    /// Environment used to resolve `{ env: NAME }` credentials
    pub env: HashMap<String, String>,

    /// Directory relative paths are resolved against
    pub working_dir: PathBuf,

    /// Substitute placeholders instead of resolving credentials
    pub resolve_secrets: bool,

    /// Timeout applied to each deploy command
    pub timeout_secs: u64,
}

impl DeployContext {
    pub fn new(trigger: TriggerContext, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            variables: trigger.template_variables(),
            trigger,
            env: std::env::vars().collect(),
            working_dir: working_dir.into(),
            resolve_secrets: true,
            timeout_secs: StepDefaults::default().timeout_secs,
        }
    }

    /// Resolve a credential, or describe it when secrets are not resolved
    pub fn secret(&self, field: &str, secret: &SecretRef) -> Result<String, DeployError> {
        if !self.resolve_secrets {
            return Ok(secret.describe());
        }
        secret.warn_if_plain(field);
        secret.resolve_with(&self.env).map_err(|source| DeployError::Secret {
            field: field.to_string(),
            source,
        })
    }

    pub fn path(&self, relative: &str) -> PathBuf {
        let path = Path::new(relative);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.working_dir.join(path)
        }
    }
}

/// Produces the plan for one deploy target
pub trait Deployer: Send + Sync {
    /// Provider name used in logs and events
    fn provider(&self) -> &'static str;

    /// Plan the actions; credentials are resolved here
    fn plan(&self, ctx: &DeployContext) -> Result<Vec<DeployAction>, DeployError>;

    /// Credentials whose values must be masked in output
    fn secrets(&self, ctx: &DeployContext) -> Vec<String>;
}

/// Build the deployer for a configured target
pub fn deployer_for(config: &DeployConfig) -> Box<dyn Deployer> {
    match config {
        DeployConfig::Pages(pages) => Box::new(PagesDeployer::new(pages.clone())),
        DeployConfig::PackageIndex(index) => Box::new(PackageIndexDeployer::new(index.clone())),
    }
}

/// Execute a plan in order, stopping at the first failure
pub async fn execute_plan<R: CommandRunner + ?Sized>(
    runner: &R,
    plan: &[DeployAction],
    redactor: &Redactor,
    dry_run: bool,
) -> Result<Vec<StepResult>, DeployError> {
    let mut results = Vec::with_capacity(plan.len());

    for action in plan {
        let description = redactor.redact(&action.describe());
        debug!("deploy action: {}", description);

        if dry_run {
            results.push(StepResult {
                name: description.clone(),
                command: description.clone(),
                exit_code: Some(0),
                output: format!("[dry-run] {}", description),
                error: None,
            });
            continue;
        }

        let output = match action {
            DeployAction::EnsureArtifacts { dir } => {
                let count = count_files(dir)?;
                if count == 0 {
                    return Err(DeployError::MissingArtifact(dir.clone()));
                }
                info!("{} artifact(s) in {}", count, dir.display());
                format!("{} artifact(s)", count)
            }
            DeployAction::ResetDir { dir } => {
                if tokio::fs::metadata(dir).await.is_ok() {
                    tokio::fs::remove_dir_all(dir).await?;
                }
                tokio::fs::create_dir_all(dir).await?;
                String::new()
            }
            DeployAction::WriteFile { path, contents } => {
                tokio::fs::write(path, contents).await?;
                String::new()
            }
            DeployAction::Run(spec) => {
                let out = runner.run(spec).await?;
                let combined = redactor.redact(&out.combined());
                if !out.is_success() {
                    return Err(DeployError::CommandFailed {
                        command: description,
                        exit_code: out.exit_code,
                        output: combined.trim().to_string(),
                    });
                }
                combined
            }
        };

        results.push(StepResult {
            name: description.clone(),
            command: description,
            exit_code: Some(0),
            output,
            error: None,
        });
    }

    Ok(results)
}

fn count_files(dir: &Path) -> Result<usize, DeployError> {
    let pattern = dir.join("*");
    let count = glob::glob(&pattern.to_string_lossy())?
        .filter_map(|entry| entry.ok())
        .filter(|path| path.is_file() || path.is_dir())
        .count();
    Ok(count)
}

/// Quote a value for `sh`
pub fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}
