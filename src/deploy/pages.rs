//! Static pages deployment via a forced push of a directory to a branch

use crate::core::{config::PagesConfig, step::render_template};
use crate::deploy::{shell_quote, DeployAction, DeployContext, DeployError, Deployer};
use crate::execution::runner::CommandSpec;

/// Environment variable carrying the token into `git push`
const TOKEN_ENV: &str = "TAGSHIP_PAGES_TOKEN";

/// Scratch git directory, relative to the working directory
const GIT_DIR: &str = ".tagship/pages-git";

/// Publishes `local_dir` as the single commit of `target_branch`
///
/// The published directory is used as the work tree of a scratch
/// repository so no `.git` ends up inside the generated documentation.
#[derive(Debug, Clone)]
pub struct PagesDeployer {
    config: PagesConfig,
}

impl PagesDeployer {
    pub fn new(config: PagesConfig) -> Self {
        Self { config }
    }

    fn repo(&self, ctx: &DeployContext) -> Result<String, DeployError> {
        self.config
            .repo
            .clone()
            .or_else(|| ctx.env.get("GITHUB_REPOSITORY").cloned())
            .or_else(|| ctx.env.get("TRAVIS_REPO_SLUG").cloned())
            .filter(|r| !r.trim().is_empty())
            .ok_or(DeployError::MissingRepo)
    }

    /// Push URL; the token is expanded by the shell from the environment
    fn push_url(&self, repo: &str) -> String {
        format!(
            "\"https://x-access-token:${{{}}}@{}/{}.git\"",
            TOKEN_ENV, self.config.host, repo
        )
    }
}

impl Deployer for PagesDeployer {
    fn provider(&self) -> &'static str {
        "pages"
    }

    fn plan(&self, ctx: &DeployContext) -> Result<Vec<DeployAction>, DeployError> {
        let token = ctx.secret("token", &self.config.token)?;
        let repo = self.repo(ctx)?;
        let local_dir = ctx.path(&self.config.local_dir);
        let git_dir = ctx.path(GIT_DIR);
        let branch = shell_quote(&self.config.target_branch);
        let message = render_template(&self.config.commit_message, &ctx.variables);

        let git = |args: String| {
            DeployAction::Run(
                CommandSpec::new(format!("git {}", args))
                    .in_dir(&local_dir)
                    .with_env("GIT_DIR", git_dir.to_string_lossy())
                    .with_env("GIT_WORK_TREE", local_dir.to_string_lossy())
                    .with_timeout(ctx.timeout_secs),
            )
        };

        let mut plan = vec![DeployAction::EnsureArtifacts {
            dir: local_dir.clone(),
        }];

        if let Some(cname) = &self.config.cname {
            plan.push(DeployAction::WriteFile {
                path: local_dir.join("CNAME"),
                contents: format!("{}\n", cname.trim()),
            });
        }

        plan.push(DeployAction::ResetDir {
            dir: git_dir.clone(),
        });
        plan.push(git("init --quiet".to_string()));
        plan.push(git(format!("checkout --quiet --orphan {}", branch)));
        plan.push(git("add --all".to_string()));
        plan.push(git(format!(
            "-c user.name={} -c user.email={} commit --quiet -m {}",
            shell_quote(&self.config.committer_name),
            shell_quote(&self.config.committer_email),
            shell_quote(&message)
        )));

        let push = CommandSpec::new(format!(
            "git push --force --quiet {} {}",
            self.push_url(&repo),
            shell_quote(&format!("HEAD:refs/heads/{}", self.config.target_branch))
        ))
        .in_dir(&local_dir)
        .with_env("GIT_DIR", git_dir.to_string_lossy())
        .with_env("GIT_WORK_TREE", local_dir.to_string_lossy())
        .with_env(TOKEN_ENV, token)
        .with_timeout(ctx.timeout_secs);
        plan.push(DeployAction::Run(push));

        Ok(plan)
    }

    fn secrets(&self, ctx: &DeployContext) -> Vec<String> {
        ctx.secret("token", &self.config.token)
            .ok()
            .filter(|_| ctx.resolve_secrets)
            .into_iter()
            .collect()
    }
}
