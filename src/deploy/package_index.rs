//! Package index upload: build distributions, then push them with twine

use crate::core::{config::PackageIndexConfig, step::render_template};
use crate::deploy::{shell_quote, DeployAction, DeployContext, DeployError, Deployer};
use crate::execution::runner::CommandSpec;

const USERNAME_ENV: &str = "TWINE_USERNAME";
const PASSWORD_ENV: &str = "TWINE_PASSWORD";

#[derive(Debug, Clone)]
pub struct PackageIndexDeployer {
    config: PackageIndexConfig,
}

impl PackageIndexDeployer {
    pub fn new(config: PackageIndexConfig) -> Self {
        Self { config }
    }

    fn upload_command(&self, ctx: &DeployContext) -> String {
        let mut command = String::from("twine upload --non-interactive");
        if let Some(url) = &self.config.repository_url {
            command.push_str(&format!(" --repository-url {}", shell_quote(url)));
        }
        if self.config.skip_existing {
            command.push_str(" --skip-existing");
        }
        let dist = ctx.path(&self.config.distributions);
        command.push_str(&format!(" {}/*", shell_quote(&dist.to_string_lossy())));
        command
    }
}

impl Deployer for PackageIndexDeployer {
    fn provider(&self) -> &'static str {
        "package_index"
    }

    fn plan(&self, ctx: &DeployContext) -> Result<Vec<DeployAction>, DeployError> {
        let username = ctx.secret("username", &self.config.username)?;
        let password = ctx.secret("password", &self.config.password)?;

        let mut plan = Vec::new();

        if let Some(build) = self.config.build.as_deref().filter(|b| !b.trim().is_empty()) {
            plan.push(DeployAction::Run(
                CommandSpec::new(render_template(build, &ctx.variables))
                    .in_dir(&ctx.working_dir)
                    .with_timeout(ctx.timeout_secs),
            ));
        }

        plan.push(DeployAction::EnsureArtifacts {
            dir: ctx.path(&self.config.distributions),
        });

        plan.push(DeployAction::Run(
            CommandSpec::new(self.upload_command(ctx))
                .in_dir(&ctx.working_dir)
                .with_env(USERNAME_ENV, username)
                .with_env(PASSWORD_ENV, password)
                .with_timeout(ctx.timeout_secs),
        ));

        Ok(plan)
    }

    fn secrets(&self, ctx: &DeployContext) -> Vec<String> {
        if !ctx.resolve_secrets {
            return Vec::new();
        }
        // usernames like "__token__" are not worth masking
        [&self.config.password]
            .into_iter()
            .filter_map(|secret| ctx.secret("password", secret).ok())
            .collect()
    }
}
