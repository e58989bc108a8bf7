//! Step domain model

use crate::core::config::StepConfig;
use std::collections::HashMap;

/// A single shell command inside a job
#[derive(Debug, Clone)]
pub struct Step {
    /// Display name
    pub name: String,

    /// Command template, `{{ var }}` placeholders rendered per job
    pub command_template: String,

    /// Timeout in seconds
    pub timeout_secs: u64,

    /// Extra environment for this step only
    pub env: HashMap<String, String>,

    /// Keep going when the command exits non-zero
    pub continue_on_error: bool,

    /// Working directory relative to the pipeline root
    pub working_dir: Option<String>,
}

#[derive(Debug, Clone)]
pub struct StepDefaults {
    pub timeout_secs: u64,
}

impl Default for StepDefaults {
    fn default() -> Self {
        Self {
            timeout_secs: 3600, // 1 hour
        }
    }
}

impl Step {
    /// Create a step from a step config
    pub fn from_config(config: &StepConfig, defaults: &StepDefaults) -> Self {
        let detailed = config.detailed();
        let name = detailed
            .name
            .clone()
            .unwrap_or_else(|| short_name(&detailed.run));

        Step {
            name,
            command_template: detailed.run,
            timeout_secs: detailed.timeout_secs.unwrap_or(defaults.timeout_secs),
            env: detailed.env,
            continue_on_error: detailed.continue_on_error,
            working_dir: detailed.working_dir,
        }
    }

    /// Render the command with variable substitution
    ///
    /// Placeholders without a matching variable are left untouched.
    pub fn render_command(&self, variables: &HashMap<String, String>) -> String {
        render_template(&self.command_template, variables)
    }
}

/// Replace `{{ name }}` placeholders (spaces inside the braces optional)
pub fn render_template(template: &str, variables: &HashMap<String, String>) -> String {
    let mut rendered = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        let Some(len) = rest[start + 2..].find("}}") else {
            break;
        };
        let key = rest[start + 2..start + 2 + len].trim();
        rendered.push_str(&rest[..start]);
        match variables.get(key) {
            Some(value) => rendered.push_str(value),
            None => rendered.push_str(&rest[start..start + len + 4]),
        }
        rest = &rest[start + len + 4..];
    }

    rendered.push_str(rest);
    rendered
}

/// First line of a command, shortened for display
fn short_name(command: &str) -> String {
    let first_line = command.lines().next().unwrap_or("").trim();
    if first_line.chars().count() > 40 {
        let truncated: String = first_line.chars().take(37).collect();
        format!("{}...", truncated)
    } else {
        first_line.to_string()
    }
}
