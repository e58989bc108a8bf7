//! Trigger context - what caused this pipeline run

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Kind of event that triggered the run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TriggerEvent {
    Push,
    PullRequest,
    #[default]
    Manual,
}

impl TriggerEvent {
    /// Parse an event name as reported by common CI hosts
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "push" => Some(TriggerEvent::Push),
            "pull_request" | "pull-request" | "pr" | "merge_request_event" => {
                Some(TriggerEvent::PullRequest)
            }
            "manual" | "api" | "cron" | "workflow_dispatch" | "web" => Some(TriggerEvent::Manual),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerEvent::Push => "push",
            TriggerEvent::PullRequest => "pull_request",
            TriggerEvent::Manual => "manual",
        }
    }
}

/// Describes the version-control state a run is associated with
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerContext {
    /// Branch name, if the run is on a branch
    pub branch: Option<String>,

    /// Tag name, if the run is associated with a tag
    pub tag: Option<String>,

    /// Commit SHA
    pub commit: Option<String>,

    /// Triggering event
    pub event: TriggerEvent,
}

const TAG_PREFIX: &str = "refs/tags/";
const BRANCH_PREFIX: &str = "refs/heads/";

impl TriggerContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a context from a fully qualified git ref
    pub fn from_ref(git_ref: &str) -> Self {
        let mut ctx = Self::new();
        if let Some(tag) = git_ref.strip_prefix(TAG_PREFIX) {
            ctx.tag = non_empty(tag);
        } else if let Some(branch) = git_ref.strip_prefix(BRANCH_PREFIX) {
            ctx.branch = non_empty(branch);
        }
        ctx
    }

    /// Read the trigger from the process environment
    pub fn from_env() -> Self {
        let vars: HashMap<String, String> = std::env::vars().collect();
        Self::from_vars(&vars)
    }

    /// Read the trigger from a map of CI environment variables
    ///
    /// Travis-style variables win over GitHub- and GitLab-style ones. Empty
    /// values count as absent.
    pub fn from_vars(vars: &HashMap<String, String>) -> Self {
        let get = |key: &str| vars.get(key).and_then(|v| non_empty(v));

        let mut ctx = get("GITHUB_REF")
            .map(|r| Self::from_ref(&r))
            .unwrap_or_default();

        if let Some(tag) = get("TRAVIS_TAG").or_else(|| get("CI_COMMIT_TAG")) {
            ctx.tag = Some(tag);
        }
        if let Some(branch) = get("TRAVIS_BRANCH").or_else(|| get("CI_COMMIT_BRANCH")) {
            // Travis sets TRAVIS_BRANCH to the tag name on tag builds
            if ctx.tag.as_deref() != Some(branch.as_str()) {
                ctx.branch = Some(branch);
            }
        }
        ctx.commit = get("TRAVIS_COMMIT")
            .or_else(|| get("GITHUB_SHA"))
            .or_else(|| get("CI_COMMIT_SHA"));

        ctx.event = get("TRAVIS_EVENT_TYPE")
            .or_else(|| get("GITHUB_EVENT_NAME"))
            .or_else(|| get("CI_PIPELINE_SOURCE"))
            .and_then(|e| TriggerEvent::parse(&e))
            .unwrap_or(if ctx.tag.is_some() || ctx.branch.is_some() {
                TriggerEvent::Push
            } else {
                TriggerEvent::Manual
            });

        ctx
    }

    /// Apply explicit overrides (from the command line)
    pub fn with_overrides(
        mut self,
        tag: Option<String>,
        branch: Option<String>,
        commit: Option<String>,
    ) -> Self {
        if let Some(tag) = tag.and_then(|t| non_empty(&t)) {
            self.tag = Some(tag);
            if self.event == TriggerEvent::Manual {
                self.event = TriggerEvent::Push;
            }
        }
        if let Some(branch) = branch.and_then(|b| non_empty(&b)) {
            self.branch = Some(branch);
        }
        if let Some(commit) = commit.and_then(|c| non_empty(&c)) {
            self.commit = Some(commit);
        }
        self
    }

    /// Variables exposed to command templates
    pub fn template_variables(&self) -> HashMap<String, String> {
        let mut vars = HashMap::new();
        vars.insert("tag".to_string(), self.tag.clone().unwrap_or_default());
        vars.insert("branch".to_string(), self.branch.clone().unwrap_or_default());
        vars.insert("commit".to_string(), self.commit.clone().unwrap_or_default());
        vars.insert("event".to_string(), self.event.as_str().to_string());
        vars
    }

    /// Short description for logs and history
    pub fn describe(&self) -> String {
        match (&self.tag, &self.branch) {
            (Some(tag), _) => format!("tag {}", tag),
            (None, Some(branch)) => format!("branch {}", branch),
            (None, None) => "no ref".to_string(),
        }
    }
}

fn non_empty(value: &str) -> Option<String> {
    let value = value.trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}
