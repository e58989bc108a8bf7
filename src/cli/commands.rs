//! CLI command definitions

use crate::execution::SchedulingStrategy;
use clap::Args;

/// Run a pipeline
#[derive(Debug, Args, Clone)]
pub struct RunCommand {
    /// Path to pipeline YAML file
    #[arg(short, long)]
    pub file: String,

    /// Tag that triggered the run (default: from the CI environment)
    #[arg(long)]
    pub tag: Option<String>,

    /// Branch that triggered the run (default: from the CI environment)
    #[arg(long)]
    pub branch: Option<String>,

    /// Commit being built (default: from the CI environment)
    #[arg(long)]
    pub commit: Option<String>,

    /// Variable overrides (key=value)
    #[arg(long = "var", alias = "variable", value_parser = parse_key_value)]
    pub variable: Vec<(String, String)>,

    /// Scheduling strategy for the matrix jobs of a stage
    #[arg(long, default_value = "sequential", value_parser = ["sequential", "parallel", "parallel-limited"])]
    pub strategy: String,

    /// Maximum concurrent jobs for `parallel-limited`
    #[arg(short, long, default_value_t = 2)]
    pub jobs: usize,

    /// Print what would run without running it
    #[arg(long)]
    pub dry_run: bool,

    /// Don't save execution to history
    #[arg(long)]
    pub no_history: bool,
}

impl RunCommand {
    pub fn scheduling_strategy(&self) -> Result<SchedulingStrategy, String> {
        SchedulingStrategy::from_name(&self.strategy, Some(self.jobs))
    }
}

/// Validate a pipeline configuration
#[derive(Debug, Args, Clone)]
pub struct ValidateCommand {
    /// Path to pipeline YAML file
    #[arg(short, long)]
    pub file: String,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Show what a run would do for a trigger
#[derive(Debug, Args, Clone)]
pub struct PlanCommand {
    /// Path to pipeline YAML file
    #[arg(short, long)]
    pub file: String,

    /// Tag to plan for
    #[arg(long)]
    pub tag: Option<String>,

    /// Branch to plan for
    #[arg(long)]
    pub branch: Option<String>,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// List pipelines found in history
#[derive(Debug, Args, Clone)]
pub struct ListCommand {
    /// Show execution counts
    #[arg(long)]
    pub with_counts: bool,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Show execution history
#[derive(Debug, Args, Clone)]
pub struct HistoryCommand {
    /// Pipeline name to filter by
    #[arg(short, long)]
    pub pipeline: Option<String>,

    /// Number of recent executions to show
    #[arg(short, long, default_value_t = 10)]
    pub limit: usize,

    /// Show the full record of each execution
    #[arg(long)]
    pub details: bool,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,

    /// Show a single execution
    #[arg(long)]
    pub execution_id: Option<String>,
}

/// Parse key=value pairs
pub fn parse_key_value(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("Invalid key=value pair: {}", s)),
    }
}
