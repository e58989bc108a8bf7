use anyhow::{Context, Result};
use std::sync::Arc;
use tagship::cli::commands::{
    HistoryCommand, ListCommand, PlanCommand, RunCommand, ValidateCommand,
};
use tagship::cli::output::*;
use tagship::cli::{Cli, Command};
use tagship::core::{config::PipelineConfig, ExecutionStatus, RunPlan, TriggerContext};
use tagship::execution::{CommandRunner, ExecutionEngine, ShellRunner};
use tagship::persistence::{
    create_summary, ExecutionSummary, InMemoryPersistence, PersistenceBackend,
    SqliteExecutionStore,
};
use tracing::error;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let cli = Cli::from_args();

    // Initialize logging; RUST_LOG wins over --verbose
    let default_level = if cli.verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let result = match &cli.command {
        Command::Run(cmd) => run_pipeline(cmd, &cli).await,
        Command::Validate(cmd) => validate_pipeline(cmd),
        Command::Plan(cmd) => plan_pipeline(cmd),
        Command::List(cmd) => list_pipelines(cmd).await,
        Command::History(cmd) => show_history(cmd).await,
    };

    match result {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("{} {}", CROSS, style(format!("{:#}", e)).red());
            std::process::exit(1);
        }
    }
}

fn load_config(file: &str) -> Result<PipelineConfig> {
    PipelineConfig::from_file(file).with_context(|| format!("Failed to load pipeline config {}", file))
}

/// Returns `Ok(false)` when the pipeline ran and failed
async fn run_pipeline(cmd: &RunCommand, cli: &Cli) -> Result<bool> {
    let config = load_config(&cmd.file)?;
    let mut pipeline = config.to_pipeline()?;

    println!("{} Loaded pipeline: {}", INFO, style(&pipeline.name).bold());

    // Apply variable overrides
    for (key, value) in &cmd.variable {
        pipeline.variables.insert(key.clone(), value.clone());
        println!(
            "{} Variable override: {} = {}",
            INFO,
            style(key).cyan(),
            style(value).dim()
        );
    }

    let trigger = TriggerContext::from_env().with_overrides(
        cmd.tag.clone(),
        cmd.branch.clone(),
        cmd.commit.clone(),
    );

    // Set up persistence
    let save_history = !cmd.no_history && !cmd.dry_run;
    let store: Arc<dyn PersistenceBackend> = if save_history {
        Arc::new(SqliteExecutionStore::with_default_path().await?)
    } else {
        Arc::new(InMemoryPersistence::new())
    };

    let strategy = cmd.scheduling_strategy().map_err(anyhow::Error::msg)?;
    let working_dir = std::env::current_dir().context("Failed to resolve working directory")?;
    let runner: Arc<dyn CommandRunner> =
        Arc::new(ShellRunner::new(pipeline.shell.clone()).with_working_dir(&working_dir));
    let engine = ExecutionEngine::new(runner, strategy)
        .dry_run(cmd.dry_run)
        .with_working_dir(working_dir);

    if cmd.dry_run {
        println!("{} Dry run: nothing will be executed", WARN);
    }

    let reporter = Arc::new(ConsoleReporter::new(cli.stream || cmd.dry_run));
    engine.add_event_handler(move |event| reporter.handle(&event));

    println!();
    let result = engine.execute(&mut pipeline, &trigger).await;

    let summary = create_summary(&pipeline, &trigger);
    store.save_execution(&summary).await?;
    if save_history {
        println!(
            "\n{} Execution saved to history (ID: {})",
            INFO,
            style(summary.execution_id).dim()
        );
    }

    match result {
        Ok(()) => {
            println!(
                "\n{} {} completed {}",
                CHECK,
                style(&pipeline.name).bold(),
                style("successfully").green()
            );
            Ok(true)
        }
        Err(e) => {
            println!("\n{} {} {}", CROSS, style(&pipeline.name).bold(), style("failed").red());
            error!("{:#}", e);
            Ok(false)
        }
    }
}

fn validate_pipeline(cmd: &ValidateCommand) -> Result<bool> {
    println!("{} Validating pipeline...", INFO);

    let config = match load_config(&cmd.file) {
        Ok(config) => config,
        Err(e) => {
            println!("{} Validation failed:", CROSS);
            println!("  {}", style(format!("{:#}", e)).red());
            return Ok(false);
        }
    };

    let pipeline = config.to_pipeline()?;

    println!("{} Pipeline configuration is valid!", CHECK);
    println!("  Name: {}", style(&config.name).bold());
    println!("  Stages: {}", style(config.stages.len()).cyan());
    println!("  Jobs: {}", style(pipeline.total_jobs()).cyan());
    println!("  Variables: {}", style(config.variable_count()).cyan());
    println!("  Order: {}", style(pipeline.execution_order().join(" -> ")).dim());

    if cmd.json {
        let json = serde_json::to_string_pretty(&config)?;
        println!("\n{}", json);
    }
    Ok(true)
}

fn plan_pipeline(cmd: &PlanCommand) -> Result<bool> {
    let pipeline = load_config(&cmd.file)?.to_pipeline()?;
    let trigger = TriggerContext::from_env().with_overrides(cmd.tag.clone(), cmd.branch.clone(), None);
    let plan = RunPlan::for_trigger(&pipeline, &trigger);

    if cmd.json {
        println!("{}", serde_json::to_string_pretty(&plan)?);
    } else {
        println!("{}", format_plan(&plan));
    }
    Ok(true)
}

async fn list_pipelines(cmd: &ListCommand) -> Result<bool> {
    let store = SqliteExecutionStore::with_default_path().await?;
    let pipelines = store.list_pipelines().await?;

    if cmd.json {
        let mut json_data = Vec::new();
        for pipeline in &pipelines {
            let executions = store.list_executions(pipeline).await?;
            json_data.push(serde_json::json!({
                "name": pipeline,
                "execution_count": executions.len(),
            }));
        }
        let data = serde_json::json!({ "pipelines": json_data });
        println!("{}", serde_json::to_string_pretty(&data)?);
        return Ok(true);
    }

    if pipelines.is_empty() {
        println!("{} No pipelines found in history", INFO);
        return Ok(true);
    }

    println!("{} Pipelines in history:", INFO);

    for pipeline_name in &pipelines {
        if cmd.with_counts {
            let executions = store.list_executions(pipeline_name).await?;
            let completed = executions
                .iter()
                .filter(|e| e.status == ExecutionStatus::Completed)
                .count();
            let failed = executions
                .iter()
                .filter(|e| e.status == ExecutionStatus::Failed)
                .count();
            println!(
                "  {} ({} runs: {} succeeded, {} failed)",
                style(pipeline_name).bold(),
                style(executions.len()).cyan(),
                style(completed).green(),
                style(failed).red()
            );
        } else {
            println!("  {}", style(pipeline_name).bold());
        }
    }

    Ok(true)
}

async fn show_history(cmd: &HistoryCommand) -> Result<bool> {
    let store = SqliteExecutionStore::with_default_path().await?;

    if let Some(exec_id_str) = &cmd.execution_id {
        let exec_id = uuid::Uuid::parse_str(exec_id_str).context("Invalid execution ID format")?;

        match store.load_execution(exec_id).await? {
            Some(summary) => print_execution_details(&summary, cmd.details)?,
            None => println!("{} Execution not found", WARN),
        }
        return Ok(true);
    }

    let mut executions = match &cmd.pipeline {
        Some(pipeline_name) => store.list_executions(pipeline_name).await?,
        None => {
            let mut all_execs = Vec::new();
            for pipeline in store.list_pipelines().await? {
                all_execs.extend(store.list_executions(&pipeline).await?);
            }
            all_execs.sort_by(|a, b| b.started_at.cmp(&a.started_at));
            all_execs
        }
    };
    executions.truncate(cmd.limit);

    if cmd.json {
        let data = serde_json::json!({ "executions": executions });
        println!("{}", serde_json::to_string_pretty(&data)?);
        return Ok(true);
    }

    if executions.is_empty() {
        println!("{} No executions found", INFO);
        return Ok(true);
    }

    println!("{} Execution history (showing latest {}):", INFO, cmd.limit);
    for summary in &executions {
        println!("  {}", format_execution_summary(summary));
    }

    Ok(true)
}

fn print_execution_details(summary: &ExecutionSummary, details: bool) -> Result<()> {
    println!("{} Execution Details", INFO);
    println!("  ID: {}", style(summary.execution_id).cyan());
    println!("  Pipeline: {}", style(&summary.pipeline_name).bold());
    println!("  Status: {}", format_status(summary.status));
    if let Some(tag) = &summary.tag {
        println!("  Tag: {}", style(tag).cyan());
    }
    if let Some(branch) = &summary.branch {
        println!("  Branch: {}", style(branch).cyan());
    }
    if let Some(commit) = &summary.commit {
        println!("  Commit: {}", style(commit).dim());
    }
    println!("  Started: {}", style(summary.started_at.to_rfc3339()).dim());
    if let Some(completed) = summary.completed_at {
        println!("  Completed: {}", style(completed.to_rfc3339()).dim());
        if let Ok(duration) = completed.signed_duration_since(summary.started_at).to_std() {
            println!("  Duration: {}", style(format_duration(duration)).dim());
        }
    }
    println!(
        "  Progress: {} ({}/{} stages, {}/{} jobs failed)",
        style(format!("{:.0}%", summary.progress * 100.0)).cyan(),
        summary.completed_stages,
        summary.total_stages,
        summary.failed_jobs,
        summary.total_jobs
    );

    if details {
        println!("\n  {}", style("Full details:").bold());
        let json = serde_json::to_string_pretty(summary)?;
        for line in json.lines() {
            println!("    {}", line);
        }
    }

    Ok(())
}

fn format_duration(duration: std::time::Duration) -> String {
    let secs = duration.as_secs();
    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
