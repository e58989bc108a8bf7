//! CLI output formatting

use crate::{
    core::{ExecutionStatus, RunPlan, RunState},
    execution::ExecutionEvent,
    persistence::ExecutionSummary,
};
use console::Emoji;
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Mutex;
use std::time::Duration;

// Re-export style
pub use console::style;

// Emojis for output
pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "✓ ");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "✗ ");
pub static SPINNER: Emoji<'_, '_> = Emoji("⏳ ", "~ ");
pub static INFO: Emoji<'_, '_> = Emoji("ℹ️  ", "i ");
pub static WARN: Emoji<'_, '_> = Emoji("⚠️  ", "! ");
pub static ROCKET: Emoji<'_, '_> = Emoji("🚀 ", "> ");
pub static SKIP: Emoji<'_, '_> = Emoji("⏭️  ", "- ");
pub static PACKAGE: Emoji<'_, '_> = Emoji("📦 ", "^ ");

/// Create a spinner for a running stage
pub fn create_spinner(message: String) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::with_template("{spinner:.green} [{elapsed_precise}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.set_message(message);
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner
}

/// Format a stage or job state for display
pub fn format_run_state(state: &RunState) -> String {
    match state {
        RunState::Pending => style("PENDING").dim().to_string(),
        RunState::Running { .. } => style("RUNNING").yellow().to_string(),
        RunState::Completed { .. } => style("COMPLETED").green().to_string(),
        RunState::Failed { .. } => style("FAILED").red().to_string(),
        RunState::Skipped { .. } => style("SKIPPED").dim().to_string(),
    }
}

/// Format an execution status for display
pub fn format_status(status: ExecutionStatus) -> String {
    match status {
        ExecutionStatus::Pending => style("PENDING").dim().to_string(),
        ExecutionStatus::Running => style("RUNNING").yellow().to_string(),
        ExecutionStatus::Completed => style("COMPLETED").green().to_string(),
        ExecutionStatus::Failed => style("FAILED").red().to_string(),
        ExecutionStatus::Cancelled => style("CANCELLED").yellow().to_string(),
    }
}

fn short_id(id: &uuid::Uuid) -> String {
    id.simple().to_string()[..8].to_string()
}

/// Format execution summary for display
pub fn format_execution_summary(summary: &ExecutionSummary) -> String {
    let status_icon = match summary.status {
        ExecutionStatus::Completed => CHECK,
        ExecutionStatus::Failed => CROSS,
        ExecutionStatus::Running => SPINNER,
        _ => INFO,
    };
    let trigger = match (&summary.tag, &summary.branch) {
        (Some(tag), _) => format!("tag {}", tag),
        (None, Some(branch)) => format!("branch {}", branch),
        (None, None) => "no ref".to_string(),
    };

    format!(
        "{} {} - {} - {} - {} ({}/{} stages, {} failed job(s)) - {}",
        status_icon,
        style(short_id(&summary.execution_id)).dim(),
        style(&summary.pipeline_name).bold(),
        style(trigger).cyan(),
        format_status(summary.status),
        summary.completed_stages,
        summary.total_stages,
        summary.failed_jobs,
        style(format!("{:.0}%", summary.progress * 100.0)).cyan()
    )
}

/// Format an execution event for display
pub fn format_execution_event(event: &ExecutionEvent) -> String {
    match event {
        ExecutionEvent::PipelineStarted {
            execution_id,
            pipeline_name,
            trigger,
        } => format!(
            "{} Starting pipeline {} for {} ({})",
            ROCKET,
            style(pipeline_name).bold(),
            style(trigger).cyan(),
            style(short_id(execution_id)).dim()
        ),
        ExecutionEvent::StageStarted { stage_id, jobs } => format!(
            "{} Stage {} ({} job{})",
            SPINNER,
            style(stage_id).cyan().bold(),
            jobs,
            if *jobs == 1 { "" } else { "s" }
        ),
        ExecutionEvent::StageSkipped { stage_id, reason } => format!(
            "{} Stage {} skipped: {}",
            SKIP,
            style(stage_id).dim(),
            style(reason).dim()
        ),
        ExecutionEvent::JobStarted { job_id, .. } => {
            format!("  {} {}", SPINNER, style(job_id).cyan())
        }
        ExecutionEvent::StepOutput { job_id, step, output } => format!(
            "  {} Output of {} / {}:\n{}",
            INFO,
            style(job_id).dim(),
            style(step).dim(),
            output
        ),
        ExecutionEvent::JobCompleted { job_id, .. } => {
            format!("  {} {}", CHECK, style(job_id).green())
        }
        ExecutionEvent::JobFailed {
            job_id, step, error, ..
        } => format!(
            "  {} {} at '{}': {}",
            CROSS,
            style(job_id).red(),
            step,
            style(error).dim()
        ),
        ExecutionEvent::DeployStarted { provider, .. } => {
            format!("  {} Deploying to {}", PACKAGE, style(provider).cyan())
        }
        ExecutionEvent::DeploySkipped { provider, reason, .. } => format!(
            "  {} Deploy to {} skipped: {}",
            SKIP,
            style(provider).dim(),
            style(reason).dim()
        ),
        ExecutionEvent::DeployCompleted { provider, actions, .. } => format!(
            "  {} Deployed to {} ({} action{})",
            CHECK,
            style(provider).green(),
            actions,
            if *actions == 1 { "" } else { "s" }
        ),
        ExecutionEvent::DeployFailed { provider, error, .. } => format!(
            "  {} Deploy to {} failed: {}",
            CROSS,
            style(provider).red(),
            style(error).dim()
        ),
        ExecutionEvent::StageCompleted { stage_id } => {
            format!("{} Stage {}", CHECK, style(stage_id).green().bold())
        }
        ExecutionEvent::StageFailed {
            stage_id,
            error,
            allowed,
        } => {
            if *allowed {
                format!(
                    "{} Stage {} failed (allowed): {}",
                    WARN,
                    style(stage_id).yellow().bold(),
                    style(error).dim()
                )
            } else {
                format!(
                    "{} Stage {} failed: {}",
                    CROSS,
                    style(stage_id).red().bold(),
                    style(error).dim()
                )
            }
        }
        ExecutionEvent::PipelineCompleted {
            execution_id,
            status,
        } => {
            let status_str = match status {
                ExecutionStatus::Completed => format!("completed {}", style("successfully").green()),
                ExecutionStatus::Failed => style("failed").red().to_string(),
                _ => format!("{:?}", status),
            };
            format!(
                "{} Pipeline ({}) {}",
                INFO,
                style(short_id(execution_id)).dim(),
                status_str
            )
        }
    }
}

/// Format a run plan for display
pub fn format_plan(plan: &RunPlan) -> String {
    let mut lines = vec![format!(
        "{} Plan for {} on {}",
        INFO,
        style(&plan.pipeline).bold(),
        style(&plan.trigger).cyan()
    )];

    for stage in &plan.stages {
        if stage.runs {
            lines.push(format!("  {} {}", CHECK, style(&stage.id).bold()));
            for job in &stage.jobs {
                lines.push(format!("      {}", job));
            }
        } else {
            lines.push(format!(
                "  {} {} ({})",
                SKIP,
                style(&stage.id).dim(),
                style(stage.skip_reason.as_deref().unwrap_or("skipped")).dim()
            ));
        }
        for deploy in &stage.deploy {
            let marker = if deploy.runs { PACKAGE } else { SKIP };
            lines.push(format!(
                "      {} deploy {} [if {}]",
                marker,
                style(&deploy.provider).cyan(),
                deploy.condition
            ));
        }
    }

    lines.push(format!(
        "  {} job(s), deploys: {}",
        plan.job_count(),
        match plan.deploys() {
            d if d.is_empty() => "none".to_string(),
            d => d.join(", "),
        }
    ));
    lines.join("\n")
}

/// Format step output with truncation
pub fn format_output(output: &str, max_lines: usize) -> String {
    let lines: Vec<&str> = output.lines().collect();

    if lines.len() <= max_lines {
        output.to_string()
    } else {
        let truncated = lines[..max_lines].join("\n");
        format!(
            "{}\n{}... ({} more lines)",
            truncated,
            style("[truncated]").dim(),
            lines.len() - max_lines
        )
    }
}

/// Prints engine events, with a spinner while a stage runs
pub struct ConsoleReporter {
    stream: bool,
    spinner: Mutex<Option<ProgressBar>>,
}

impl ConsoleReporter {
    pub fn new(stream: bool) -> Self {
        Self {
            stream,
            spinner: Mutex::new(None),
        }
    }

    pub fn handle(&self, event: &ExecutionEvent) {
        let mut spinner = match self.spinner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        let line = match event {
            ExecutionEvent::StepOutput { output, .. } if self.stream => {
                Some(format!("{}\n{}", format_execution_event(event), format_output(output, 20)))
            }
            ExecutionEvent::StepOutput { .. } => None,
            _ => Some(format_execution_event(event)),
        };

        match event {
            ExecutionEvent::StageStarted { stage_id, .. } => {
                println!("{}", format_execution_event(event));
                *spinner = Some(create_spinner(format!("running {}", stage_id)));
                return;
            }
            ExecutionEvent::StageCompleted { .. } | ExecutionEvent::StageFailed { .. } => {
                if let Some(bar) = spinner.take() {
                    bar.finish_and_clear();
                }
            }
            _ => {}
        }

        if let Some(line) = line {
            match spinner.as_ref() {
                Some(bar) => bar.println(line),
                None => println!("{}", line),
            }
        }
    }
}
