//! Test utility functions for tagship scenarios
#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tagship::core::{
    config::PipelineConfig, ExecutionStatus, Pipeline, RunState, TriggerContext,
};
use tagship::execution::{
    CommandOutput, CommandRunner, CommandSpec, ExecutionEngine, ExecutionEvent, RunnerError,
    SchedulingStrategy,
};

/// Mock runner that records every command and fails on markers
#[derive(Default)]
pub struct RecordingRunner {
    fail_on: Vec<String>,
    outputs: Vec<(String, String)>,
    delay: Option<Duration>,
    seen: Mutex<Vec<CommandSpec>>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl RecordingRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Commands containing `marker` exit with code 1
    pub fn failing_on(mut self, marker: &str) -> Self {
        self.fail_on.push(marker.to_string());
        self
    }

    /// Commands containing `marker` print `stdout`
    pub fn with_output(mut self, marker: &str, stdout: &str) -> Self {
        self.outputs.push((marker.to_string(), stdout.to_string()));
        self
    }

    /// Every command takes `delay` to finish
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn specs(&self) -> Vec<CommandSpec> {
        self.seen.lock().unwrap().clone()
    }

    /// Most commands that were running at the same moment
    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CommandRunner for RecordingRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, RunnerError> {
        self.seen.lock().unwrap().push(spec.clone());

        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(running, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.fail_on.iter().any(|m| spec.command.contains(m.as_str())) {
            return Ok(CommandOutput::failure(1, format!("{}: failed", spec.command)));
        }

        let stdout = self
            .outputs
            .iter()
            .find(|(marker, _)| spec.command.contains(marker.as_str()))
            .map(|(_, out)| out.clone())
            .unwrap_or_default();
        Ok(CommandOutput::success(stdout))
    }
}

/// Builder for one pipeline run against a [`RecordingRunner`]
pub struct Scenario {
    yaml: String,
    trigger: TriggerContext,
    env: HashMap<String, String>,
    working_dir: PathBuf,
    strategy: SchedulingStrategy,
    dry_run: bool,
    runner: RecordingRunner,
}

impl Scenario {
    pub fn new(yaml: &str) -> Self {
        Self {
            yaml: yaml.to_string(),
            trigger: TriggerContext::from_ref("refs/heads/master"),
            env: HashMap::new(),
            working_dir: PathBuf::from("."),
            strategy: SchedulingStrategy::Sequential,
            dry_run: false,
            runner: RecordingRunner::new(),
        }
    }

    pub fn tagged(mut self, tag: &str) -> Self {
        self.trigger = TriggerContext::from_ref(&format!("refs/tags/{}", tag));
        self
    }

    pub fn branch(mut self, branch: &str) -> Self {
        self.trigger = TriggerContext::from_ref(&format!("refs/heads/{}", branch));
        self
    }

    pub fn env(mut self, key: &str, value: &str) -> Self {
        self.env.insert(key.to_string(), value.to_string());
        self
    }

    pub fn in_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = dir.into();
        self
    }

    pub fn strategy(mut self, strategy: SchedulingStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn dry_run(mut self) -> Self {
        self.dry_run = true;
        self
    }

    pub fn fail_on(mut self, marker: &str) -> Self {
        self.runner = self.runner.failing_on(marker);
        self
    }

    pub fn output(mut self, marker: &str, stdout: &str) -> Self {
        self.runner = self.runner.with_output(marker, stdout);
        self
    }

    /// Make every command take `millis` so jobs overlap
    pub fn slow(mut self, millis: u64) -> Self {
        self.runner = self.runner.with_delay(Duration::from_millis(millis));
        self
    }

    pub async fn run(self) -> PipelineTestResult {
        let mut pipeline = pipeline_from_yaml(&self.yaml);
        let runner = Arc::new(self.runner);

        let engine = ExecutionEngine::new(runner.clone(), self.strategy)
            .dry_run(self.dry_run)
            .with_env(self.env)
            .with_working_dir(self.working_dir);

        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        engine.add_event_handler(move |event| sink.lock().unwrap().push(event));

        let error = engine
            .execute(&mut pipeline, &self.trigger)
            .await
            .err()
            .map(|e| e.to_string());

        let events = events.lock().unwrap().clone();
        PipelineTestResult {
            pipeline,
            events,
            specs: runner.specs(),
            peak_concurrency: runner.peak_concurrency(),
            error,
        }
    }
}

/// Test result from running a pipeline
#[derive(Debug, Clone)]
pub struct PipelineTestResult {
    pub pipeline: Pipeline,
    pub events: Vec<ExecutionEvent>,
    pub specs: Vec<CommandSpec>,
    pub peak_concurrency: usize,
    pub error: Option<String>,
}

impl PipelineTestResult {
    pub fn is_success(&self) -> bool {
        self.error.is_none() && self.pipeline.state.status == ExecutionStatus::Completed
    }

    pub fn is_failed(&self) -> bool {
        self.error.is_some() && self.pipeline.state.status == ExecutionStatus::Failed
    }

    /// Commands the runner saw, in order
    pub fn commands(&self) -> Vec<String> {
        self.specs.iter().map(|s| s.command.clone()).collect()
    }

    /// Number of commands containing `needle`
    pub fn count_commands(&self, needle: &str) -> usize {
        self.specs.iter().filter(|s| s.command.contains(needle)).count()
    }

    pub fn stage_state(&self, stage_id: &str) -> &RunState {
        &self
            .pipeline
            .stage(stage_id)
            .unwrap_or_else(|| panic!("Stage '{}' not found", stage_id))
            .state
    }

    pub fn deployed(&self, stage_id: &str) -> Vec<String> {
        self.pipeline
            .stage(stage_id)
            .map(|s| s.deployed.clone())
            .unwrap_or_default()
    }

    /// All captured output, as the console would see it
    pub fn all_output(&self) -> String {
        let mut text = Vec::new();
        for event in &self.events {
            match event {
                ExecutionEvent::StepOutput { output, .. } => text.push(output.clone()),
                ExecutionEvent::JobFailed { error, .. }
                | ExecutionEvent::DeployFailed { error, .. }
                | ExecutionEvent::StageFailed { error, .. } => text.push(error.clone()),
                _ => {}
            }
        }
        if let Some(error) = &self.error {
            text.push(error.clone());
        }
        text.join("\n")
    }

    pub fn summary(&self) -> String {
        let status = match self.pipeline.state.status {
            ExecutionStatus::Completed => "✅ Completed",
            ExecutionStatus::Failed => "❌ Failed",
            ExecutionStatus::Running => "🔄 Running",
            _ => "❓ Unknown",
        };
        format!(
            "{} - {} stages completed, {} failed, {} skipped; error: {:?}",
            status,
            self.pipeline.state.completed_stages,
            self.pipeline.state.failed_stages,
            self.pipeline.state.skipped_stages,
            self.error
        )
    }
}

/// Assert pipeline completed successfully
pub fn assert_pipeline_completed(result: &PipelineTestResult) {
    assert!(
        result.is_success(),
        "Pipeline should be completed, but was: {}",
        result.summary()
    );
}

/// Assert pipeline failed
pub fn assert_pipeline_failed(result: &PipelineTestResult) {
    assert!(
        result.is_failed(),
        "Pipeline should have failed, but was: {}",
        result.summary()
    );
}

pub fn assert_stage_completed(result: &PipelineTestResult, stage_id: &str) {
    let state = result.stage_state(stage_id);
    assert!(
        state.is_completed(),
        "Stage '{}' should be completed, but was in state: {:?}",
        stage_id,
        state
    );
}

pub fn assert_stage_failed(result: &PipelineTestResult, stage_id: &str, expected_error: &str) {
    match result.stage_state(stage_id) {
        RunState::Failed { error, .. } => assert!(
            error.contains(expected_error),
            "Stage '{}' error:\n{}\n\ndoes not contain:\n{}",
            stage_id,
            error,
            expected_error
        ),
        other => panic!("Stage '{}' should have failed, but was: {:?}", stage_id, other),
    }
}

pub fn assert_stage_skipped(result: &PipelineTestResult, stage_id: &str, expected_reason: &str) {
    match result.stage_state(stage_id) {
        RunState::Skipped { reason } => assert!(
            reason.contains(expected_reason),
            "Stage '{}' skip reason:\n{}\n\ndoes not contain:\n{}",
            stage_id,
            reason,
            expected_reason
        ),
        other => panic!("Stage '{}' should be skipped, but was: {:?}", stage_id, other),
    }
}

/// Assert the commands matching each needle ran in this relative order
pub fn assert_commands_in_order(result: &PipelineTestResult, needles: &[&str]) {
    let commands = result.commands();
    let mut last = None;
    for needle in needles {
        let position = commands
            .iter()
            .position(|c| c.contains(needle))
            .unwrap_or_else(|| panic!("No command contains '{}': {:#?}", needle, commands));
        if let Some(previous) = last {
            assert!(
                position > previous,
                "'{}' ran out of order: {:#?}",
                needle,
                commands
            );
        }
        last = Some(position);
    }
}

/// Test matrix, then docs and two release targets gated on a tag
pub const RELEASE_PIPELINE: &str = r#"
name: "pvinspect"
variables:
  package: pvinspect
stages:
  - id: test
    matrix:
      python: ["3.6", "3.7"]
    steps:
      - pip install . numpy
      - python{{ matrix.python }} -m pytest
  - id: deploy
    depends_on: [test]
    if: tag
    steps:
      - name: docs
        run: make -C docs html
    deploy:
      - provider: pages
        local_dir: docs/_build/html
        repo: someone/pvinspect
        token: { env: GITHUB_TOKEN }
      - provider: package_index
        build: python setup.py sdist
        username: __token__
        password: { env: PYPI_PASSWORD }
"#;

pub const PAGES_TOKEN: &str = "ghp_pagesToken123";
pub const PYPI_PASSWORD: &str = "pypi-AgEIcHlwaS5vcmcSecret";

/// Working directory holding built docs and distributions
pub fn release_workspace() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    let html = dir.path().join("docs/_build/html");
    std::fs::create_dir_all(&html).unwrap();
    std::fs::write(html.join("index.html"), "<h1>pvinspect</h1>").unwrap();

    let dist = dir.path().join("dist");
    std::fs::create_dir_all(&dist).unwrap();
    std::fs::write(dist.join("pvinspect-0.4.tar.gz"), b"sdist").unwrap();
    dir
}

/// Release scenario with both credentials available
pub fn release_scenario(workspace: &tempfile::TempDir) -> Scenario {
    Scenario::new(RELEASE_PIPELINE)
        .in_dir(workspace.path())
        .env("GITHUB_TOKEN", PAGES_TOKEN)
        .env("PYPI_PASSWORD", PYPI_PASSWORD)
}

/// Parse a pipeline from YAML string
pub fn pipeline_from_yaml(yaml: &str) -> Pipeline {
    PipelineConfig::from_yaml(yaml)
        .and_then(|config| config.to_pipeline())
        .unwrap_or_else(|e| panic!("Failed to parse pipeline YAML: {:#}", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
name: "Minimal"
stages:
  - id: hello
    steps: ["echo hello"]
"#;

    #[tokio::test]
    async fn test_recording_runner_markers() {
        let runner = RecordingRunner::new()
            .failing_on("pytest")
            .with_output("echo", "hello");

        let ok = runner.run(&CommandSpec::new("echo hi")).await.unwrap();
        assert_eq!(ok.stdout, "hello");
        let failed = runner.run(&CommandSpec::new("python -m pytest")).await.unwrap();
        assert_eq!(failed.exit_code, 1);
        assert_eq!(runner.specs().len(), 2);
    }

    #[tokio::test]
    async fn test_scenario_minimal() {
        let result = Scenario::new(MINIMAL).output("echo", "hello").run().await;

        assert_pipeline_completed(&result);
        assert_stage_completed(&result, "hello");
        assert_eq!(result.commands(), vec!["echo hello"]);
        assert_eq!(result.all_output(), "hello");
    }
}
