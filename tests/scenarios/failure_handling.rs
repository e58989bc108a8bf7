//! Test: Failure Handling
//!
//! How failing steps and stages propagate through the pipeline.

use crate::helpers::*;
use tagship::core::RunState;

#[tokio::test]
async fn test_failing_step_stops_its_job() {
    let yaml = r#"
name: "Test: Step Failure"
stages:
  - id: build
    steps:
      - ./configure
      - make
      - make install
"#;
    let result = Scenario::new(yaml).fail_on("make").run().await;

    assert_pipeline_failed(&result);
    assert_stage_failed(&result, "build", "1 of 1 job(s) failed: build");
    assert_eq!(result.commands(), vec!["./configure", "make"]);
    assert!(result.error.as_deref().unwrap_or("").contains("failed in stage(s): build"));
}

#[tokio::test]
async fn test_continue_on_error_step() {
    let yaml = r#"
name: "Test: Continue On Error"
stages:
  - id: lint
    steps:
      - name: style
        run: flake8 .
        continue_on_error: true
      - python -m pytest
"#;
    let result = Scenario::new(yaml).fail_on("flake8").run().await;

    assert_pipeline_completed(&result);
    assert_eq!(result.count_commands("pytest"), 1);
}

#[tokio::test]
async fn test_allowed_failure_does_not_fail_pipeline() {
    let yaml = r#"
name: "Test: Allow Failure"
stages:
  - id: test
    steps: ["python -m pytest"]
  - id: nightly
    allow_failure: true
    steps: ["python -m pytest --runslow"]
  - id: report
    depends_on: [nightly]
    steps: ["coverage report"]
"#;
    let result = Scenario::new(yaml).fail_on("--runslow").run().await;

    assert_pipeline_completed(&result);
    assert_stage_completed(&result, "test");
    assert!(matches!(result.stage_state("nightly"), RunState::Failed { .. }));
    // an allowed failure still does not satisfy dependents
    assert_stage_skipped(&result, "report", "dependency 'nightly' did not succeed");
    assert_eq!(result.count_commands("coverage"), 0);
}

#[tokio::test]
async fn test_independent_stages_run_after_failure() {
    let yaml = r#"
name: "Test: Independent Stages"
stages:
  - id: test
    steps: ["python -m pytest"]
  - id: docs
    steps: ["make -C docs html"]
  - id: package
    depends_on: [test]
    steps: ["python setup.py sdist"]
"#;
    let result = Scenario::new(yaml).fail_on("pytest").run().await;

    assert_pipeline_failed(&result);
    assert_stage_completed(&result, "docs");
    assert_stage_skipped(&result, "package", "dependency 'test' did not succeed");
}

#[tokio::test]
async fn test_skips_cascade_through_dependencies() {
    let yaml = r#"
name: "Test: Cascading Skip"
stages:
  - id: test
    steps: ["python -m pytest"]
  - id: docs
    depends_on: [test]
    if: tag
    steps: ["make -C docs html"]
  - id: publish
    depends_on: [docs]
    steps: ["upload-docs"]
"#;
    let result = Scenario::new(yaml).branch("feature").run().await;

    assert_pipeline_completed(&result);
    assert_stage_skipped(&result, "docs", "condition 'tag' not met (branch feature)");
    assert_stage_skipped(&result, "publish", "dependency 'docs' did not succeed");
    assert_eq!(result.pipeline.state.skipped_stages, 2);
}
