//! Test: Build Matrix
//!
//! Every matrix combination becomes a job running the stage's steps.

use crate::helpers::*;
use tagship::core::config::PipelineConfig;
use tagship::execution::SchedulingStrategy;

const MATRIX: &str = r#"
name: "Test: Matrix"
stages:
  - id: test
    matrix:
      python: ["3.6", "3.7", "3.8"]
      numpy: ["1.17", "1.18"]
    steps:
      - python{{ matrix.python }} -m pip install numpy=={{ matrix.numpy }}
      - python{{ matrix.python }} -m pytest
"#;

#[tokio::test]
async fn test_matrix_expands_to_jobs() {
    let result = Scenario::new(MATRIX).run().await;

    assert_pipeline_completed(&result);
    assert_stage_completed(&result, "test");
    assert_eq!(result.pipeline.stage("test").unwrap().jobs.len(), 6);
    assert_eq!(result.count_commands("-m pytest"), 6);
    assert_eq!(result.count_commands("python3.7 -m pip install numpy==1.18"), 1);
}

#[tokio::test]
async fn test_matrix_values_exported_to_env() {
    let result = Scenario::new(MATRIX).run().await;

    let spec = result
        .specs
        .iter()
        .find(|s| s.command == "python3.8 -m pytest")
        .expect("pytest should run under python3.8");
    let numpy = spec.env.get("TAGSHIP_MATRIX_NUMPY").cloned().unwrap_or_default();
    assert_eq!(spec.env.get("TAGSHIP_MATRIX_PYTHON"), Some(&"3.8".to_string()));
    assert!(numpy == "1.17" || numpy == "1.18");
}

#[tokio::test]
async fn test_job_runs_its_steps_in_order() {
    let result = Scenario::new(MATRIX).run().await;

    assert_commands_in_order(
        &result,
        &["python3.6 -m pip install numpy==1.17", "python3.6 -m pytest"],
    );
}

#[tokio::test]
async fn test_sequential_strategy_runs_one_job_at_a_time() {
    let result = Scenario::new(MATRIX).slow(10).run().await;

    assert_pipeline_completed(&result);
    assert_eq!(result.peak_concurrency, 1);
}

#[tokio::test]
async fn test_parallel_strategy_runs_every_job() {
    let result = Scenario::new(MATRIX)
        .strategy(SchedulingStrategy::Parallel)
        .slow(20)
        .run()
        .await;

    assert_pipeline_completed(&result);
    assert_eq!(result.commands().len(), 12);
    assert_eq!(result.peak_concurrency, 6);
}

#[tokio::test]
async fn test_limited_parallel_strategy_caps_running_jobs() {
    let result = Scenario::new(MATRIX)
        .strategy(SchedulingStrategy::LimitedParallel(2))
        .slow(20)
        .run()
        .await;

    assert_pipeline_completed(&result);
    assert_eq!(result.count_commands("-m pytest"), 6);
    assert_eq!(result.peak_concurrency, 2);
}

#[tokio::test]
async fn test_limit_above_job_count_runs_all_jobs_at_once() {
    let result = Scenario::new(MATRIX)
        .strategy(SchedulingStrategy::LimitedParallel(10))
        .slow(20)
        .run()
        .await;

    assert_pipeline_completed(&result);
    assert_eq!(result.peak_concurrency, 6);
}

#[tokio::test]
async fn test_matrix_excluding_every_job_is_rejected() {
    let yaml = r#"
name: "Test: Empty Matrix"
stages:
  - id: deploy
    matrix:
      python: ["3.6"]
      exclude:
        - python: "3.6"
    steps:
      - make -C docs html
    deploy:
      - provider: package_index
        username: __token__
        password: { env: PYPI_PASSWORD }
"#;

    // a stage without jobs would deploy without building anything
    let err = PipelineConfig::from_yaml(yaml).unwrap_err();
    assert!(format!("{:#}", err).contains("no jobs"));
}

#[tokio::test]
async fn test_one_failing_combination_fails_stage() {
    let result = Scenario::new(MATRIX)
        .fail_on("python3.7 -m pytest")
        .run()
        .await;

    assert_pipeline_failed(&result);
    assert_stage_failed(&result, "test", "2 of 6 job(s) failed");
    // the other combinations still ran
    assert_eq!(result.count_commands("-m pytest"), 6);
}
