//! Test: Deploy Credentials
//!
//! Credentials come from the environment and never show up in output.

use crate::helpers::*;

#[tokio::test]
async fn test_missing_password_fails_package_deploy() {
    let workspace = release_workspace();
    let result = Scenario::new(RELEASE_PIPELINE)
        .in_dir(workspace.path())
        .env("GITHUB_TOKEN", PAGES_TOKEN)
        .tagged("v0.4")
        .run()
        .await;

    assert_pipeline_failed(&result);
    assert_stage_failed(&result, "deploy", "package_index deploy failed");
    assert_stage_failed(&result, "deploy", "PYPI_PASSWORD");
    // targets run in order, pages went out before the failure
    assert_eq!(result.deployed("deploy"), vec!["pages"]);
    assert_eq!(result.count_commands("twine"), 0);
}

#[tokio::test]
async fn test_empty_token_counts_as_missing() {
    let workspace = release_workspace();
    let result = Scenario::new(RELEASE_PIPELINE)
        .in_dir(workspace.path())
        .env("GITHUB_TOKEN", "")
        .env("PYPI_PASSWORD", PYPI_PASSWORD)
        .tagged("v0.4")
        .run()
        .await;

    assert_pipeline_failed(&result);
    assert_stage_failed(&result, "deploy", "GITHUB_TOKEN");
    assert_eq!(result.count_commands("git"), 0);
}

#[tokio::test]
async fn test_missing_secret_is_harmless_without_tag() {
    let workspace = release_workspace();
    let result = Scenario::new(RELEASE_PIPELINE)
        .in_dir(workspace.path())
        .branch("master")
        .run()
        .await;

    assert_pipeline_completed(&result);
    assert_stage_skipped(&result, "deploy", "condition 'tag' not met");
}

#[tokio::test]
async fn test_token_in_step_output_is_masked() {
    let workspace = release_workspace();
    let leak = format!("using token={}", PAGES_TOKEN);
    let result = release_scenario(&workspace)
        .tagged("v0.4")
        .output("-m pytest", &leak)
        .run()
        .await;

    assert_pipeline_completed(&result);
    let output = result.all_output();
    assert!(output.contains("using token=[secure]"));
    assert!(!output.contains(PAGES_TOKEN));
}

#[tokio::test]
async fn test_password_in_failing_upload_is_masked() {
    let workspace = release_workspace();
    let result = release_scenario(&workspace)
        .tagged("v0.4")
        .output("twine upload", PYPI_PASSWORD)
        .fail_on("twine upload")
        .run()
        .await;

    assert_pipeline_failed(&result);
    assert_stage_failed(&result, "deploy", "package_index deploy failed");
    assert!(!result.all_output().contains(PYPI_PASSWORD));
}
