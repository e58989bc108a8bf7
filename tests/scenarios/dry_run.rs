//! Test: Dry Run
//!
//! A dry run reports what would execute without running anything.

use crate::helpers::*;

#[tokio::test]
async fn test_dry_run_executes_nothing() {
    let workspace = release_workspace();
    let result = Scenario::new(RELEASE_PIPELINE)
        .in_dir(workspace.path())
        .tagged("v0.4")
        .dry_run()
        .run()
        .await;

    assert_pipeline_completed(&result);
    assert!(result.commands().is_empty(), "ran: {:#?}", result.commands());
    assert_eq!(result.deployed("deploy"), vec!["pages", "package_index"]);
}

#[tokio::test]
async fn test_dry_run_reports_planned_commands() {
    let workspace = release_workspace();
    let result = Scenario::new(RELEASE_PIPELINE)
        .in_dir(workspace.path())
        .tagged("v0.4")
        .dry_run()
        .run()
        .await;

    let output = result.all_output();
    assert!(output.contains("[dry-run] python3.6 -m pytest"));
    assert!(output.contains("[dry-run] make -C docs html"));
    assert!(output.contains("[dry-run] twine upload"));
}

#[tokio::test]
async fn test_dry_run_does_not_need_credentials() {
    let workspace = tempfile::tempdir().unwrap();
    let result = Scenario::new(RELEASE_PIPELINE)
        .in_dir(workspace.path())
        .tagged("v0.4")
        .dry_run()
        .run()
        .await;

    // neither secrets nor built artifacts are required
    assert_pipeline_completed(&result);
}

#[tokio::test]
async fn test_dry_run_still_honors_conditions() {
    let result = Scenario::new(RELEASE_PIPELINE)
        .branch("develop")
        .dry_run()
        .run()
        .await;

    assert_pipeline_completed(&result);
    assert_stage_skipped(&result, "deploy", "(branch develop)");
    assert!(!result.all_output().contains("twine"));
}
