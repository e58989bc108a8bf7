//! Test: Tag-Gated Releases
//!
//! Docs and packages are published only for tagged builds whose
//! test matrix passed.

use crate::helpers::*;
use tagship::execution::ExecutionEvent;

#[tokio::test]
async fn test_branch_build_skips_release() {
    let workspace = release_workspace();
    let result = release_scenario(&workspace).branch("master").run().await;

    assert_pipeline_completed(&result);
    assert_stage_completed(&result, "test");
    assert_stage_skipped(&result, "deploy", "condition 'tag' not met (branch master)");
    assert_eq!(result.count_commands("git"), 0);
    assert_eq!(result.count_commands("twine"), 0);
    assert!(result.deployed("deploy").is_empty());
}

#[tokio::test]
async fn test_tagged_build_publishes_docs_then_package() {
    let workspace = release_workspace();
    let result = release_scenario(&workspace).tagged("v0.4").run().await;

    assert_pipeline_completed(&result);
    assert_stage_completed(&result, "deploy");
    assert_commands_in_order(
        &result,
        &[
            "python3.7 -m pytest",
            "make -C docs html",
            "git init",
            "git push",
            "python setup.py sdist",
            "twine upload",
        ],
    );
    assert_eq!(result.count_commands("git push"), 1);
    assert_eq!(result.count_commands("twine upload"), 1);
    assert_eq!(result.deployed("deploy"), vec!["pages", "package_index"]);
}

#[tokio::test]
async fn test_pages_push_targets_repo_branch() {
    let workspace = release_workspace();
    let result = release_scenario(&workspace).tagged("v0.4").run().await;

    let push = result
        .specs
        .iter()
        .find(|s| s.command.contains("git push"))
        .expect("pages deploy should push");
    assert!(push.command.contains("github.com/someone/pvinspect.git"));
    assert!(push.command.ends_with("'HEAD:refs/heads/gh-pages'"));
    // the token travels in the environment, never in the command line
    assert!(!push.command.contains(PAGES_TOKEN));
    assert_eq!(push.env.get("TAGSHIP_PAGES_TOKEN"), Some(&PAGES_TOKEN.to_string()));
    assert_eq!(
        push.working_dir.as_deref(),
        Some(workspace.path().join("docs/_build/html").as_path())
    );
}

#[tokio::test]
async fn test_package_upload_uses_credentials_from_env() {
    let workspace = release_workspace();
    let result = release_scenario(&workspace).tagged("v0.4").run().await;

    let upload = result
        .specs
        .iter()
        .find(|s| s.command.contains("twine upload"))
        .expect("package deploy should upload");
    assert!(upload.command.contains("--non-interactive"));
    assert!(!upload.command.contains(PYPI_PASSWORD));
    assert_eq!(upload.env.get("TWINE_USERNAME"), Some(&"__token__".to_string()));
    assert_eq!(upload.env.get("TWINE_PASSWORD"), Some(&PYPI_PASSWORD.to_string()));
}

#[tokio::test]
async fn test_failing_matrix_job_blocks_release() {
    let workspace = release_workspace();
    let result = release_scenario(&workspace)
        .tagged("v0.4")
        .fail_on("python3.7 -m pytest")
        .run()
        .await;

    assert_pipeline_failed(&result);
    assert_stage_failed(&result, "test", "1 of 2 job(s) failed");
    assert_stage_skipped(&result, "deploy", "dependency 'test' did not succeed");
    assert_eq!(result.count_commands("make -C docs"), 0);
    assert_eq!(result.count_commands("git push"), 0);
    assert_eq!(result.count_commands("twine"), 0);
}

#[tokio::test]
async fn test_failing_push_stops_later_targets() {
    let workspace = release_workspace();
    let result = release_scenario(&workspace)
        .tagged("v0.4")
        .fail_on("git push")
        .run()
        .await;

    assert_pipeline_failed(&result);
    assert_stage_failed(&result, "deploy", "pages deploy failed");
    assert_eq!(result.count_commands("twine"), 0);
    assert!(result.deployed("deploy").is_empty());
    assert!(result.events.iter().any(|e| matches!(
        e,
        ExecutionEvent::DeployFailed { provider, .. } if provider == "pages"
    )));
}

#[tokio::test]
async fn test_missing_docs_fails_pages_deploy() {
    let workspace = tempfile::tempdir().unwrap();
    let result = release_scenario(&workspace).tagged("v0.4").run().await;

    assert_pipeline_failed(&result);
    assert_stage_failed(&result, "deploy", "pages deploy failed");
    assert_eq!(result.count_commands("git"), 0);
}

#[tokio::test]
async fn test_target_condition_narrows_stage() {
    let yaml = r#"
name: "Test: Target Conditions"
stages:
  - id: publish
    steps: ["make dist"]
    deploy:
      - provider: package_index
        if: tag =~ ^v
        username: __token__
        password: { env: PYPI_PASSWORD }
"#;
    let workspace = release_workspace();
    let result = Scenario::new(yaml)
        .in_dir(workspace.path())
        .env("PYPI_PASSWORD", PYPI_PASSWORD)
        .tagged("nightly-20200101")
        .run()
        .await;

    assert_pipeline_completed(&result);
    assert_eq!(result.count_commands("make dist"), 1);
    assert_eq!(result.count_commands("twine"), 0);
    assert!(result.events.iter().any(|e| matches!(
        e,
        ExecutionEvent::DeploySkipped { provider, .. } if provider == "package_index"
    )));
}

#[tokio::test]
async fn test_deploy_commands_use_pipeline_timeout() {
    let yaml = RELEASE_PIPELINE.replace(
        "name: \"pvinspect\"",
        "name: \"pvinspect\"\ndefault_timeout_secs: 120",
    );
    let workspace = release_workspace();
    let result = Scenario::new(&yaml)
        .in_dir(workspace.path())
        .env("GITHUB_TOKEN", PAGES_TOKEN)
        .env("PYPI_PASSWORD", PYPI_PASSWORD)
        .tagged("v0.4")
        .run()
        .await;

    assert_pipeline_completed(&result);
    for needle in ["git push", "python setup.py sdist", "twine upload"] {
        let spec = result
            .specs
            .iter()
            .find(|s| s.command.contains(needle))
            .unwrap_or_else(|| panic!("no command contains '{}'", needle));
        assert_eq!(spec.timeout_secs, 120, "{}", spec.command);
    }
}
