//! Test: Variable Substitution
//!
//! Commands are rendered from pipeline variables, trigger values and
//! matrix values before they run.

use crate::helpers::*;

#[tokio::test]
async fn test_pipeline_variables_and_trigger_values() {
    let yaml = r#"
name: "Test: Variables"
variables:
  package: pvinspect
  retries: 3
stages:
  - id: build
    steps:
      - echo building {{ package }} at {{ tag }}
      - pip install --retries {{retries}} {{ package }}
"#;
    let result = Scenario::new(yaml).tagged("v0.4.1").run().await;

    assert_pipeline_completed(&result);
    assert_eq!(
        result.commands(),
        vec!["echo building pvinspect at v0.4.1", "pip install --retries 3 pvinspect"]
    );
}

#[tokio::test]
async fn test_matrix_placeholders() {
    let yaml = r#"
name: "Test: Matrix Variables"
stages:
  - id: test
    matrix:
      python: ["3.6"]
    steps:
      - tox -e py{{ matrix.python }}
"#;
    let result = Scenario::new(yaml).run().await;

    assert_eq!(result.commands(), vec!["tox -e py3.6"]);
}

#[tokio::test]
async fn test_unknown_placeholder_left_intact() {
    let yaml = r#"
name: "Test: Unknown Variable"
stages:
  - id: build
    steps:
      - echo {{ not_defined }} on {{ branch }}
"#;
    let result = Scenario::new(yaml).branch("develop").run().await;

    assert_pipeline_completed(&result);
    assert_eq!(result.commands(), vec!["echo {{ not_defined }} on develop"]);
}

#[tokio::test]
async fn test_environment_layers() {
    let yaml = r#"
name: "Test: Environment"
env:
  LEVEL: pipeline
  CI: "true"
stages:
  - id: test
    env:
      LEVEL: stage
    steps:
      - name: run
        run: ./run-tests
        env:
          EXTRA: step
"#;
    let result = Scenario::new(yaml).tagged("v1.0").run().await;

    let env = &result.specs[0].env;
    assert_eq!(env.get("CI"), Some(&"true".to_string()));
    assert_eq!(env.get("LEVEL"), Some(&"stage".to_string()));
    assert_eq!(env.get("EXTRA"), Some(&"step".to_string()));
    assert_eq!(env.get("TAGSHIP_TAG"), Some(&"v1.0".to_string()));
}

#[tokio::test]
async fn test_commit_message_rendered_with_tag() {
    let workspace = release_workspace();
    let result = release_scenario(&workspace).tagged("v0.4").run().await;

    assert_eq!(result.count_commands("-m 'Deploy v0.4 to pages'"), 1);
}
