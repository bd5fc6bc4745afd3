//! Test: Matrix Expansion - one job instance per matrix combination

use crate::helpers::*;
use crate::{CI_WORKFLOW, INSTANCES};
use cirun::core::{ExecutionStatus, RepoEvent};

#[tokio::test]
async fn test_each_version_runs_exactly_once() {
    let run = run_workflow(CI_WORKFLOW, RepoEvent::push("dev"), MockRunner::new()).await;

    assert_eq!(run.status, ExecutionStatus::Completed);

    let mut versions: Vec<String> = run
        .invocations
        .iter()
        .filter(|i| i.script.starts_with("pytest"))
        .filter_map(|i| i.env.get("MATRIX_PYTHON_VERSION").cloned())
        .collect();
    versions.sort();
    assert_eq!(versions, vec!["3.10", "3.8", "3.9"]);
}

#[tokio::test]
async fn test_matrix_values_reach_scripts_and_names() {
    let run = run_workflow(CI_WORKFLOW, RepoEvent::push("dev"), MockRunner::new()).await;

    for (key, version) in INSTANCES.iter().zip(["3.8", "3.9", "3.10"]) {
        let scripts = run.scripts_for(key);
        assert_eq!(scripts[0], format!("conda create -n test python={}", version));
        assert_eq!(run.job(key).name, format!("build-linux ({})", version));
    }
}

#[tokio::test]
async fn test_include_and_exclude() {
    let yaml = r#"
name: Matrix
on: push
jobs:
  test:
    strategy:
      matrix:
        os: [ubuntu, macos]
        python: ['3.8', '3.9']
        exclude:
          - os: macos
            python: '3.8'
        include:
          - os: windows
            python: '3.9'
    steps:
      - run: echo ${{ matrix.os }}-${{ matrix.python }}
"#;

    let run = run_workflow(yaml, RepoEvent::push("main"), MockRunner::new()).await;

    assert_eq!(run.status, ExecutionStatus::Completed);
    let mut combos: Vec<String> = run.invocations.iter().map(|i| i.script.trim().to_string()).collect();
    combos.sort();
    assert_eq!(
        combos,
        vec![
            "echo macos-3.9",
            "echo ubuntu-3.8",
            "echo ubuntu-3.9",
            "echo windows-3.9",
        ]
    );
}

#[tokio::test]
async fn test_job_without_matrix_runs_once() {
    let yaml = r#"
name: Single
on: push
jobs:
  lint:
    steps:
      - run: flake8
"#;

    let run = run_workflow(yaml, RepoEvent::push("main"), MockRunner::new()).await;

    assert_eq!(run.plan.jobs.len(), 1);
    assert_eq!(run.plan.jobs[0].key, "lint");
    assert_eq!(run.scripts_for("lint"), vec!["flake8"]);
}
