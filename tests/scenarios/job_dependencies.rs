//! Test: Job Dependencies - `needs` ordering and skipping

use crate::helpers::*;
use cirun::core::{ExecutionStatus, RepoEvent};

const CHAIN: &str = r#"
name: Chain
on: push
jobs:
  lint:
    steps:
      - run: flake8
  test:
    needs: lint
    strategy:
      fail-fast: false
      matrix:
        python: ['3.8', '3.9']
    steps:
      - run: pytest
  deploy:
    needs: [test]
    steps:
      - run: make deploy
  docs:
    steps:
      - run: make docs
"#;

#[tokio::test]
async fn test_needs_run_before_dependents() {
    let run = run_workflow(CHAIN, RepoEvent::push("main"), MockRunner::new()).await;

    assert_eq!(run.status, ExecutionStatus::Completed);
    let order: Vec<String> = run.invocations.iter().map(|i| i.script.trim().to_string()).collect();
    let position = |script: &str| {
        order
            .iter()
            .position(|s| s == script)
            .unwrap_or_else(|| panic!("{} did not run", script))
    };

    assert!(position("flake8") < position("pytest"));
    assert!(order.iter().rposition(|s| s == "pytest").unwrap() < position("make deploy"));
    assert_eq!(order.len(), 5);
}

#[tokio::test]
async fn test_failed_need_skips_dependents_transitively() {
    let runner = MockRunner::new().fail_on("flake8", 1);
    let run = run_workflow(CHAIN, RepoEvent::push("main"), runner).await;

    assert_eq!(run.status, ExecutionStatus::Failed);
    assert_job_failed(&run, "lint", "step-1", 1);
    assert_job_skipped(&run, "test[0]");
    assert_job_skipped(&run, "test[1]");
    assert_job_skipped(&run, "deploy");
    assert_job_succeeded(&run, "docs");
    assert_eq!(run.plan.state.skipped_jobs, 3);
}

#[tokio::test]
async fn test_one_failed_instance_blocks_dependents() {
    let runner = MockRunner::new().fail_on_when("pytest", "MATRIX_PYTHON", "3.9", 1);
    let run = run_workflow(CHAIN, RepoEvent::push("main"), runner).await;

    assert_job_succeeded(&run, "test[0]");
    assert_job_failed(&run, "test[1]", "step-1", 1);
    assert_job_skipped(&run, "deploy");
    assert!(run.scripts_for("deploy").is_empty());
}

#[tokio::test]
async fn test_job_selection_pulls_in_needs() {
    let workflow = cirun::core::config::WorkflowConfig::from_yaml(CHAIN)
        .and_then(|config| config.to_workflow())
        .unwrap();
    let plan = cirun::execution::Planner::new()
        .with_jobs(vec!["deploy".to_string()])
        .plan(&workflow, &RepoEvent::push("main"))
        .unwrap();

    let mut keys: Vec<&str> = plan.jobs.iter().map(|j| j.key.as_str()).collect();
    keys.sort();
    assert_eq!(keys, vec!["deploy", "lint", "test[0]", "test[1]"]);
}
