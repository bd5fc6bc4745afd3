//! Test: Fail-fast - what a failing matrix instance does to its siblings

use crate::helpers::*;
use crate::{CI_WORKFLOW, INSTANCES};
use cirun::core::{ExecutionStatus, RepoEvent, Secrets};
use cirun::execution::SchedulingStrategy;
use std::time::{Duration, Instant};

fn matrix_job(fail_fast: bool) -> String {
    format!(
        r#"
name: Fail fast
on: push
jobs:
  test:
    strategy:
      fail-fast: {}
      matrix:
        python: ['3.8', '3.9', '3.10']
    steps:
      - id: test
        run: pytest
"#,
        fail_fast
    )
}

#[tokio::test]
async fn test_siblings_unaffected_without_fail_fast() {
    let runner = MockRunner::new().fail_on_when("pytest", "MATRIX_PYTHON", "3.8", 1);
    let run = run_workflow(&matrix_job(false), RepoEvent::push("main"), runner).await;

    assert_eq!(run.status, ExecutionStatus::Failed);
    assert_job_failed(&run, "test[0]", "test", 1);
    assert_job_succeeded(&run, "test[1]");
    assert_job_succeeded(&run, "test[2]");
    assert_eq!(run.invocations.len(), 3);
}

#[tokio::test]
async fn test_fail_fast_cancels_unstarted_siblings() {
    let runner = MockRunner::new().fail_on_when("pytest", "MATRIX_PYTHON", "3.8", 1);
    let run = run_workflow(&matrix_job(true), RepoEvent::push("main"), runner).await;

    assert_eq!(run.status, ExecutionStatus::Failed);
    assert_job_failed(&run, "test[0]", "test", 1);
    assert_job_cancelled(&run, "test[1]");
    assert_job_cancelled(&run, "test[2]");
    assert_step_skipped(&run, "test[1]", "test");
    assert_eq!(run.invocations.len(), 1);
    assert_eq!(run.plan.state.cancelled_jobs, 2);
}

#[tokio::test]
async fn test_fail_fast_keeps_finished_siblings() {
    let runner = MockRunner::new().fail_on_when("pytest", "MATRIX_PYTHON", "3.9", 1);
    let run = run_workflow(&matrix_job(true), RepoEvent::push("main"), runner).await;

    assert_job_succeeded(&run, "test[0]");
    assert_job_failed(&run, "test[1]", "test", 1);
    assert_job_cancelled(&run, "test[2]");
}

#[tokio::test]
async fn test_fail_fast_stops_running_siblings() {
    let runner = MockRunner::new()
        .fail_on_when("pytest", "MATRIX_PYTHON", "3.8", 1)
        .with_delay(Duration::from_secs(30));

    let started = Instant::now();
    let run = run_workflow_with(
        &matrix_job(true),
        RepoEvent::push("main"),
        runner,
        SchedulingStrategy::Parallel,
        Secrets::new(),
    )
    .await;

    assert!(started.elapsed() < Duration::from_secs(10));
    assert_eq!(run.status, ExecutionStatus::Failed);
    assert_job_failed(&run, "test[0]", "test", 1);
    assert_job_cancelled(&run, "test[1]");
    assert_job_cancelled(&run, "test[2]");
}

#[tokio::test]
async fn test_limited_parallel_keeps_siblings_independent() {
    let runner = MockRunner::new().fail_on_when("pytest", "MATRIX_PYTHON_VERSION", "3.9", 1);
    let run = run_workflow_with(
        CI_WORKFLOW,
        RepoEvent::push("dev"),
        runner,
        SchedulingStrategy::LimitedParallel(2),
        Secrets::new(),
    )
    .await;

    assert_eq!(run.status, ExecutionStatus::Failed);
    assert_job_succeeded(&run, INSTANCES[0]);
    assert_job_failed(&run, INSTANCES[1], "test", 1);
    assert_job_succeeded(&run, INSTANCES[2]);
}

fn limited_matrix(max_parallel: usize) -> String {
    format!(
        r#"
name: Limited
on: push
jobs:
  test:
    strategy:
      max-parallel: {}
      fail-fast: false
      matrix:
        python: ['3.7', '3.8', '3.9', '3.10']
    steps:
      - run: pytest
"#,
        max_parallel
    )
}

#[tokio::test]
async fn test_max_parallel_bounds_running_instances() {
    for max_parallel in [1, 2] {
        let runner = MockRunner::new().with_delay(Duration::from_millis(200));
        let run = run_workflow_with(
            &limited_matrix(max_parallel),
            RepoEvent::push("main"),
            runner,
            SchedulingStrategy::Parallel,
            Secrets::new(),
        )
        .await;

        assert_eq!(run.status, ExecutionStatus::Completed);
        assert_eq!(run.invocations.len(), 4);
        assert_eq!(
            run.peak_concurrency, max_parallel,
            "max-parallel {} was not respected",
            max_parallel
        );
    }
}

#[tokio::test]
async fn test_without_max_parallel_instances_overlap() {
    let yaml = matrix_job(false);
    let runner = MockRunner::new().with_delay(Duration::from_millis(200));
    let run = run_workflow_with(
        &yaml,
        RepoEvent::push("main"),
        runner,
        SchedulingStrategy::Parallel,
        Secrets::new(),
    )
    .await;

    assert_eq!(run.status, ExecutionStatus::Completed);
    assert_eq!(run.peak_concurrency, 3);
}
