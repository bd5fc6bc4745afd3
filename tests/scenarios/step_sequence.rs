//! Test: Step Sequence - strict order, halt on first failure

use crate::helpers::*;
use cirun::core::{ExecutionStatus, RepoEvent, StepState};

const PIPELINE: &str = r#"
name: Steps
on: push
jobs:
  build:
    steps:
      - id: setup
        run: ./configure
      - id: compile
        run: make
      - id: check
        run: make check
      - id: package
        run: make dist
"#;

#[tokio::test]
async fn test_steps_run_in_declared_order() {
    let run = run_workflow(PIPELINE, RepoEvent::push("main"), MockRunner::new()).await;

    assert_eq!(run.status, ExecutionStatus::Completed);
    assert_eq!(
        run.scripts_for("build"),
        vec!["./configure", "make", "make check", "make dist"]
    );
    assert_executed_steps(&run, "build", &["setup", "compile", "check", "package"]);
    assert_eq!(run.job("build").state.exit_code(), Some(0));
}

#[tokio::test]
async fn test_failure_halts_later_steps() {
    let runner = MockRunner::new().fail_on("make check", 2);
    let run = run_workflow(PIPELINE, RepoEvent::push("main"), runner).await;

    assert_eq!(run.status, ExecutionStatus::Failed);
    assert_job_failed(&run, "build", "check", 2);
    assert_executed_steps(&run, "build", &["setup", "compile", "check"]);
    assert_step_skipped(&run, "build", "package");
    assert!(!run.scripts_for("build").contains(&"make dist".to_string()));
}

#[tokio::test]
async fn test_first_step_failure_runs_nothing_else() {
    let runner = MockRunner::new().fail_on("./configure", 127);
    let run = run_workflow(PIPELINE, RepoEvent::push("main"), runner).await;

    assert_job_failed(&run, "build", "setup", 127);
    assert_eq!(run.scripts_for("build"), vec!["./configure"]);
    for step in ["compile", "check", "package"] {
        assert_step_skipped(&run, "build", step);
    }
}

#[tokio::test]
async fn test_continue_on_error_keeps_going() {
    let yaml = r#"
name: Lenient
on: push
jobs:
  build:
    steps:
      - id: lint
        run: flake8
        continue-on-error: true
      - id: test
        run: pytest
"#;
    let runner = MockRunner::new().fail_on("flake8", 1);
    let run = run_workflow(yaml, RepoEvent::push("main"), runner).await;

    assert_eq!(run.status, ExecutionStatus::Completed);
    assert_job_succeeded(&run, "build");
    assert_eq!(run.scripts_for("build"), vec!["flake8", "pytest"]);
    assert!(matches!(
        run.job("build").steps[0].state,
        StepState::Failed { continued: true, .. }
    ));
}

#[tokio::test]
async fn test_unknown_action_fails_the_step() {
    let yaml = r#"
name: Actions
on: push
jobs:
  build:
    steps:
      - uses: actions/checkout@v2
      - id: codecov
        uses: codecov/codecov-action@v1
      - id: after
        run: echo done
"#;
    let run = run_workflow(yaml, RepoEvent::push("main"), MockRunner::new()).await;

    assert_eq!(run.status, ExecutionStatus::Failed);
    assert_job_failed(&run, "build", "codecov", 1);
    assert_step_skipped(&run, "build", "after");
    assert!(run.invocations.is_empty());
}

#[tokio::test]
async fn test_step_env_does_not_leak() {
    let yaml = r#"
name: Env
on: push
env:
  LEVEL: workflow
jobs:
  build:
    env:
      LEVEL: job
    steps:
      - id: first
        env:
          LEVEL: step
          ONLY_HERE: 'yes'
        run: one
      - id: second
        run: two
"#;
    let run = run_workflow(yaml, RepoEvent::push("main"), MockRunner::new()).await;

    let calls = run.invocations_for("build");
    assert_eq!(calls[0].env.get("LEVEL").map(String::as_str), Some("step"));
    assert_eq!(calls[0].env.get("ONLY_HERE").map(String::as_str), Some("yes"));
    assert_eq!(calls[1].env.get("LEVEL").map(String::as_str), Some("job"));
    assert!(!calls[1].env.contains_key("ONLY_HERE"));
}
