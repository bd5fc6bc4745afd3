//! Test: Trigger Matching - which events start a run

use crate::helpers::*;
use crate::CI_WORKFLOW;
use cirun::core::{EventType, ExecutionStatus, RepoEvent};

#[tokio::test]
async fn test_push_to_listed_branches_runs() {
    for branch in ["master", "dev"] {
        let run = run_workflow(CI_WORKFLOW, RepoEvent::push(branch), MockRunner::new()).await;

        assert_eq!(run.status, ExecutionStatus::Completed, "push to {}", branch);
        assert_eq!(run.plan.jobs.len(), 3);
    }
}

#[tokio::test]
async fn test_push_to_other_branch_is_skipped() {
    let run = run_workflow(CI_WORKFLOW, RepoEvent::push("feature/login"), MockRunner::new()).await;

    assert_eq!(run.status, ExecutionStatus::Skipped);
    assert!(run.plan.jobs.is_empty());
    assert!(run.invocations.is_empty());
    assert!(run
        .events
        .iter()
        .any(|e| matches!(e, cirun::ExecutionEvent::RunSkipped { .. })));
}

#[tokio::test]
async fn test_pull_request_to_any_branch_runs() {
    let run = run_workflow(
        CI_WORKFLOW,
        RepoEvent::pull_request("feature/login"),
        MockRunner::new(),
    )
    .await;

    assert_eq!(run.status, ExecutionStatus::Completed);
    assert_eq!(run.invocations.len(), 3 * 4);
}

#[tokio::test]
async fn test_unlisted_event_is_skipped() {
    let run = run_workflow(
        CI_WORKFLOW,
        RepoEvent::new(EventType::parse("release"), "master"),
        MockRunner::new(),
    )
    .await;

    assert_eq!(run.status, ExecutionStatus::Skipped);
    assert!(run.invocations.is_empty());
}

#[tokio::test]
async fn test_branch_globs_and_ignores() {
    let yaml = r#"
name: Release
on:
  push:
    branches: ['release/**', '!release/**-rc']
jobs:
  publish:
    steps:
      - run: make publish
"#;

    let run = run_workflow(yaml, RepoEvent::push("release/1.2/final"), MockRunner::new()).await;
    assert_eq!(run.status, ExecutionStatus::Completed);

    let run = run_workflow(yaml, RepoEvent::push("release/1.2-rc"), MockRunner::new()).await;
    assert_eq!(run.status, ExecutionStatus::Skipped);

    let run = run_workflow(yaml, RepoEvent::push("main"), MockRunner::new()).await;
    assert_eq!(run.status, ExecutionStatus::Skipped);
}
