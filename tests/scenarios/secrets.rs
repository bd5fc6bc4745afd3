//! Test: Secrets - scoped to the steps that ask for them, masked in output

use crate::helpers::*;
use crate::{CI_WORKFLOW, INSTANCES};
use cirun::core::{ExecutionStatus, RepoEvent, Secrets};
use cirun::execution::SchedulingStrategy;

const TOKEN: &str = "c0dec0v-t0ken";

fn secrets() -> Secrets {
    let mut secrets = Secrets::new();
    secrets.insert("CODECOV_TOKEN", TOKEN);
    secrets
}

#[tokio::test]
async fn test_secret_only_reaches_the_step_that_binds_it() {
    let run = run_workflow_with(
        CI_WORKFLOW,
        RepoEvent::push("dev"),
        MockRunner::new(),
        SchedulingStrategy::Sequential,
        secrets(),
    )
    .await;

    assert_eq!(run.status, ExecutionStatus::Completed);
    for key in INSTANCES {
        let calls = run.invocations_for(key);
        let (upload, others) = calls
            .split_last()
            .expect("instance should have run steps");

        assert!(upload.script.starts_with("codecov"));
        assert_eq!(
            upload.env.get("CODECOV_TOKEN").map(String::as_str),
            Some(TOKEN)
        );
        for call in others {
            assert!(!call.env.contains_key("CODECOV_TOKEN"));
            assert!(!call.env.values().any(|v| v.contains(TOKEN)));
        }
    }
}

#[tokio::test]
async fn test_secret_values_are_masked_in_output() {
    let yaml = r#"
name: Leaky
on: push
jobs:
  deploy:
    steps:
      - id: deploy
        run: 'curl -H "Authorization: ${{ secrets.CODECOV_TOKEN }}" https://example.invalid'
"#;
    let run = run_workflow_with(
        yaml,
        RepoEvent::push("main"),
        MockRunner::new(),
        SchedulingStrategy::Sequential,
        secrets(),
    )
    .await;

    // The command itself receives the real value
    assert!(run.invocations[0].script.contains(TOKEN));

    let lines = run.output_lines();
    assert!(!lines.is_empty());
    assert!(lines.iter().all(|line| !line.contains(TOKEN)));
    assert!(lines.iter().any(|line| line.contains("***")));

    let tail = &run.job("deploy").steps[0].output_tail;
    assert!(tail.iter().all(|line| !line.contains(TOKEN)));
}

#[tokio::test]
async fn test_missing_secret_renders_empty() {
    let run = run_workflow(CI_WORKFLOW, RepoEvent::push("dev"), MockRunner::new()).await;

    let calls = run.invocations_for(INSTANCES[0]);
    let upload = calls.last().expect("upload should run");
    assert_eq!(upload.env.get("CODECOV_TOKEN").map(String::as_str), Some(""));
}
