//! Test: Dev Push - the end-to-end run of the package workflow

use crate::helpers::*;
use crate::{CI_WORKFLOW, INSTANCES};
use cirun::core::{ExecutionStatus, JobStatus, RepoEvent};
use cirun::persistence::create_summary;

#[tokio::test]
async fn test_dev_push_runs_three_jobs_in_order() {
    let run = run_workflow(CI_WORKFLOW, RepoEvent::push("dev"), MockRunner::new()).await;

    assert_eq!(run.status, ExecutionStatus::Completed);
    assert_eq!(run.plan.jobs.len(), 3);

    for (key, version) in INSTANCES.iter().zip(["3.8", "3.9", "3.10"]) {
        assert_job_succeeded(&run, key);
        assert_executed_steps(&run, key, &["step-1", "setup", "install", "test", "upload"]);
        assert_eq!(
            run.scripts_for(key),
            vec![
                format!("conda create -n test python={}", version),
                "pip install .".to_string(),
                "pytest --cov".to_string(),
                "codecov -t $CODECOV_TOKEN".to_string(),
            ]
        );
    }
}

#[tokio::test]
async fn test_failing_tests_skip_upload_only_for_that_job() {
    let runner = MockRunner::new().fail_on_when("pytest", "MATRIX_PYTHON_VERSION", "3.9", 1);
    let run = run_workflow(CI_WORKFLOW, RepoEvent::push("dev"), runner).await;

    assert_eq!(run.status, ExecutionStatus::Failed);

    assert_job_failed(&run, INSTANCES[1], "test", 1);
    assert_step_skipped(&run, INSTANCES[1], "upload");
    assert!(!run
        .scripts_for(INSTANCES[1])
        .iter()
        .any(|s| s.starts_with("codecov")));

    for key in [INSTANCES[0], INSTANCES[2]] {
        assert_job_succeeded(&run, key);
        assert_executed_steps(&run, key, &["step-1", "setup", "install", "test", "upload"]);
    }
}

#[tokio::test]
async fn test_run_summary_reports_each_job() {
    let runner = MockRunner::new().fail_on_when("pytest", "MATRIX_PYTHON_VERSION", "3.10", 4);
    let run = run_workflow(CI_WORKFLOW, RepoEvent::push("master"), runner).await;

    let summary = create_summary(&run.plan);

    assert_eq!(summary.status, ExecutionStatus::Failed);
    assert_eq!(summary.event, "push");
    assert_eq!(summary.branch, "master");
    assert_eq!(summary.count(JobStatus::Succeeded), 2);
    assert_eq!(summary.count(JobStatus::Failed), 1);

    let failed = &summary.jobs[2];
    assert_eq!(failed.name, "build-linux (3.10)");
    assert_eq!(failed.exit_code, Some(4));
    assert_eq!(failed.failed_step.as_deref(), Some("test"));
    assert_eq!(failed.matrix.as_deref(), Some("3.10"));
    assert_eq!(failed.executed_steps, vec!["step-1", "setup", "install", "test"]);
}
