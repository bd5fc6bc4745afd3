//! Test utility functions for cirun
#![allow(dead_code)]

use cirun::core::config::WorkflowConfig;
use cirun::core::{ExecutionStatus, JobInstance, JobState, RepoEvent, Secrets, StepState};
use cirun::execution::executor::file_safe;
use cirun::execution::{ExecutionEvent, Planner, RunPlan, SchedulingStrategy, WorkflowEngine};
use cirun::runner::{
    CommandOutput, CommandRunner, CommandSpec, OutputSink, OutputStream, RunnerError,
};

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// One command the mock runner was asked to run
#[derive(Debug, Clone)]
pub struct Invocation {
    /// Instance directory name, i.e. the file-safe instance key
    pub instance: String,
    pub script: String,
    pub env: BTreeMap<String, String>,
}

struct FailRule {
    script: String,
    when: Option<(String, String)>,
    exit_code: i32,
}

/// Mock runner that reads the rendered script and replays configured failures
#[derive(Default)]
pub struct MockRunner {
    rules: Vec<FailRule>,
    slow: Option<Duration>,
    invocations: Arc<Mutex<Vec<Invocation>>>,
    running: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

/// Decrements the running count when a command finishes or is dropped
struct Running(Arc<AtomicUsize>);

impl Drop for Running {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl MockRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scripts containing `script` exit with `exit_code`
    pub fn fail_on(mut self, script: &str, exit_code: i32) -> Self {
        self.rules.push(FailRule {
            script: script.to_string(),
            when: None,
            exit_code,
        });
        self
    }

    /// Like `fail_on`, but only when env var `key` equals `value`
    pub fn fail_on_when(mut self, script: &str, key: &str, value: &str, exit_code: i32) -> Self {
        self.rules.push(FailRule {
            script: script.to_string(),
            when: Some((key.to_string(), value.to_string())),
            exit_code,
        });
        self
    }

    /// Successful commands take this long
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.slow = Some(delay);
        self
    }

    /// Most commands that were running at the same time
    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn invocations(&self) -> Vec<Invocation> {
        self.invocations.lock().unwrap().clone()
    }

    fn exit_code_for(&self, script: &str, env: &BTreeMap<String, String>) -> i32 {
        self.rules
            .iter()
            .find(|rule| {
                script.contains(&rule.script)
                    && rule
                        .when
                        .as_ref()
                        .map_or(true, |(key, value)| env.get(key) == Some(value))
            })
            .map_or(0, |rule| rule.exit_code)
    }
}

#[async_trait]
impl CommandRunner for MockRunner {
    async fn run(
        &self,
        command: &CommandSpec,
        sink: Option<&dyn OutputSink>,
    ) -> Result<CommandOutput, RunnerError> {
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        let _running = Running(Arc::clone(&self.running));

        let path = command.args.last().cloned().unwrap_or_default();
        let script = std::fs::read_to_string(&path)?;
        let instance = Path::new(&path)
            .parent()
            .and_then(|dir| dir.file_name())
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_default();

        self.invocations.lock().unwrap().push(Invocation {
            instance,
            script: script.clone(),
            env: command.env.clone(),
        });

        if let Some(sink) = sink {
            for line in script.lines() {
                sink.on_line(OutputStream::Stdout, line);
            }
        }

        let exit_code = self.exit_code_for(&script, &command.env);
        if exit_code == 0 {
            if let Some(delay) = self.slow {
                tokio::time::sleep(delay).await;
            }
        }

        Ok(CommandOutput::new(exit_code, script, String::new(), Duration::ZERO))
    }
}

/// Everything observable about one test run
pub struct TestRun {
    pub plan: RunPlan,
    pub status: ExecutionStatus,
    pub events: Vec<ExecutionEvent>,
    pub invocations: Vec<Invocation>,
    pub peak_concurrency: usize,
}

impl TestRun {
    pub fn job(&self, key: &str) -> &JobInstance {
        self.plan
            .instance(key)
            .unwrap_or_else(|| panic!("Job instance '{}' not in plan", key))
    }

    /// Scripts one instance ran, in order
    pub fn scripts_for(&self, key: &str) -> Vec<String> {
        let dir = file_safe(key);
        self.invocations
            .iter()
            .filter(|i| i.instance == dir)
            .map(|i| i.script.trim().to_string())
            .collect()
    }

    pub fn invocations_for(&self, key: &str) -> Vec<&Invocation> {
        let dir = file_safe(key);
        self.invocations.iter().filter(|i| i.instance == dir).collect()
    }

    pub fn output_lines(&self) -> Vec<String> {
        self.events
            .iter()
            .filter_map(|e| match e {
                ExecutionEvent::StepOutput { line, .. } => Some(line.clone()),
                _ => None,
            })
            .collect()
    }
}

pub fn plan(yaml: &str, event: &RepoEvent) -> RunPlan {
    let workflow = WorkflowConfig::from_yaml(yaml)
        .and_then(|config| config.to_workflow())
        .expect("workflow should load");
    Planner::new().plan(&workflow, event).expect("plan should build")
}

/// Run a workflow sequentially with the mock runner
pub async fn run_workflow(yaml: &str, event: RepoEvent, runner: MockRunner) -> TestRun {
    run_workflow_with(yaml, event, runner, SchedulingStrategy::Sequential, Secrets::new()).await
}

pub async fn run_workflow_with(
    yaml: &str,
    event: RepoEvent,
    runner: MockRunner,
    strategy: SchedulingStrategy,
    secrets: Secrets,
) -> TestRun {
    let mut plan = plan(yaml, &event);
    let invocations = Arc::clone(&runner.invocations);
    let peak = Arc::clone(&runner.peak);

    let engine = WorkflowEngine::new(runner, strategy)
        .with_secrets(secrets)
        .with_workspace(std::env::temp_dir())
        .with_temp_root(std::env::temp_dir().join("cirun-tests"));

    let events = Arc::new(Mutex::new(Vec::new()));
    let collected = Arc::clone(&events);
    engine.add_event_handler(move |event| collected.lock().unwrap().push(event));

    let status = engine.execute(&mut plan).await.expect("run should execute");

    let events = events.lock().unwrap().clone();
    let invocations = invocations.lock().unwrap().clone();
    TestRun {
        plan,
        status,
        events,
        invocations,
        peak_concurrency: peak.load(Ordering::SeqCst),
    }
}

/// Assert the instance succeeded
pub fn assert_job_succeeded(run: &TestRun, key: &str) {
    let job = run.job(key);
    assert!(
        job.state.is_success(),
        "Job '{}' should have succeeded, but is {:?}",
        key,
        job.state
    );
}

/// Assert the instance failed at `step_id` with `exit_code`
pub fn assert_job_failed(run: &TestRun, key: &str, step_id: &str, exit_code: i32) {
    match &run.job(key).state {
        JobState::Failed {
            failed_step,
            exit_code: code,
            ..
        } => {
            assert_eq!(failed_step, step_id, "Job '{}' failed at the wrong step", key);
            assert_eq!(*code, exit_code, "Job '{}' has the wrong exit code", key);
        }
        other => panic!("Job '{}' should have failed, but is {:?}", key, other),
    }
}

pub fn assert_job_cancelled(run: &TestRun, key: &str) {
    let state = &run.job(key).state;
    assert!(
        matches!(state, JobState::Cancelled { .. }),
        "Job '{}' should have been cancelled, but is {:?}",
        key,
        state
    );
}

pub fn assert_job_skipped(run: &TestRun, key: &str) {
    let state = &run.job(key).state;
    assert!(
        matches!(state, JobState::Skipped { .. }),
        "Job '{}' should have been skipped, but is {:?}",
        key,
        state
    );
}

/// Assert the named step of an instance never ran
pub fn assert_step_skipped(run: &TestRun, key: &str, step_id: &str) {
    let step = run
        .job(key)
        .steps
        .iter()
        .find(|s| s.step_id == step_id)
        .unwrap_or_else(|| panic!("Step '{}' not in job '{}'", step_id, key));
    assert!(
        matches!(step.state, StepState::Skipped { .. }),
        "Step '{}' of '{}' should have been skipped, but is {:?}",
        step_id,
        key,
        step.state
    );
}

/// Assert exactly these steps ran, in this order
pub fn assert_executed_steps(run: &TestRun, key: &str, expected: &[&str]) {
    let executed: Vec<&str> = run
        .job(key)
        .executed_steps()
        .iter()
        .map(|s| s.step_id.as_str())
        .collect();
    assert_eq!(executed, expected, "Unexpected steps for job '{}'", key);
}
