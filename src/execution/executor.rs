//! Job executor - runs the steps of one job instance in order

use crate::{
    core::{
        env_key, ExecutionContext, JobInstance, JobState, Step, StepKind, StepState,
    },
    execution::{
        cancel::CancelSignal,
        engine::{EventBus, ExecutionEvent},
    },
    runner::{
        ActionHandler, ActionRegistry, CommandRunner, CommandSpec, OutputSink, OutputStream,
        RunnerConfig, RunnerError, ShellTemplate,
    },
};
use chrono::Utc;
use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Lines of output kept per step
pub const OUTPUT_TAIL_LINES: usize = 20;

/// Result of executing a step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    Succeeded,
    Failed {
        /// None when the command never produced an exit status
        exit_code: Option<i32>,
        error: String,
    },
    Cancelled,
}

/// Forwards output lines to the event bus and keeps a masked tail
struct StepSink<'a> {
    events: &'a EventBus,
    context: &'a ExecutionContext,
    job_key: &'a str,
    step_id: &'a str,
    tail: Mutex<VecDeque<String>>,
}

impl<'a> StepSink<'a> {
    fn new(
        events: &'a EventBus,
        context: &'a ExecutionContext,
        job_key: &'a str,
        step_id: &'a str,
    ) -> Self {
        Self {
            events,
            context,
            job_key,
            step_id,
            tail: Mutex::new(VecDeque::with_capacity(OUTPUT_TAIL_LINES)),
        }
    }

    fn into_tail(self) -> Vec<String> {
        match self.tail.into_inner() {
            Ok(tail) => tail.into(),
            Err(poisoned) => poisoned.into_inner().into(),
        }
    }
}

impl OutputSink for StepSink<'_> {
    fn on_line(&self, stream: OutputStream, line: &str) {
        let masked = self.context.mask(line);

        if let Ok(mut tail) = self.tail.lock() {
            if tail.len() == OUTPUT_TAIL_LINES {
                tail.pop_front();
            }
            tail.push_back(masked.clone());
        }

        self.events.emit(ExecutionEvent::StepOutput {
            job_key: self.job_key.to_string(),
            step_id: self.step_id.to_string(),
            stream,
            line: masked,
        });
    }
}

/// Executes the steps of a job instance
pub struct JobExecutor<R> {
    runner: Arc<R>,
    actions: ActionRegistry,
    default_shell: String,
    default_job_timeout: Duration,
}

impl<R> Clone for JobExecutor<R> {
    fn clone(&self) -> Self {
        Self {
            runner: Arc::clone(&self.runner),
            actions: self.actions.clone(),
            default_shell: self.default_shell.clone(),
            default_job_timeout: self.default_job_timeout,
        }
    }
}

impl<R: CommandRunner> JobExecutor<R> {
    pub fn new(runner: R) -> Self {
        Self::with_config(runner, &RunnerConfig::default())
    }

    pub fn with_config(runner: R, config: &RunnerConfig) -> Self {
        Self {
            runner: Arc::new(runner),
            actions: ActionRegistry::with_aliases(config.actions.clone()),
            default_shell: config.default_shell.clone(),
            default_job_timeout: config.default_job_timeout(),
        }
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    /// Run every step of `job` in order and return its final state.
    ///
    /// A failing step halts the job and later steps are recorded as skipped,
    /// unless the step is `continue-on-error`.
    pub async fn run(
        &self,
        job: &mut JobInstance,
        context: &ExecutionContext,
        cancel: &CancelSignal,
        events: &EventBus,
    ) -> JobState {
        let definition = Arc::clone(&job.definition);
        let started_at = Utc::now();
        let job_timeout = definition.timeout.unwrap_or(self.default_job_timeout);
        let deadline = Instant::now() + job_timeout;

        info!("Starting job: {}", job.name);

        let mut failure: Option<(String, i32, String)> = None;
        let mut cancelled = false;
        let mut halted: Option<String> = None;

        for (index, step) in definition.steps.iter().enumerate() {
            if let Some(reason) = &halted {
                job.steps[index].state = StepState::Skipped {
                    reason: reason.clone(),
                };
                events.emit(ExecutionEvent::StepFinished {
                    job_key: job.key.clone(),
                    step_id: step.id.clone(),
                    state: job.steps[index].state.clone(),
                });
                continue;
            }

            job.state = JobState::Running {
                step_index: index,
                started_at,
            };
            let step_started = Utc::now();
            let name = context.render(&job.steps[index].name);
            job.steps[index].state = StepState::Running {
                started_at: step_started,
            };
            events.emit(ExecutionEvent::StepStarted {
                job_key: job.key.clone(),
                step_id: step.id.clone(),
                name,
            });

            let remaining = deadline.saturating_duration_since(Instant::now());
            let (outcome, tail) = self
                .execute_step(&job.key, step, context, remaining, cancel, events)
                .await;
            job.steps[index].output_tail = tail;

            job.steps[index].state = match &outcome {
                StepOutcome::Succeeded => StepState::Succeeded {
                    started_at: step_started,
                    completed_at: Utc::now(),
                },
                StepOutcome::Failed { exit_code, error } => {
                    if step.continue_on_error {
                        warn!(
                            "Step {} in job {} failed, continuing: {}",
                            step.id, job.key, error
                        );
                    } else {
                        error!("Step {} in job {} failed: {}", step.id, job.key, error);
                        failure = Some((step.id.clone(), exit_code.unwrap_or(1), error.clone()));
                        halted = Some(format!("step '{}' failed", step.id));
                    }
                    StepState::Failed {
                        exit_code: *exit_code,
                        error: error.clone(),
                        started_at: step_started,
                        failed_at: Utc::now(),
                        continued: step.continue_on_error,
                    }
                }
                StepOutcome::Cancelled => {
                    cancelled = true;
                    halted = Some("job was cancelled".to_string());
                    StepState::Failed {
                        exit_code: None,
                        error: RunnerError::Cancelled.to_string(),
                        started_at: step_started,
                        failed_at: Utc::now(),
                        continued: false,
                    }
                }
            };

            events.emit(ExecutionEvent::StepFinished {
                job_key: job.key.clone(),
                step_id: step.id.clone(),
                state: job.steps[index].state.clone(),
            });
        }

        let state = if cancelled {
            JobState::Cancelled {
                reason: "cancelled after a sibling job failed".to_string(),
            }
        } else if let Some((failed_step, exit_code, error)) = failure {
            JobState::Failed {
                failed_step,
                exit_code,
                error,
                started_at,
                failed_at: Utc::now(),
            }
        } else {
            JobState::Succeeded {
                started_at,
                completed_at: Utc::now(),
            }
        };

        job.state = state.clone();
        state
    }

    /// Execute one step; returns its outcome and the masked tail of its output
    pub async fn execute_step(
        &self,
        job_key: &str,
        step: &Step,
        context: &ExecutionContext,
        time_left: Duration,
        cancel: &CancelSignal,
        events: &EventBus,
    ) -> (StepOutcome, Vec<String>) {
        if cancel.is_cancelled() {
            return (StepOutcome::Cancelled, Vec::new());
        }

        if time_left.is_zero() {
            return (
                StepOutcome::Failed {
                    exit_code: None,
                    error: "job timeout exceeded".to_string(),
                },
                Vec::new(),
            );
        }

        let limit = step.timeout.map_or(time_left, |t| t.min(time_left));

        let command = match self.prepare(step, context, limit).await {
            Ok(Some(command)) => command,
            Ok(None) => return (StepOutcome::Succeeded, Vec::new()),
            Err(e) => {
                error!("Could not prepare step {}: {}", step.id, e);
                return (
                    StepOutcome::Failed {
                        exit_code: None,
                        error: context.mask(&e.to_string()),
                    },
                    Vec::new(),
                );
            }
        };

        debug!("Step {} runs: {}", step.id, command.display());
        let sink = StepSink::new(events, context, job_key, &step.id);

        let result = tokio::select! {
            result = self.runner.run(&command, Some(&sink)) => result,
            _ = cancel.cancelled() => Err(RunnerError::Cancelled),
        };

        let outcome = match result {
            Ok(output) if output.success() => StepOutcome::Succeeded,
            Ok(output) => StepOutcome::Failed {
                exit_code: Some(output.exit_code),
                error: format!("Process completed with exit code {}", output.exit_code),
            },
            Err(RunnerError::Cancelled) => {
                info!("Step {} in job {} cancelled", step.id, job_key);
                StepOutcome::Cancelled
            }
            Err(e) => StepOutcome::Failed {
                exit_code: None,
                error: context.mask(&e.to_string()),
            },
        };

        (outcome, sink.into_tail())
    }

    /// Build the command for a step; `None` means there is nothing to run
    async fn prepare(
        &self,
        step: &Step,
        context: &ExecutionContext,
        limit: Duration,
    ) -> Result<Option<CommandSpec>, RunnerError> {
        let mut env = context.step_env(step);

        let (script, shell) = match &step.kind {
            StepKind::Run { script, shell } => (script.clone(), shell.clone()),
            StepKind::Action { action, inputs } => match self.actions.resolve(action)? {
                ActionHandler::Builtin(builtin) => {
                    info!("Step {} uses builtin {:?}, nothing to run", step.id, builtin);
                    return Ok(None);
                }
                ActionHandler::Script { run, shell } => {
                    let rendered: BTreeMap<String, String> = inputs
                        .iter()
                        .map(|(name, value)| {
                            (
                                format!("INPUT_{}", env_key(name)),
                                context.render_with_env(value, &env),
                            )
                        })
                        .collect();
                    env.extend(rendered);
                    (run, shell)
                }
            },
        };

        let template = shell.as_deref().unwrap_or(&self.default_shell);
        let shell = ShellTemplate::parse(template)?;
        let body = context.render_with_env(&script, &env);

        create_private_dir(&context.temp_dir).await?;
        let path = context
            .temp_dir
            .join(format!("{}.{}", file_safe(&step.id), shell.script_extension()));
        tokio::fs::write(&path, body).await?;

        Ok(Some(
            CommandSpec::new(shell.program(), context.workspace.clone())
                .with_args(shell.args_for(&path))
                .with_env(env)
                .with_timeout(Some(limit)),
        ))
    }
}

/// Create `dir` and its parents, readable only by the current user on unix
async fn create_private_dir(dir: &std::path::Path) -> std::io::Result<()> {
    let mut builder = tokio::fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    builder.mode(0o700);
    builder.create(dir).await
}

/// Make a name safe to use as a file or directory name
pub fn file_safe(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect()
}
