//! Main execution engine - orchestrates the entire workflow run

use crate::{
    core::{ExecutionContext, ExecutionStatus, JobState, RepoEvent, Secrets, StepState},
    execution::{
        cancel::CancelHandle,
        executor::{file_safe, JobExecutor},
        planner::RunPlan,
        scheduler::{ExecutionScheduler, SchedulingStrategy},
    },
    runner::{CommandRunner, OutputStream, RunnerConfig},
};
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Events that can occur during a workflow run
#[derive(Debug, Clone)]
pub enum ExecutionEvent {
    RunStarted {
        run_id: Uuid,
        workflow_name: String,
        event: RepoEvent,
        total_jobs: usize,
    },
    RunSkipped {
        run_id: Uuid,
        workflow_name: String,
        reason: String,
    },
    JobStarted {
        key: String,
        name: String,
    },
    JobSkipped {
        key: String,
        name: String,
        reason: String,
    },
    StepStarted {
        job_key: String,
        step_id: String,
        name: String,
    },
    StepOutput {
        job_key: String,
        step_id: String,
        stream: OutputStream,
        line: String,
    },
    StepFinished {
        job_key: String,
        step_id: String,
        state: StepState,
    },
    JobFinished {
        key: String,
        name: String,
        state: JobState,
    },
    RunFinished {
        run_id: Uuid,
        status: ExecutionStatus,
    },
}

/// Type for event handlers
pub type EventHandler = Arc<dyn Fn(ExecutionEvent) + Send + Sync>;

/// Fan-out of execution events to registered handlers
#[derive(Clone, Default)]
pub struct EventBus {
    handlers: Arc<RwLock<Vec<EventHandler>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&self, handler: F)
    where
        F: Fn(ExecutionEvent) + Send + Sync + 'static,
    {
        let mut handlers = match self.handlers.write() {
            Ok(handlers) => handlers,
            Err(poisoned) => poisoned.into_inner(),
        };
        handlers.push(Arc::new(handler));
    }

    pub fn emit(&self, event: ExecutionEvent) {
        let handlers = match self.handlers.read() {
            Ok(handlers) => handlers,
            Err(poisoned) => poisoned.into_inner(),
        };
        for handler in handlers.iter() {
            handler(event.clone());
        }
    }
}

/// Errors that abort a run as a whole
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("Job '{job}' needs '{need}', which is not part of this run")]
    UnknownNeed { job: String, need: String },

    #[error("{0} job(s) can never start")]
    Stuck(usize),

    #[error("Job task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("Scheduling error: {0}")]
    Internal(String),
}

type Permits = (Option<OwnedSemaphorePermit>, Option<OwnedSemaphorePermit>);

async fn acquire(
    group: Option<Arc<Semaphore>>,
    global: Option<Arc<Semaphore>>,
) -> Result<Permits, ExecutionError> {
    let group = match group {
        Some(semaphore) => Some(
            semaphore
                .acquire_owned()
                .await
                .map_err(|e| ExecutionError::Internal(e.to_string()))?,
        ),
        None => None,
    };
    let global = match global {
        Some(semaphore) => Some(
            semaphore
                .acquire_owned()
                .await
                .map_err(|e| ExecutionError::Internal(e.to_string()))?,
        ),
        None => None,
    };
    Ok((group, global))
}

const FAIL_FAST_REASON: &str = "cancelled after a sibling job failed";

/// Main workflow execution engine
pub struct WorkflowEngine<R> {
    executor: JobExecutor<R>,
    scheduler: ExecutionScheduler,
    events: EventBus,
    secrets: Arc<Secrets>,
    workspace: PathBuf,
    temp_root: PathBuf,
    max_concurrent_jobs: Option<usize>,
}

impl<R: CommandRunner + 'static> WorkflowEngine<R> {
    pub fn new(runner: R, strategy: SchedulingStrategy) -> Self {
        Self::with_config(runner, strategy, &RunnerConfig::default())
    }

    pub fn with_config(runner: R, strategy: SchedulingStrategy, config: &RunnerConfig) -> Self {
        Self {
            executor: JobExecutor::with_config(runner, config),
            scheduler: ExecutionScheduler::new(strategy),
            events: EventBus::new(),
            secrets: Arc::new(Secrets::new()),
            workspace: config
                .workspace
                .clone()
                .unwrap_or_else(|| PathBuf::from(".")),
            temp_root: std::env::temp_dir().join("cirun"),
            max_concurrent_jobs: config.max_concurrent_jobs,
        }
    }

    pub fn with_secrets(mut self, secrets: Secrets) -> Self {
        self.secrets = Arc::new(secrets);
        self
    }

    pub fn with_workspace(mut self, workspace: PathBuf) -> Self {
        self.workspace = workspace;
        self
    }

    /// Directory under which per-job temp directories are created
    pub fn with_temp_root(mut self, temp_root: PathBuf) -> Self {
        self.temp_root = temp_root;
        self
    }

    pub fn runner(&self) -> &R {
        self.executor.runner()
    }

    /// Add an event handler
    pub fn add_event_handler<F>(&self, handler: F)
    where
        F: Fn(ExecutionEvent) + Send + Sync + 'static,
    {
        self.events.subscribe(handler);
    }

    /// Execute every job instance of the plan
    pub async fn execute(&self, plan: &mut RunPlan) -> Result<ExecutionStatus, ExecutionError> {
        let run_id = plan.run_id();

        if let crate::core::TriggerDecision::Skip { reason } = &plan.decision {
            info!("Run {} skipped: {}", run_id, reason);
            plan.state.finish(ExecutionStatus::Skipped);
            self.events.emit(ExecutionEvent::RunSkipped {
                run_id,
                workflow_name: plan.workflow_name.clone(),
                reason: reason.clone(),
            });
            self.events.emit(ExecutionEvent::RunFinished {
                run_id,
                status: ExecutionStatus::Skipped,
            });
            return Ok(ExecutionStatus::Skipped);
        }

        self.check_needs(plan)?;

        info!("Starting workflow run: {} ({})", plan.workflow_name, run_id);
        plan.state.start(plan.jobs.len());
        self.events.emit(ExecutionEvent::RunStarted {
            run_id,
            workflow_name: plan.workflow_name.clone(),
            event: plan.event.clone(),
            total_jobs: plan.jobs.len(),
        });

        let run_temp = self.temp_root.join(run_id.to_string());
        let result = self.run_jobs(plan, &run_temp).await;

        // Scripts may hold rendered secrets, remove them whatever happened
        if let Err(e) = tokio::fs::remove_dir_all(&run_temp).await {
            debug!("Could not remove {}: {}", run_temp.display(), e);
        }
        result?;

        plan.state.update_counts(plan.jobs.iter().map(|j| &j.state));
        let status = plan.state.derive_status();
        plan.state.finish(status);

        info!("Workflow run finished: {} - {:?}", plan.workflow_name, status);
        self.events.emit(ExecutionEvent::RunFinished { run_id, status });

        Ok(status)
    }

    /// Dispatch waves of ready jobs until none are pending
    async fn run_jobs(&self, plan: &mut RunPlan, run_temp: &std::path::Path) -> Result<(), ExecutionError> {
        let global = self
            .scheduler
            .concurrency_limit(self.max_concurrent_jobs)
            .map(|n| Arc::new(Semaphore::new(n)));

        loop {
            self.skip_blocked(plan);

            let ready = self.scheduler.next_jobs(plan);
            if ready.is_empty() {
                let pending = plan
                    .jobs
                    .iter()
                    .filter(|j| matches!(j.state, JobState::Pending))
                    .count();
                if pending == 0 {
                    return Ok(());
                }
                return Err(ExecutionError::Stuck(pending));
            }

            self.run_wave(plan, &ready, run_temp, global.clone()).await?;
            plan.state.update_counts(plan.jobs.iter().map(|j| &j.state));
        }
    }

    fn check_needs(&self, plan: &RunPlan) -> Result<(), ExecutionError> {
        for job in &plan.jobs {
            for need in &job.definition.needs {
                if !plan.job_order().contains(need) {
                    return Err(ExecutionError::UnknownNeed {
                        job: job.job_id().to_string(),
                        need: need.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Mark jobs whose needs did not succeed as skipped, transitively
    fn skip_blocked(&self, plan: &mut RunPlan) {
        loop {
            let blocked = self.scheduler.blocked_jobs(plan);
            if blocked.is_empty() {
                return;
            }

            for (job_id, reason) in blocked {
                for job in plan.jobs.iter_mut().filter(|j| j.job_id() == job_id) {
                    warn!("Skipping job {}: {}", job.key, reason);
                    job.settle(
                        JobState::Skipped {
                            reason: reason.clone(),
                        },
                        &reason,
                    );
                    self.events.emit(ExecutionEvent::JobSkipped {
                        key: job.key.clone(),
                        name: job.name.clone(),
                        reason: reason.clone(),
                    });
                }
            }
        }
    }

    fn context_for(&self, plan: &RunPlan, index: usize, run_temp: &std::path::Path) -> ExecutionContext {
        let job = &plan.jobs[index];
        ExecutionContext {
            workflow_name: plan.workflow_name.clone(),
            job_id: job.job_id().to_string(),
            event: plan.event.clone(),
            matrix: job.matrix.clone(),
            secrets: Arc::clone(&self.secrets),
            workflow_env: plan.workflow_env.clone(),
            job_env: job.definition.env.clone(),
            workspace: self.workspace.clone(),
            temp_dir: run_temp.join(file_safe(&job.key)),
        }
    }

    /// Run the matrix groups of the ready jobs and wait for all of them
    async fn run_wave(
        &self,
        plan: &mut RunPlan,
        ready: &[String],
        run_temp: &std::path::Path,
        global: Option<Arc<Semaphore>>,
    ) -> Result<(), ExecutionError> {
        let executor = Arc::new(self.executor.clone());
        let mut tasks = JoinSet::new();

        for job_id in ready {
            let indices: Vec<usize> = plan
                .jobs
                .iter()
                .enumerate()
                .filter(|(_, j)| j.job_id() == job_id)
                .map(|(i, _)| i)
                .collect();
            let Some(&first) = indices.first() else {
                continue;
            };

            let strategy = plan.jobs[first].definition.strategy.clone();
            let group_limit = strategy
                .max_parallel
                .map(|n| Arc::new(Semaphore::new(n.max(1))));
            let cancel = CancelHandle::new();
            debug!(
                "Dispatching {} instance(s) of {} (max-parallel {:?}, fail-fast {})",
                indices.len(),
                job_id,
                strategy.max_parallel,
                strategy.fail_fast
            );

            for index in indices {
                let signal = cancel.signal();
                let acquired = tokio::select! {
                    biased;
                    _ = signal.cancelled() => None,
                    permits = acquire(group_limit.clone(), global.clone()) => Some(permits?),
                };

                let permits = match acquired {
                    Some(permits) if !cancel.is_cancelled() => permits,
                    _ => {
                        self.cancel_unstarted(plan, index);
                        continue;
                    }
                };

                let context = self.context_for(plan, index, run_temp);
                let mut instance = plan.jobs[index].clone();
                let executor = Arc::clone(&executor);
                let events = self.events.clone();
                let cancel = cancel.clone();
                let fail_fast = strategy.fail_fast;

                tasks.spawn(async move {
                    let _permits = permits;
                    events.emit(ExecutionEvent::JobStarted {
                        key: instance.key.clone(),
                        name: instance.name.clone(),
                    });

                    let state = executor.run(&mut instance, &context, &signal, &events).await;

                    if fail_fast && matches!(state, JobState::Failed { .. }) {
                        info!("Job {} failed, cancelling its matrix siblings", instance.key);
                        cancel.cancel();
                    }

                    events.emit(ExecutionEvent::JobFinished {
                        key: instance.key.clone(),
                        name: instance.name.clone(),
                        state,
                    });
                    (index, instance)
                });
            }
        }

        while let Some(joined) = tasks.join_next().await {
            let (index, instance) = joined?;
            plan.jobs[index] = instance;
        }

        Ok(())
    }

    fn cancel_unstarted(&self, plan: &mut RunPlan, index: usize) {
        let job = &mut plan.jobs[index];
        info!("Job {} cancelled before it started", job.key);
        job.settle(
            JobState::Cancelled {
                reason: FAIL_FAST_REASON.to_string(),
            },
            FAIL_FAST_REASON,
        );
        self.events.emit(ExecutionEvent::JobFinished {
            key: job.key.clone(),
            name: job.name.clone(),
            state: job.state.clone(),
        });
    }
}
