//! Persistence layer for workflow run history

#[cfg(feature = "sqlite")]
pub mod store;

#[cfg(feature = "sqlite")]
pub use store::SqliteRunStore;

pub use crate::core::ExecutionStatus;
use crate::core::{JobStatus, StepState};
use crate::execution::RunPlan;
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Outcome of one job instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSummary {
    pub key: String,

    pub name: String,

    pub status: JobStatus,

    pub exit_code: Option<i32>,

    /// Step that failed the job, if any
    pub failed_step: Option<String>,

    /// Reason for a skip, cancellation or failure
    pub detail: Option<String>,

    /// Matrix label, e.g. `3.8, ubuntu-latest`
    pub matrix: Option<String>,

    /// Step ids in the order they ran
    pub executed_steps: Vec<String>,
}

/// Summary of a workflow run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    /// Unique run ID
    pub run_id: Uuid,

    pub workflow_name: String,

    /// Event name, e.g. `push`
    pub event: String,

    pub branch: String,

    pub status: ExecutionStatus,

    pub started_at: DateTime<Utc>,

    pub completed_at: Option<DateTime<Utc>>,

    /// Progress (0.0 to 1.0)
    pub progress: f64,

    pub jobs: Vec<JobSummary>,
}

impl RunSummary {
    pub fn count(&self, status: JobStatus) -> usize {
        self.jobs.iter().filter(|j| j.status == status).count()
    }
}

/// Trait for persistence backends
#[async_trait::async_trait]
pub trait PersistenceBackend: Send + Sync {
    /// Save a run
    async fn save_run(&self, run: &RunSummary) -> Result<()>;

    /// Load a run by ID
    async fn load_run(&self, run_id: Uuid) -> Result<Option<RunSummary>>;

    /// List all runs of a workflow, newest first
    async fn list_runs(&self, workflow_name: &str) -> Result<Vec<RunSummary>>;

    /// Most recent runs across all workflows
    async fn list_recent(&self, limit: usize) -> Result<Vec<RunSummary>>;

    /// List all workflow names
    async fn list_workflows(&self) -> Result<Vec<String>>;
}

/// In-memory persistence (for testing or ephemeral use)
#[derive(Default)]
pub struct InMemoryPersistence {
    runs: RwLock<HashMap<Uuid, RunSummary>>,
}

impl InMemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }
}

fn newest_first(mut runs: Vec<RunSummary>) -> Vec<RunSummary> {
    runs.sort_by(|a, b| b.started_at.cmp(&a.started_at));
    runs
}

#[async_trait::async_trait]
impl PersistenceBackend for InMemoryPersistence {
    async fn save_run(&self, run: &RunSummary) -> Result<()> {
        self.runs.write().await.insert(run.run_id, run.clone());
        Ok(())
    }

    async fn load_run(&self, run_id: Uuid) -> Result<Option<RunSummary>> {
        Ok(self.runs.read().await.get(&run_id).cloned())
    }

    async fn list_runs(&self, workflow_name: &str) -> Result<Vec<RunSummary>> {
        let runs = self.runs.read().await;
        Ok(newest_first(
            runs.values()
                .filter(|r| r.workflow_name == workflow_name)
                .cloned()
                .collect(),
        ))
    }

    async fn list_recent(&self, limit: usize) -> Result<Vec<RunSummary>> {
        let runs = self.runs.read().await;
        let mut recent = newest_first(runs.values().cloned().collect());
        recent.truncate(limit);
        Ok(recent)
    }

    async fn list_workflows(&self) -> Result<Vec<String>> {
        let runs = self.runs.read().await;
        let mut names: Vec<String> = runs.values().map(|r| r.workflow_name.clone()).collect();
        names.sort();
        names.dedup();
        Ok(names)
    }
}

/// Create a summary from a run plan
pub fn create_summary(plan: &RunPlan) -> RunSummary {
    let jobs = plan
        .jobs
        .iter()
        .map(|job| {
            let (failed_step, detail) = match &job.state {
                crate::core::JobState::Failed {
                    failed_step, error, ..
                } => (Some(failed_step.clone()), Some(error.clone())),
                crate::core::JobState::Cancelled { reason }
                | crate::core::JobState::Skipped { reason } => (None, Some(reason.clone())),
                _ => (None, None),
            };

            JobSummary {
                key: job.key.clone(),
                name: job.name.clone(),
                status: job.state.status(),
                exit_code: job.state.exit_code(),
                failed_step,
                detail,
                matrix: (!job.matrix.is_empty()).then(|| job.matrix.label()),
                executed_steps: job
                    .steps
                    .iter()
                    .filter(|s| !matches!(s.state, StepState::Pending | StepState::Skipped { .. }))
                    .map(|s| s.step_id.clone())
                    .collect(),
            }
        })
        .collect();

    RunSummary {
        run_id: plan.run_id(),
        workflow_name: plan.workflow_name.clone(),
        event: plan.event.event_type.to_string(),
        branch: plan.event.branch.clone(),
        status: plan.state.status,
        started_at: plan.state.started_at.unwrap_or_else(Utc::now),
        completed_at: plan.state.completed_at,
        progress: plan.state.progress(),
        jobs,
    }
}
