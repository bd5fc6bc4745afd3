//! Execution state models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Overall run status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionStatus {
    /// Run has not started
    Pending,
    /// Run is currently executing jobs
    Running,
    /// Every job succeeded
    Completed,
    /// At least one job failed
    Failed,
    /// Jobs were cancelled before finishing
    Cancelled,
    /// The trigger did not match; nothing ran
    Skipped,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::Pending => "Pending",
            ExecutionStatus::Running => "Running",
            ExecutionStatus::Completed => "Completed",
            ExecutionStatus::Failed => "Failed",
            ExecutionStatus::Cancelled => "Cancelled",
            ExecutionStatus::Skipped => "Skipped",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "Running" => ExecutionStatus::Running,
            "Completed" => ExecutionStatus::Completed,
            "Failed" => ExecutionStatus::Failed,
            "Cancelled" => ExecutionStatus::Cancelled,
            "Skipped" => ExecutionStatus::Skipped,
            _ => ExecutionStatus::Pending,
        }
    }
}

/// Flattened job status for summaries and history
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    Cancelled,
    Skipped,
}

/// State of a job instance.
///
/// `Pending → Running { step_index } → … → Succeeded | Failed`, plus
/// `Cancelled` (fail-fast) and `Skipped` (a needed job did not succeed).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum JobState {
    Pending,
    Running {
        step_index: usize,
        started_at: DateTime<Utc>,
    },
    Succeeded {
        started_at: DateTime<Utc>,
        completed_at: DateTime<Utc>,
    },
    Failed {
        failed_step: String,
        exit_code: i32,
        error: String,
        started_at: DateTime<Utc>,
        failed_at: DateTime<Utc>,
    },
    Cancelled {
        reason: String,
    },
    Skipped {
        reason: String,
    },
}

impl JobState {
    /// Check if job is in a terminal state
    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobState::Pending | JobState::Running { .. })
    }

    pub fn is_success(&self) -> bool {
        matches!(self, JobState::Succeeded { .. })
    }

    pub fn status(&self) -> JobStatus {
        match self {
            JobState::Pending => JobStatus::Pending,
            JobState::Running { .. } => JobStatus::Running,
            JobState::Succeeded { .. } => JobStatus::Succeeded,
            JobState::Failed { .. } => JobStatus::Failed,
            JobState::Cancelled { .. } => JobStatus::Cancelled,
            JobState::Skipped { .. } => JobStatus::Skipped,
        }
    }

    /// Job exit code: the first non-zero step exit code, 0 on success
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            JobState::Succeeded { .. } => Some(0),
            JobState::Failed { exit_code, .. } => Some(*exit_code),
            _ => None,
        }
    }
}

/// State of a single step within a job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StepState {
    Pending,
    Running {
        started_at: DateTime<Utc>,
    },
    Succeeded {
        started_at: DateTime<Utc>,
        completed_at: DateTime<Utc>,
    },
    Failed {
        /// None when the process never produced an exit status
        exit_code: Option<i32>,
        error: String,
        started_at: DateTime<Utc>,
        failed_at: DateTime<Utc>,
        /// The failure was tolerated via `continue-on-error`
        continued: bool,
    },
    Skipped {
        reason: String,
    },
}

impl StepState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, StepState::Pending | StepState::Running { .. })
    }

    pub fn has_run(&self) -> bool {
        matches!(
            self,
            StepState::Running { .. } | StepState::Succeeded { .. } | StepState::Failed { .. }
        )
    }
}

/// Overall run state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunState {
    /// Unique run ID
    pub run_id: Uuid,

    pub status: ExecutionStatus,

    pub started_at: Option<DateTime<Utc>>,

    pub completed_at: Option<DateTime<Utc>>,

    pub total_jobs: usize,

    pub succeeded_jobs: usize,

    pub failed_jobs: usize,

    pub cancelled_jobs: usize,

    pub skipped_jobs: usize,
}

impl RunState {
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            status: ExecutionStatus::Pending,
            started_at: None,
            completed_at: None,
            total_jobs: 0,
            succeeded_jobs: 0,
            failed_jobs: 0,
            cancelled_jobs: 0,
            skipped_jobs: 0,
        }
    }

    /// Mark run as started
    pub fn start(&mut self, total_jobs: usize) {
        self.status = ExecutionStatus::Running;
        self.started_at = Some(Utc::now());
        self.total_jobs = total_jobs;
    }

    /// Mark run as finished with the given status
    pub fn finish(&mut self, status: ExecutionStatus) {
        self.status = status;
        self.completed_at = Some(Utc::now());
    }

    /// Recount jobs from their current states
    pub fn update_counts<'a>(&mut self, states: impl Iterator<Item = &'a JobState>) {
        self.succeeded_jobs = 0;
        self.failed_jobs = 0;
        self.cancelled_jobs = 0;
        self.skipped_jobs = 0;

        for state in states {
            match state.status() {
                JobStatus::Succeeded => self.succeeded_jobs += 1,
                JobStatus::Failed => self.failed_jobs += 1,
                JobStatus::Cancelled => self.cancelled_jobs += 1,
                JobStatus::Skipped => self.skipped_jobs += 1,
                JobStatus::Pending | JobStatus::Running => {}
            }
        }
    }

    pub fn finished_jobs(&self) -> usize {
        self.succeeded_jobs + self.failed_jobs + self.cancelled_jobs + self.skipped_jobs
    }

    /// Calculate progress (0.0 to 1.0)
    pub fn progress(&self) -> f64 {
        if self.total_jobs == 0 {
            return 0.0;
        }
        self.finished_jobs() as f64 / self.total_jobs as f64
    }

    /// Final status derived from job counts
    pub fn derive_status(&self) -> ExecutionStatus {
        if self.failed_jobs > 0 {
            ExecutionStatus::Failed
        } else if self.cancelled_jobs > 0 {
            ExecutionStatus::Cancelled
        } else if self.succeeded_jobs == 0 && self.skipped_jobs > 0 {
            ExecutionStatus::Skipped
        } else {
            ExecutionStatus::Completed
        }
    }
}

impl Default for RunState {
    fn default() -> Self {
        Self::new()
    }
}
