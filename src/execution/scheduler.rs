//! Execution scheduler - determines which jobs to run next

use crate::core::JobState;
use crate::execution::planner::RunPlan;

/// Strategy for scheduling job execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SchedulingStrategy {
    /// Execute job instances one at a time, in plan order
    #[default]
    Sequential,

    /// Execute all ready job instances in parallel
    Parallel,

    /// Limited parallelism (max N concurrent job instances)
    LimitedParallel(usize),
}

impl SchedulingStrategy {
    /// Run-wide bound on concurrently running job instances
    pub fn concurrency_limit(&self) -> Option<usize> {
        match self {
            SchedulingStrategy::Sequential => Some(1),
            SchedulingStrategy::Parallel => None,
            SchedulingStrategy::LimitedParallel(max) => Some((*max).max(1)),
        }
    }
}

/// Scheduler for determining which jobs can run
#[derive(Debug, Clone)]
pub struct ExecutionScheduler {
    strategy: SchedulingStrategy,
}

impl ExecutionScheduler {
    pub fn new(strategy: SchedulingStrategy) -> Self {
        Self { strategy }
    }

    pub fn strategy(&self) -> SchedulingStrategy {
        self.strategy
    }

    /// Effective run-wide limit given an optional runner-wide cap
    pub fn concurrency_limit(&self, runner_cap: Option<usize>) -> Option<usize> {
        match (self.strategy.concurrency_limit(), runner_cap.map(|c| c.max(1))) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (limit, None) | (None, limit) => limit,
        }
    }

    /// Jobs whose instances are all pending and whose needs all succeeded
    pub fn next_jobs(&self, plan: &RunPlan) -> Vec<String> {
        plan.job_order()
            .iter()
            .filter(|job_id| all_pending(plan, job_id))
            .filter(|job_id| {
                needs_of(plan, job_id)
                    .iter()
                    .all(|need| group_succeeded(plan, need))
            })
            .cloned()
            .collect()
    }

    /// Pending jobs that can never run, with the reason
    pub fn blocked_jobs(&self, plan: &RunPlan) -> Vec<(String, String)> {
        plan.job_order()
            .iter()
            .filter(|job_id| all_pending(plan, job_id))
            .filter_map(|job_id| {
                needs_of(plan, job_id)
                    .iter()
                    .find(|need| group_finished(plan, need) && !group_succeeded(plan, need))
                    .map(|need| {
                        (
                            job_id.clone(),
                            format!("needed job '{}' did not succeed", need),
                        )
                    })
            })
            .collect()
    }
}

fn needs_of(plan: &RunPlan, job_id: &str) -> Vec<String> {
    plan.instances_of(job_id)
        .next()
        .map(|j| j.definition.needs.clone())
        .unwrap_or_default()
}

fn all_pending(plan: &RunPlan, job_id: &str) -> bool {
    let mut instances = plan.instances_of(job_id).peekable();
    instances.peek().is_some() && instances.all(|j| matches!(j.state, JobState::Pending))
}

fn group_finished(plan: &RunPlan, job_id: &str) -> bool {
    plan.instances_of(job_id).all(|j| j.state.is_terminal())
}

/// A job with no instances (fully excluded matrix) counts as succeeded
fn group_succeeded(plan: &RunPlan, job_id: &str) -> bool {
    plan.instances_of(job_id).all(|j| j.state.is_success())
}
