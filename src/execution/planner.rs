//! Run planning - trigger evaluation and matrix expansion

use crate::core::{
    JobInstance, RepoEvent, RunState, TriggerDecision, Workflow,
};
use anyhow::{bail, Result};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

/// Job instances produced for one triggering event
#[derive(Debug, Clone)]
pub struct RunPlan {
    pub state: RunState,

    pub workflow_name: String,

    pub workflow_env: BTreeMap<String, String>,

    pub event: RepoEvent,

    pub decision: TriggerDecision,

    /// Every instance, grouped by job in execution order
    pub jobs: Vec<JobInstance>,

    job_order: Vec<String>,
}

impl RunPlan {
    pub fn run_id(&self) -> Uuid {
        self.state.run_id
    }

    pub fn is_skipped(&self) -> bool {
        !self.decision.should_run()
    }

    /// Job ids in `needs` order
    pub fn job_order(&self) -> &[String] {
        &self.job_order
    }

    /// Instances of one job (its matrix group)
    pub fn instances_of<'a>(&'a self, job_id: &'a str) -> impl Iterator<Item = &'a JobInstance> {
        self.jobs.iter().filter(move |j| j.job_id() == job_id)
    }

    pub fn instance(&self, key: &str) -> Option<&JobInstance> {
        self.jobs.iter().find(|j| j.key == key)
    }
}

/// Builds run plans from a workflow and an event
#[derive(Debug, Clone, Default)]
pub struct Planner {
    selection: Vec<String>,
}

impl Planner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict plans to these jobs plus whatever they need
    pub fn with_jobs(mut self, jobs: Vec<String>) -> Self {
        self.selection = jobs;
        self
    }

    /// Decide whether the event triggers the workflow and expand its jobs.
    ///
    /// A non-matching event yields a plan with a `Skip` decision and no jobs.
    pub fn plan(&self, workflow: &Workflow, event: &RepoEvent) -> Result<RunPlan> {
        for id in &self.selection {
            if workflow.job(id).is_none() {
                bail!("Job '{}' is not defined in workflow '{}'", id, workflow.name);
            }
        }

        let decision = workflow.triggers.evaluate(event);
        let mut plan = RunPlan {
            state: RunState::new(),
            workflow_name: workflow.name.clone(),
            workflow_env: workflow.env.clone(),
            event: event.clone(),
            decision: decision.clone(),
            jobs: Vec::new(),
            job_order: Vec::new(),
        };

        if let TriggerDecision::Skip { reason } = &decision {
            info!("Workflow '{}' not triggered: {}", workflow.name, reason);
            return Ok(plan);
        }

        let selected = (!self.selection.is_empty()).then(|| workflow.with_needs(&self.selection));

        for job_id in workflow.execution_order() {
            if selected.as_ref().is_some_and(|s| !s.contains(job_id)) {
                continue;
            }
            let Some(definition) = workflow.job(job_id) else {
                continue;
            };

            let cells = definition.strategy.matrix.expand();
            let indexed = !definition.strategy.matrix.is_empty();
            debug!("Job '{}' expands to {} instance(s)", job_id, cells.len());

            for (index, cell) in cells.into_iter().enumerate() {
                plan.jobs.push(JobInstance::new(
                    Arc::clone(definition),
                    cell,
                    indexed.then_some(index),
                ));
            }
            plan.job_order.push(job_id.clone());
        }

        info!(
            "Planned {} job instance(s) for workflow '{}' on {} to '{}'",
            plan.jobs.len(),
            workflow.name,
            event.event_type,
            event.branch
        );
        Ok(plan)
    }
}
