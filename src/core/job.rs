//! Job definitions and their matrix instances

use crate::core::{
    config::{build_strategy, JobConfig},
    matrix::{render_value, MatrixCell, Strategy},
    state::{JobState, StepState},
    step::{timeout_from_minutes, Step},
};
use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

/// A job as declared in the workflow (before matrix expansion)
#[derive(Debug, Clone)]
pub struct JobDefinition {
    pub id: String,

    /// Display name template
    pub name: Option<String>,

    /// Requested runner label, informational only
    pub runs_on: Option<String>,

    /// Jobs that must succeed before this one starts
    pub needs: Vec<String>,

    /// Environment bindings scoped to this job
    pub env: BTreeMap<String, String>,

    pub strategy: Strategy,

    pub steps: Vec<Step>,

    pub timeout: Option<Duration>,
}

impl JobDefinition {
    pub fn from_config(id: &str, config: &JobConfig) -> Result<Self> {
        let steps = config
            .steps
            .iter()
            .enumerate()
            .map(|(index, step)| Step::from_config(step, index))
            .collect::<Result<Vec<_>>>()
            .with_context(|| format!("Invalid steps in job '{}'", id))?;

        Ok(Self {
            id: id.to_string(),
            name: config.name.clone(),
            runs_on: config.runs_on.as_ref().map(render_value),
            needs: config.needs.to_vec(),
            env: config
                .env
                .iter()
                .map(|(k, v)| (k.clone(), render_value(v)))
                .collect(),
            strategy: build_strategy(config.strategy.as_ref())?,
            steps,
            timeout: config
                .timeout_minutes
                .map(timeout_from_minutes)
                .transpose()
                .with_context(|| format!("Invalid timeout for job '{}'", id))?,
        })
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }

    /// Name of one matrix instance, e.g. `build-linux (3.8)`
    pub fn instance_name(&self, cell: &MatrixCell) -> String {
        if cell.is_empty() {
            self.display_name().to_string()
        } else {
            format!("{} ({})", self.display_name(), cell.label())
        }
    }
}

/// Runtime record of one step within a job instance
#[derive(Debug, Clone)]
pub struct StepRecord {
    pub step_id: String,
    pub name: String,
    pub state: StepState,

    /// Last lines of output, secrets masked
    pub output_tail: Vec<String>,
}

impl StepRecord {
    pub fn pending(step: &Step) -> Self {
        Self {
            step_id: step.id.clone(),
            name: step.display_name(),
            state: StepState::Pending,
            output_tail: Vec::new(),
        }
    }
}

/// One instantiation of a job bound to one matrix cell
#[derive(Debug, Clone)]
pub struct JobInstance {
    /// Unique key within the run, e.g. `build-linux[1]`
    pub key: String,

    pub definition: Arc<JobDefinition>,

    /// Display name including matrix values
    pub name: String,

    pub matrix: MatrixCell,

    pub state: JobState,

    pub steps: Vec<StepRecord>,
}

impl JobInstance {
    pub fn new(definition: Arc<JobDefinition>, matrix: MatrixCell, index: Option<usize>) -> Self {
        let key = match index {
            Some(i) => format!("{}[{}]", definition.id, i),
            None => definition.id.clone(),
        };
        let name = definition.instance_name(&matrix);
        let steps = definition.steps.iter().map(StepRecord::pending).collect();

        Self {
            key,
            definition,
            name,
            matrix,
            state: JobState::Pending,
            steps,
        }
    }

    pub fn job_id(&self) -> &str {
        &self.definition.id
    }

    /// Step records that actually ran, in order
    pub fn executed_steps(&self) -> Vec<&StepRecord> {
        self.steps.iter().filter(|s| s.state.has_run()).collect()
    }

    /// Put a job that never started into a terminal state
    pub fn settle(&mut self, state: JobState, reason: &str) {
        for step in &mut self.steps {
            if matches!(step.state, StepState::Pending) {
                step.state = StepState::Skipped {
                    reason: reason.to_string(),
                };
            }
        }
        self.state = state;
    }
}
