//! Workflow domain model

use crate::core::{
    config::WorkflowConfig,
    job::JobDefinition,
    matrix::render_value,
    trigger::TriggerSpec,
};
use anyhow::Result;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

/// A workflow definition
#[derive(Debug, Clone)]
pub struct Workflow {
    /// Workflow name
    pub name: String,

    pub triggers: TriggerSpec,

    /// Environment shared by every job
    pub env: BTreeMap<String, String>,

    /// Jobs in declaration order
    pub jobs: Vec<Arc<JobDefinition>>,

    /// Job execution order (topological sort over `needs`)
    execution_order: Vec<String>,
}

impl Workflow {
    /// Create a workflow from configuration
    pub fn from_config(config: &WorkflowConfig) -> Result<Self> {
        let jobs = config
            .job_configs()?
            .iter()
            .map(|(id, job)| JobDefinition::from_config(id, job).map(Arc::new))
            .collect::<Result<Vec<_>>>()?;

        let execution_order = Self::topological_sort(&jobs);

        Ok(Workflow {
            name: config.display_name().to_string(),
            triggers: config.trigger_spec()?,
            env: config
                .env
                .iter()
                .map(|(k, v)| (k.clone(), render_value(v)))
                .collect(),
            jobs,
            execution_order,
        })
    }

    /// Get a job by ID
    pub fn job(&self, id: &str) -> Option<&Arc<JobDefinition>> {
        self.jobs.iter().find(|j| j.id == id)
    }

    /// Get execution order (topological sort)
    pub fn execution_order(&self) -> &[String] {
        &self.execution_order
    }

    /// The given jobs plus everything they transitively need
    pub fn with_needs(&self, ids: &[String]) -> HashSet<String> {
        let mut selected = HashSet::new();
        let mut stack: Vec<String> = ids.to_vec();

        while let Some(id) = stack.pop() {
            if !selected.insert(id.clone()) {
                continue;
            }
            if let Some(job) = self.job(&id) {
                stack.extend(job.needs.iter().cloned());
            }
        }

        selected
    }

    /// Calculate topological order of jobs, keeping declaration order among peers
    fn topological_sort(jobs: &[Arc<JobDefinition>]) -> Vec<String> {
        let by_id: HashMap<&str, &Arc<JobDefinition>> =
            jobs.iter().map(|j| (j.id.as_str(), j)).collect();
        let mut result = Vec::new();
        let mut visited = HashSet::new();

        for job in jobs {
            Self::visit(&job.id, &by_id, &mut visited, &mut result);
        }

        result
    }

    fn visit(
        job_id: &str,
        jobs: &HashMap<&str, &Arc<JobDefinition>>,
        visited: &mut HashSet<String>,
        result: &mut Vec<String>,
    ) {
        if !visited.insert(job_id.to_string()) {
            return;
        }

        if let Some(job) = jobs.get(job_id) {
            for need in &job.needs {
                Self::visit(need, jobs, visited, result);
            }
        }

        result.push(job_id.to_string());
    }
}
