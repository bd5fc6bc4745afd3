//! Workflow configuration from YAML

use crate::core::{
    matrix::{Matrix, Strategy},
    step::{timeout_from_minutes, Step},
    trigger::{BranchFilter, BranchPattern, EventType, Trigger, TriggerSpec},
    Workflow,
};
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;

/// Top-level workflow configuration loaded from YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowConfig {
    /// Workflow name
    #[serde(default)]
    pub name: Option<String>,

    /// Events that start a run
    #[serde(rename = "on")]
    pub on: OnConfig,

    /// Environment shared by every job
    #[serde(default)]
    pub env: BTreeMap<String, Value>,

    /// Jobs keyed by id, in declaration order
    pub jobs: Mapping,
}

/// The `on:` section: a single event, a list of events, or a mapping with filters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OnConfig {
    Single(String),
    List(Vec<String>),
    Map(BTreeMap<String, Option<EventFilterConfig>>),
}

/// Branch filters for one event
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventFilterConfig {
    #[serde(default)]
    pub branches: Option<Vec<String>>,

    #[serde(default, rename = "branches-ignore")]
    pub branches_ignore: Option<Vec<String>>,
}

/// Job configuration as defined in YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct JobConfig {
    #[serde(default)]
    pub name: Option<String>,

    /// Requested runner label (informational)
    #[serde(default)]
    pub runs_on: Option<Value>,

    /// Jobs that must succeed first
    #[serde(default)]
    pub needs: NeedsConfig,

    #[serde(default)]
    pub env: BTreeMap<String, Value>,

    #[serde(default)]
    pub strategy: Option<StrategyConfig>,

    #[serde(default)]
    pub timeout_minutes: Option<f64>,

    #[serde(default)]
    pub steps: Vec<StepConfig>,
}

/// `needs:` accepts a single job id or a list
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NeedsConfig {
    #[default]
    None,
    One(String),
    Many(Vec<String>),
}

impl NeedsConfig {
    pub fn to_vec(&self) -> Vec<String> {
        match self {
            NeedsConfig::None => Vec::new(),
            NeedsConfig::One(id) => vec![id.clone()],
            NeedsConfig::Many(ids) => ids.clone(),
        }
    }
}

/// Strategy configuration as defined in YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct StrategyConfig {
    #[serde(default)]
    pub matrix: Option<Mapping>,

    #[serde(default)]
    pub max_parallel: Option<usize>,

    #[serde(default = "default_fail_fast")]
    pub fail_fast: bool,
}

fn default_fail_fast() -> bool {
    true
}

/// Step configuration as defined in YAML
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct StepConfig {
    #[serde(default)]
    pub id: Option<String>,

    #[serde(default)]
    pub name: Option<String>,

    /// Reusable action reference
    #[serde(default)]
    pub uses: Option<String>,

    /// Inputs for the action
    #[serde(default)]
    pub with: BTreeMap<String, Value>,

    /// Inline script
    #[serde(default)]
    pub run: Option<String>,

    /// Shell template for `run`, `{0}` is replaced by the script path
    #[serde(default)]
    pub shell: Option<String>,

    #[serde(default)]
    pub env: BTreeMap<String, Value>,

    #[serde(default)]
    pub continue_on_error: bool,

    #[serde(default)]
    pub timeout_minutes: Option<f64>,
}

impl WorkflowConfig {
    /// Load workflow configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read workflow file {}", path.display()))?;
        let mut config = Self::from_yaml(&content)?;
        if config.name.is_none() {
            config.name = Some(path.display().to_string());
        }
        Ok(config)
    }

    /// Parse workflow configuration from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: WorkflowConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Workflow name, falling back to a generic label
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("workflow")
    }

    /// Jobs in declaration order
    pub fn job_configs(&self) -> Result<Vec<(String, JobConfig)>> {
        self.jobs
            .iter()
            .map(|(key, value)| {
                let id = key
                    .as_str()
                    .with_context(|| format!("Job ids must be strings, got {:?}", key))?
                    .to_string();
                let job: JobConfig = serde_yaml::from_value(value.clone())
                    .with_context(|| format!("Invalid configuration for job '{}'", id))?;
                Ok((id, job))
            })
            .collect()
    }

    /// Validate the workflow configuration
    pub fn validate(&self) -> Result<()> {
        let triggers = self.trigger_spec()?;
        if triggers.is_empty() {
            bail!("Workflow declares no triggers; it would never run");
        }

        let jobs = self.job_configs()?;
        if jobs.is_empty() {
            bail!("Workflow declares no jobs");
        }

        let job_ids: HashSet<&str> = jobs.iter().map(|(id, _)| id.as_str()).collect();

        for (id, job) in &jobs {
            if job.steps.is_empty() {
                bail!("Job '{}' has no steps", id);
            }

            for need in job.needs.to_vec() {
                if !job_ids.contains(need.as_str()) {
                    bail!("Job '{}' needs non-existent job '{}'", id, need);
                }
            }

            if let Some(minutes) = job.timeout_minutes {
                timeout_from_minutes(minutes)
                    .with_context(|| format!("Invalid timeout for job '{}'", id))?;
            }

            if let Some(strategy) = &job.strategy {
                if strategy.max_parallel == Some(0) {
                    bail!("Job '{}' has max-parallel of 0", id);
                }
                if let Some(mapping) = &strategy.matrix {
                    let matrix = Matrix::from_mapping(mapping)
                        .with_context(|| format!("Invalid matrix in job '{}'", id))?;
                    for axis in &matrix.axes {
                        if axis.values.is_empty() {
                            bail!("Matrix axis '{}' in job '{}' has no values", axis.name, id);
                        }
                    }
                }
            }

            // Generated ids (`step-N`) take part in the check too
            let mut step_ids = HashSet::new();
            for (index, step) in job.steps.iter().enumerate() {
                let step = Step::from_config(step, index)
                    .with_context(|| format!("Invalid step in job '{}'", id))?;
                if !step_ids.insert(step.id.clone()) {
                    bail!("Duplicate step ID '{}' in job '{}'", step.id, id);
                }
            }
        }

        self.check_cycles(&jobs)?;

        Ok(())
    }

    /// Check for cycles in the `needs` graph
    fn check_cycles(&self, jobs: &[(String, JobConfig)]) -> Result<()> {
        let mut visited = HashSet::new();
        let mut recursion_stack = HashSet::new();

        for (id, _) in jobs {
            if !visited.contains(id) {
                Self::dfs_check(id, jobs, &mut visited, &mut recursion_stack)?;
            }
        }

        Ok(())
    }

    fn dfs_check(
        job_id: &str,
        jobs: &[(String, JobConfig)],
        visited: &mut HashSet<String>,
        recursion_stack: &mut HashSet<String>,
    ) -> Result<()> {
        visited.insert(job_id.to_string());
        recursion_stack.insert(job_id.to_string());

        if let Some((_, job)) = jobs.iter().find(|(id, _)| id == job_id) {
            for need in job.needs.to_vec() {
                if recursion_stack.contains(&need) {
                    bail!("Cycle detected in job dependencies involving job '{}'", need);
                }
                if !visited.contains(&need) {
                    Self::dfs_check(&need, jobs, visited, recursion_stack)?;
                }
            }
        }

        recursion_stack.remove(job_id);
        Ok(())
    }

    /// Build the trigger spec from the `on:` section
    pub fn trigger_spec(&self) -> Result<TriggerSpec> {
        let triggers = match &self.on {
            OnConfig::Single(event) => vec![Trigger::new(EventType::parse(event), BranchFilter::Any)],
            OnConfig::List(events) => events
                .iter()
                .map(|event| Trigger::new(EventType::parse(event), BranchFilter::Any))
                .collect(),
            OnConfig::Map(events) => events
                .iter()
                .map(|(event, filter)| {
                    let filter = match filter {
                        Some(filter) => build_filter(event, filter)?,
                        None => BranchFilter::Any,
                    };
                    Ok(Trigger::new(EventType::parse(event), filter))
                })
                .collect::<Result<Vec<_>>>()?,
        };

        Ok(TriggerSpec::new(triggers))
    }

    /// Convert config to a Workflow domain model
    pub fn to_workflow(&self) -> Result<Workflow> {
        Workflow::from_config(self)
    }
}

fn build_filter(event: &str, config: &EventFilterConfig) -> Result<BranchFilter> {
    let compile = |patterns: &[String]| -> Result<Vec<BranchPattern>> {
        patterns
            .iter()
            .map(|p| {
                BranchPattern::new(p)
                    .with_context(|| format!("Invalid branch pattern '{}' for '{}'", p, event))
            })
            .collect()
    };

    match (&config.branches, &config.branches_ignore) {
        (Some(_), Some(_)) => bail!(
            "Event '{}' cannot declare both 'branches' and 'branches-ignore'",
            event
        ),
        (Some(include), None) => Ok(BranchFilter::Include(compile(include)?)),
        (None, Some(ignore)) => Ok(BranchFilter::Ignore(compile(ignore)?)),
        (None, None) => Ok(BranchFilter::Any),
    }
}

/// Build a job strategy from its config
pub(crate) fn build_strategy(config: Option<&StrategyConfig>) -> Result<Strategy> {
    let Some(config) = config else {
        return Ok(Strategy::default());
    };

    let matrix = match &config.matrix {
        Some(mapping) => Matrix::from_mapping(mapping)?,
        None => Matrix::default(),
    };

    Ok(Strategy {
        matrix,
        max_parallel: config.max_parallel,
        fail_fast: config.fail_fast,
    })
}
