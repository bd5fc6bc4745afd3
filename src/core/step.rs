//! Step domain model

use crate::core::config::StepConfig;
use crate::core::matrix::render_value;
use anyhow::{bail, Result};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// Reference to a reusable action, e.g. `actions/checkout@v2` or `./tools/setup`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionRef {
    /// `owner/repo[/path]` or a local `./path`
    pub name: String,

    /// Version after `@` (absent for local actions)
    pub version: Option<String>,
}

impl ActionRef {
    pub fn parse(reference: &str) -> Result<Self> {
        let reference = reference.trim();
        if reference.is_empty() {
            bail!("Action reference is empty");
        }

        if reference.starts_with("./") {
            return Ok(Self {
                name: reference.to_string(),
                version: None,
            });
        }

        let Some((name, version)) = reference.rsplit_once('@') else {
            bail!(
                "Action reference '{}' must be '<owner>/<repo>@<ref>' or a local './path'",
                reference
            );
        };

        if name.split('/').filter(|part| !part.is_empty()).count() < 2 || version.is_empty() {
            bail!("Malformed action reference '{}'", reference);
        }

        Ok(Self {
            name: name.to_string(),
            version: Some(version.to_string()),
        })
    }

    pub fn is_local(&self) -> bool {
        self.name.starts_with("./")
    }
}

impl fmt::Display for ActionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.version {
            Some(version) => write!(f, "{}@{}", self.name, version),
            None => f.write_str(&self.name),
        }
    }
}

/// Convert a `timeout-minutes` value into a duration
pub fn timeout_from_minutes(minutes: f64) -> Result<Duration> {
    if !minutes.is_finite() || minutes <= 0.0 {
        bail!("timeout-minutes must be a positive number, got {}", minutes);
    }
    Duration::try_from_secs_f64(minutes * 60.0)
        .map_err(|_| anyhow::anyhow!("timeout-minutes {} is out of range", minutes))
}

/// What a step does
#[derive(Debug, Clone)]
pub enum StepKind {
    /// Invoke a reusable action with named inputs
    Action {
        action: ActionRef,
        inputs: BTreeMap<String, String>,
    },
    /// Run an inline script through a shell
    Run {
        script: String,
        shell: Option<String>,
    },
}

/// A single step in a job
#[derive(Debug, Clone)]
pub struct Step {
    /// Unique (per job) step identifier
    pub id: String,

    /// Optional display name template
    pub name: Option<String>,

    pub kind: StepKind,

    /// Environment bindings scoped to this step
    pub env: BTreeMap<String, String>,

    /// Record a failure but keep running the job
    pub continue_on_error: bool,

    /// Step timeout (None = bounded by the job timeout only)
    pub timeout: Option<Duration>,
}

impl Step {
    /// Create a step from its config; `index` is the step position in the job
    pub fn from_config(config: &StepConfig, index: usize) -> Result<Self> {
        let kind = match (&config.uses, &config.run) {
            (Some(uses), None) => StepKind::Action {
                action: ActionRef::parse(uses)?,
                inputs: config
                    .with
                    .iter()
                    .map(|(k, v)| (k.clone(), render_value(v)))
                    .collect(),
            },
            (None, Some(run)) => StepKind::Run {
                script: run.clone(),
                shell: config.shell.clone(),
            },
            (Some(_), Some(_)) => bail!("Step {} declares both 'uses' and 'run'", index + 1),
            (None, None) => bail!("Step {} declares neither 'uses' nor 'run'", index + 1),
        };

        Ok(Step {
            id: config
                .id
                .clone()
                .unwrap_or_else(|| format!("step-{}", index + 1)),
            name: config.name.clone(),
            kind,
            env: config
                .env
                .iter()
                .map(|(k, v)| (k.clone(), render_value(v)))
                .collect(),
            continue_on_error: config.continue_on_error,
            timeout: config
                .timeout_minutes
                .map(timeout_from_minutes)
                .transpose()?,
        })
    }

    /// Name shown in output when the step declares none
    pub fn display_name(&self) -> String {
        if let Some(name) = &self.name {
            return name.clone();
        }

        match &self.kind {
            StepKind::Action { action, .. } => format!("Run {}", action),
            StepKind::Run { script, .. } => {
                let first_line = script.lines().find(|l| !l.trim().is_empty()).unwrap_or("");
                format!("Run {}", first_line.trim())
            }
        }
    }

    pub fn is_action(&self) -> bool {
        matches!(self.kind, StepKind::Action { .. })
    }
}
